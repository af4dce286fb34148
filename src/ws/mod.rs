pub mod docstore;
pub mod handler;
pub mod hub;
pub mod locktable;
pub mod registry;

pub use handler::websocket_handler;
pub use hub::{Hub, HubHandle, HubSettings, HubStats};
