//! Lock-coordinated collaborative diagram editing.
//!
//! The server side ([`ws`]) owns the shared document and the element lock
//! table behind a single coordination hub. The client side ([`client`])
//! mirrors that state, guards local mutations against foreign locks and
//! reconciles inbound broadcasts.

pub mod client;
pub mod config;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod ws;

use std::sync::Arc;

use config::Config;
use ws::HubHandle;

/// State shared by every HTTP and WebSocket handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub config: Arc<Config>,
}

impl AppState {
    /// Spawn the coordination hub for `config` and wrap it for the router.
    pub fn new(config: Config) -> Self {
        let hub = ws::Hub::new(config.initial_document(), ws::HubSettings::from(&config));
        Self {
            hub: HubHandle::spawn(hub),
            config: Arc::new(config),
        }
    }
}
