pub mod messages;
pub mod health;
pub mod template;
pub mod diagnostics;
pub mod error;

pub use messages::*;
pub use health::*;
pub use template::*;
pub use diagnostics::*;
pub use error::*;
