pub mod health;
pub mod template;
pub mod diagnostics;

pub use health::*;
pub use template::*;
pub use diagnostics::*;
