pub mod connection;
pub mod context;
pub mod guard;
pub mod reconciler;
pub mod session;
pub mod state;
pub mod toolkit;

pub use connection::CollabClient;
pub use context::{extract_affected, Exemptions, MutationContext, CANVAS_ELEMENT};
pub use guard::{GuardDecision, LockGuard};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use session::CollabSession;
pub use state::ClientState;
pub use toolkit::DiagramToolkit;
