use tracing::{debug, info};

use crate::models::{DenyReason, ElementId, ServerMessage, SessionId};

use super::state::ClientState;
use super::toolkit::DiagramToolkit;

/// What applying one inbound message did to local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Initialized { self_id: SessionId },
    LocksReplaced,
    LockGranted { element: ElementId, owner: SessionId },
    LockDenied { element: ElementId, owner: Option<SessionId>, reason: DenyReason },
    LockReleased { element: ElementId },
    ParticipantJoined { id: SessionId },
    ParticipantLeft { id: SessionId },
    DocumentReplaced { by: SessionId },
    /// Our own edit came back; nothing to import.
    EchoSuppressed,
    Ignored,
}

/// Applies server broadcasts to the local mirror and the toolkit.
pub struct Reconciler<T: DiagramToolkit> {
    state: ClientState,
    toolkit: T,
}

impl<T: DiagramToolkit> Reconciler<T> {
    pub fn new(toolkit: T) -> Self {
        Self {
            state: ClientState::default(),
            toolkit,
        }
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn toolkit(&self) -> &T {
        &self.toolkit
    }

    pub fn toolkit_mut(&mut self) -> &mut T {
        &mut self.toolkit
    }

    /// Record a document the local user produced, so the mirror matches what
    /// is being sent to the hub.
    pub fn record_local_document(&mut self, xml: &str) {
        self.state.document = xml.to_string();
    }

    pub fn apply(&mut self, message: ServerMessage) -> ReconcileOutcome {
        match message {
            ServerMessage::Init(init) => {
                info!(session = %init.user_id, users = init.users.len(), "joined collaboration session");
                self.state.self_id = Some(init.user_id.clone());
                self.state.participants = init.users;
                self.state.locks = init.locks;
                self.state.document = init.xml;
                self.toolkit.import_document(&self.state.document);
                self.render_locks();
                ReconcileOutcome::Initialized {
                    self_id: init.user_id,
                }
            }
            ServerMessage::LocksUpdate(update) => {
                self.state.locks = update.locks;
                self.render_locks();
                ReconcileOutcome::LocksReplaced
            }
            ServerMessage::LockAcquired(granted) => {
                self.state
                    .locks
                    .insert(granted.element_id.clone(), granted.user_id.clone());
                self.render_locks();
                ReconcileOutcome::LockGranted {
                    element: granted.element_id,
                    owner: granted.user_id,
                }
            }
            ServerMessage::LockDenied(denied) => {
                debug!(element = %denied.element_id, owner = ?denied.owner, "lock request denied");
                ReconcileOutcome::LockDenied {
                    element: denied.element_id,
                    owner: denied.owner,
                    reason: denied.reason,
                }
            }
            ServerMessage::LockReleased(released) => {
                if self.state.owner_of(&released.element_id) == Some(released.user_id.as_str()) {
                    self.state.locks.remove(&released.element_id);
                    self.render_locks();
                }
                ReconcileOutcome::LockReleased {
                    element: released.element_id,
                }
            }
            ServerMessage::UserJoin(join) => {
                let id = join.user.id.clone();
                if !self.state.participants.iter().any(|p| p.id == id) {
                    self.state.participants.push(join.user);
                }
                ReconcileOutcome::ParticipantJoined { id }
            }
            ServerMessage::UserLeave(leave) => {
                self.state.participants.retain(|p| p.id != leave.user_id);
                let before = self.state.locks.len();
                self.state.locks.retain(|_, owner| *owner != leave.user_id);
                if self.state.locks.len() != before {
                    self.render_locks();
                }
                ReconcileOutcome::ParticipantLeft { id: leave.user_id }
            }
            ServerMessage::XmlUpdate(update) => {
                if self.state.is_self(&update.by) {
                    return ReconcileOutcome::EchoSuppressed;
                }
                self.state.document = update.xml;
                self.toolkit.import_document(&self.state.document);
                // Import wiped the overlays.
                self.render_locks();
                ReconcileOutcome::DocumentReplaced { by: update.by }
            }
            ServerMessage::Pong(_) => ReconcileOutcome::Ignored,
        }
    }

    fn render_locks(&mut self) {
        self.toolkit
            .render_locks(&self.state.locks, self.state.self_id.as_deref());
    }
}
