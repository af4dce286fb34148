use std::collections::BTreeSet;

use tracing::debug;

use crate::models::{ClientMessage, ElementId, ServerMessage, SessionId};

use super::context::{extract_affected, Exemptions, MutationContext};
use super::state::ClientState;
use super::toolkit::DiagramToolkit;

/// Verdict on a proposed local mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allowed,
    /// The toolkit's own validation refused the mutation.
    Rejected,
    /// An affected element is locked by someone else, as far as the mirror knows.
    Locked { element: ElementId, owner: SessionId },
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allowed)
    }
}

/// Client-side lock enforcement.
///
/// Reads the mirror in [`ClientState`]; the only state it keeps itself is
/// the set of acquire requests still waiting for an answer.
#[derive(Debug, Default)]
pub struct LockGuard {
    pending: BTreeSet<ElementId>,
}

impl LockGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// False if any of `ids` is locked by an owner other than this session.
    pub fn can_modify<S: AsRef<str>>(&self, state: &ClientState, ids: &[S]) -> bool {
        self.check(state, ids).is_allowed()
    }

    pub fn check<S: AsRef<str>>(&self, state: &ClientState, ids: &[S]) -> GuardDecision {
        for id in ids {
            let id = id.as_ref();
            if let Some(owner) = state.owner_of(id) {
                if !state.is_self(owner) {
                    return GuardDecision::Locked {
                        element: id.to_string(),
                        owner: owner.to_string(),
                    };
                }
            }
        }
        GuardDecision::Allowed
    }

    /// Wraps the toolkit's validation: native check first, then locks.
    pub fn validate<T: DiagramToolkit>(
        &self,
        state: &ClientState,
        toolkit: &T,
        context: &MutationContext,
    ) -> GuardDecision {
        if !toolkit.native_validate(context) {
            return GuardDecision::Rejected;
        }
        let affected = Self::extract_affected(toolkit, context);
        let decision = self.check(state, affected.as_slice());
        if let GuardDecision::Locked { element, owner } = &decision {
            debug!(element = %element, owner = %owner, "local mutation blocked by lock");
        }
        decision
    }

    pub fn extract_affected<T: DiagramToolkit>(toolkit: &T, context: &MutationContext) -> Vec<ElementId> {
        extract_affected(context, &Exemptions::new(toolkit.root_element_id()))
    }

    /// Messages to send when the user starts interacting with `element`.
    ///
    /// Releases everything this session holds first: one active lock per
    /// user is a client convention, the hub does not require it.
    pub fn try_acquire<T: DiagramToolkit>(
        &mut self,
        state: &ClientState,
        toolkit: &T,
        element: &str,
    ) -> Vec<ClientMessage> {
        let Some(me) = state.self_id.as_deref() else {
            return Vec::new();
        };
        if Exemptions::new(toolkit.root_element_id()).is_exempt(element) {
            return Vec::new();
        }
        if state.owner_of(element) == Some(me) {
            return Vec::new();
        }

        let mut out: Vec<ClientMessage> = state
            .held_by_self()
            .into_iter()
            .map(|held| ClientMessage::release(held, me))
            .collect();
        out.push(ClientMessage::acquire(element, me));
        self.pending.insert(element.to_string());
        out
    }

    /// Release messages for every lock the mirror attributes to this session.
    pub fn release_current(&mut self, state: &ClientState) -> Vec<ClientMessage> {
        let Some(me) = state.self_id.as_deref() else {
            return Vec::new();
        };
        self.pending.clear();
        state
            .held_by_self()
            .into_iter()
            .map(|held| ClientMessage::release(held, me))
            .collect()
    }

    pub fn is_pending(&self, element: &str) -> bool {
        self.pending.contains(element)
    }

    /// Settle pending requests the server has answered.
    pub fn observe(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::LockAcquired(m) => {
                self.pending.remove(&m.element_id);
            }
            ServerMessage::LockDenied(m) => {
                self.pending.remove(&m.element_id);
            }
            ServerMessage::LocksUpdate(m) => {
                self.pending.retain(|element| !m.locks.contains_key(element));
            }
            ServerMessage::Init(_) => self.pending.clear(),
            _ => {}
        }
    }
}
