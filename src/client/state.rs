use crate::models::{ElementId, LockSnapshot, Participant, SessionId};

/// Local mirror of the server's shared state.
///
/// The lock map is an eventually consistent cache: it lags the hub by at
/// least one round trip and is only corrected when the next `locks_update`
/// arrives. Decisions made on it can be stale in both directions.
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    pub self_id: Option<SessionId>,
    pub participants: Vec<Participant>,
    pub locks: LockSnapshot,
    pub document: String,
}

impl ClientState {
    pub fn owner_of(&self, element: &str) -> Option<&str> {
        self.locks.get(element).map(String::as_str)
    }

    pub fn is_self(&self, id: &str) -> bool {
        self.self_id.as_deref() == Some(id)
    }

    /// Elements the mirror currently attributes to this session.
    pub fn held_by_self(&self) -> Vec<ElementId> {
        match &self.self_id {
            Some(me) => self
                .locks
                .iter()
                .filter(|(_, owner)| *owner == me)
                .map(|(element, _)| element.clone())
                .collect(),
            None => Vec::new(),
        }
    }
}
