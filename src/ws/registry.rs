use chrono::Utc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Participant, ServerMessage, SessionId};

/// Channel feeding a session's socket writer.
///
/// Bounded: a session that lets it fill up has stopped reading and is
/// treated like one whose socket is gone.
pub type Outbox = mpsc::Sender<ServerMessage>;

struct SessionEntry {
    participant: Participant,
    outbox: Outbox,
}

impl SessionEntry {
    fn deliver(&self, msg: ServerMessage) -> bool {
        match self.outbox.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                warn!(session = %self.participant.id, kind = msg.kind(), "outbox full, session stopped reading");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Connected sessions in join order.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Vec<SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and assign it a fresh identity.
    pub fn register(&mut self, outbox: Outbox) -> Participant {
        let mut id = new_session_id();
        while self.contains(&id) {
            id = new_session_id();
        }
        let participant = Participant {
            id,
            joined_at: Utc::now(),
        };
        self.sessions.push(SessionEntry {
            participant: participant.clone(),
            outbox,
        });
        participant
    }

    pub fn deregister(&mut self, id: &str) -> Option<Participant> {
        let idx = self.sessions.iter().position(|s| s.participant.id == id)?;
        Some(self.sessions.remove(idx).participant)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.iter().any(|s| s.participant.id == id)
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.sessions.iter().map(|s| s.participant.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Queue a message for one session. Returns false if its outbox is closed or full.
    pub fn send_to(&self, id: &str, msg: ServerMessage) -> bool {
        match self.sessions.iter().find(|s| s.participant.id == id) {
            Some(session) => session.deliver(msg),
            None => true,
        }
    }

    /// Queue a message for every session except `except`.
    /// Returns the sessions whose outbox turned out to be closed or full.
    pub fn broadcast(&self, msg: &ServerMessage, except: Option<&str>) -> Vec<SessionId> {
        let mut dead = Vec::new();
        for session in &self.sessions {
            if Some(session.participant.id.as_str()) == except {
                continue;
            }
            if !session.deliver(msg.clone()) {
                dead.push(session.participant.id.clone());
            }
        }
        if !dead.is_empty() {
            debug!(kind = msg.kind(), dead = dead.len(), "broadcast hit dead outboxes");
        }
        dead
    }
}

fn new_session_id() -> SessionId {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PongMessage;

    fn pong() -> ServerMessage {
        ServerMessage::Pong(PongMessage { date: "now".into() })
    }

    #[test]
    fn assigns_distinct_short_ids_in_join_order() {
        let mut registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let a = registry.register(tx.clone());
        let b = registry.register(tx);

        assert_eq!(a.id.len(), 8);
        assert_ne!(a.id, b.id);
        let ids: Vec<_> = registry.participants().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn broadcast_skips_excluded_and_reports_closed_outboxes() {
        let mut registry = SessionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, rx_b) = mpsc::channel(8);
        let (tx_c, mut rx_c) = mpsc::channel(8);
        let a = registry.register(tx_a);
        let b = registry.register(tx_b);
        registry.register(tx_c);
        drop(rx_b);

        let dead = registry.broadcast(&pong(), Some(&a.id));

        assert_eq!(dead, vec![b.id]);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_c.try_recv().is_ok());
    }

    #[test]
    fn full_outbox_counts_as_dead() {
        let mut registry = SessionRegistry::new();
        let (tx_a, _rx_a) = mpsc::channel(1);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let a = registry.register(tx_a);
        let b = registry.register(tx_b);

        assert!(registry.send_to(&a.id, pong()));
        assert!(!registry.send_to(&a.id, pong()));
        assert_eq!(registry.broadcast(&pong(), None), vec![a.id]);
        assert!(registry.send_to(&b.id, pong()));
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn deregister_removes_session() {
        let mut registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let a = registry.register(tx);
        assert_eq!(registry.deregister(&a.id).map(|p| p.id), Some(a.id.clone()));
        assert!(registry.deregister(&a.id).is_none());
        assert!(registry.is_empty());
    }
}
