use std::collections::HashSet;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{HubError, ProtocolError};
use crate::models::{
    ClientMessage, DenyReason, ElementId, InitMessage, LockAcquiredMessage, LockDeniedMessage,
    LockReleasedMessage, LocksUpdateMessage, PongMessage, ServerMessage, SessionId,
    UserJoinMessage, UserLeaveMessage, XmlUpdateMessage,
};

use super::docstore::DocumentStore;
use super::locktable::{AcquireOutcome, LockTable};
use super::registry::{Outbox, SessionRegistry};

/// Policy knobs for the hub.
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Elements that can never be locked.
    pub unlockable: HashSet<ElementId>,
    /// Release a session's other locks whenever it is granted a new one.
    pub enforce_single_lock: bool,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            unlockable: HashSet::from(["canvas".to_string()]),
            enforce_single_lock: false,
        }
    }
}

impl From<&Config> for HubSettings {
    fn from(config: &Config) -> Self {
        Self {
            unlockable: config
                .unlockable_elements
                .iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            enforce_single_lock: config.enforce_single_lock,
        }
    }
}

/// Counters exposed through the diagnostics endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStats {
    pub sessions: usize,
    pub locks: usize,
    pub doc_revision: u64,
    pub doc_bytes: usize,
}

/// Work submitted to the hub task.
pub enum HubCommand {
    Connect {
        outbox: Outbox,
        reply: oneshot::Sender<SessionId>,
    },
    Inbound {
        session: SessionId,
        message: ClientMessage,
    },
    Disconnect {
        session: SessionId,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// Owner of all shared collaboration state.
///
/// Every method runs to completion without awaiting, and the hub task feeds
/// it one command at a time, so the order commands arrive in is the order
/// their effects become visible to every session.
pub struct Hub {
    registry: SessionRegistry,
    locks: LockTable,
    document: DocumentStore,
    settings: HubSettings,
}

impl Hub {
    pub fn new(seed_xml: impl Into<String>, settings: HubSettings) -> Self {
        Self {
            registry: SessionRegistry::new(),
            locks: LockTable::new(),
            document: DocumentStore::new(seed_xml),
            settings,
        }
    }

    pub fn apply(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connect { outbox, reply } => {
                let session = self.connect(outbox);
                if reply.send(session.clone()).is_err() {
                    debug!(session = %session, "connection went away before activation");
                    self.disconnect(&session);
                }
            }
            HubCommand::Inbound { session, message } => {
                if let Err(e) = self.handle(&session, message) {
                    warn!(session = %session, error = %e, "dropping message");
                }
            }
            HubCommand::Disconnect { session } => self.disconnect(&session),
            HubCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    /// Activate a new session: init to it, join to everyone else.
    pub fn connect(&mut self, outbox: Outbox) -> SessionId {
        let participant = self.registry.register(outbox);
        let session = participant.id.clone();
        info!(session = %session, "session connected");

        let current = self.document.current();
        let init = ServerMessage::Init(InitMessage {
            xml: current.xml.clone(),
            user_id: session.clone(),
            users: self.registry.participants(),
            locks: self.locks.snapshot(),
        });
        let mut dead = Vec::new();
        if !self.registry.send_to(&session, init) {
            dead.push(session.clone());
        }
        let join = ServerMessage::UserJoin(UserJoinMessage { user: participant });
        dead.extend(self.registry.broadcast(&join, Some(&session)));
        self.reap(dead);
        session
    }

    /// Dispatch one inbound message from an active session.
    pub fn handle(&mut self, session: &str, message: ClientMessage) -> Result<(), ProtocolError> {
        if !self.registry.contains(session) {
            debug!(session = %session, kind = message.kind(), "ignoring message from inactive session");
            return Ok(());
        }
        if let Some(claimed) = message.claimed_sender() {
            if claimed != session {
                return Err(ProtocolError::IdentityMismatch {
                    claimed: claimed.to_string(),
                    actual: session.to_string(),
                });
            }
        }

        let dead = match message {
            ClientMessage::UpdateXml(update) => self.update_document(session, update.xml),
            ClientMessage::AcquireLock(req) => self.acquire(session, req.element_id),
            ClientMessage::ReleaseLock(req) => self.release(session, req.element_id),
            ClientMessage::Ping => {
                let pong = ServerMessage::Pong(PongMessage {
                    date: Utc::now().to_rfc3339(),
                });
                self.send_or_mark(session, pong)
            }
        };
        self.reap(dead);
        Ok(())
    }

    /// Tear a session down: deregister, drop its locks, tell everyone else.
    pub fn disconnect(&mut self, session: &str) {
        let dead = self.teardown(session);
        self.reap(dead);
    }

    pub fn stats(&self) -> HubStats {
        let current = self.document.current();
        HubStats {
            sessions: self.registry.len(),
            locks: self.locks.len(),
            doc_revision: current.revision,
            doc_bytes: current.xml.len(),
        }
    }

    fn update_document(&mut self, session: &str, xml: String) -> Vec<SessionId> {
        debug!(session = %session, bytes = xml.len(), "document replaced");
        self.document.replace(xml.clone(), session);
        let update = ServerMessage::XmlUpdate(XmlUpdateMessage {
            xml,
            by: session.to_string(),
        });
        self.registry.broadcast(&update, Some(session))
    }

    fn acquire(&mut self, session: &str, element: ElementId) -> Vec<SessionId> {
        if self.settings.unlockable.contains(&element) {
            debug!(session = %session, element = %element, "acquire on exempt element denied");
            let denied = ServerMessage::LockDenied(LockDeniedMessage {
                element_id: element,
                user_id: session.to_string(),
                owner: None,
                reason: DenyReason::Exempt,
            });
            return self.send_or_mark(session, denied);
        }

        match self.locks.acquire(&element, session) {
            AcquireOutcome::Granted => {
                if self.settings.enforce_single_lock {
                    let released = self.locks.release_others(session, &element);
                    if !released.is_empty() {
                        debug!(session = %session, released = ?released, "released previous locks");
                    }
                }
                info!(session = %session, element = %element, "lock granted");
                let granted = ServerMessage::LockAcquired(LockAcquiredMessage {
                    element_id: element,
                    user_id: session.to_string(),
                });
                let mut dead = self.send_or_mark(session, granted);
                dead.extend(self.broadcast_locks());
                dead
            }
            AcquireOutcome::Denied { owner } => {
                info!(session = %session, element = %element, owner = %owner, "lock denied");
                let denied = ServerMessage::LockDenied(LockDeniedMessage {
                    element_id: element,
                    user_id: session.to_string(),
                    owner: Some(owner),
                    reason: DenyReason::Held,
                });
                self.send_or_mark(session, denied)
            }
        }
    }

    fn release(&mut self, session: &str, element: ElementId) -> Vec<SessionId> {
        let mut dead = Vec::new();
        if self.locks.release(&element, session) {
            info!(session = %session, element = %element, "lock released");
            let released = ServerMessage::LockReleased(LockReleasedMessage {
                element_id: element,
                user_id: session.to_string(),
            });
            dead.extend(self.send_or_mark(session, released));
        } else {
            debug!(session = %session, element = %element, "release was a no-op");
        }
        dead.extend(self.broadcast_locks());
        dead
    }

    fn teardown(&mut self, session: &str) -> Vec<SessionId> {
        if self.registry.deregister(session).is_none() {
            return Vec::new();
        }
        let released = self.locks.release_all(session);
        info!(session = %session, released = released.len(), "session disconnected");

        let mut dead = self.broadcast_locks();
        let leave = ServerMessage::UserLeave(UserLeaveMessage {
            user_id: session.to_string(),
        });
        dead.extend(self.registry.broadcast(&leave, None));
        dead
    }

    fn broadcast_locks(&self) -> Vec<SessionId> {
        let update = ServerMessage::LocksUpdate(LocksUpdateMessage {
            locks: self.locks.snapshot(),
        });
        self.registry.broadcast(&update, None)
    }

    fn send_or_mark(&self, session: &str, msg: ServerMessage) -> Vec<SessionId> {
        if self.registry.send_to(session, msg) {
            Vec::new()
        } else {
            vec![session.to_string()]
        }
    }

    /// Sessions whose outbox is closed or full are treated as disconnected.
    /// Returns how many sessions were torn down.
    fn reap(&mut self, mut dead: Vec<SessionId>) -> usize {
        let mut reaped = 0;
        while let Some(session) = dead.pop() {
            // One step can report the same session several times.
            if !self.registry.contains(&session) {
                continue;
            }
            warn!(session = %session, "outbox unusable, cleaning up session");
            dead.extend(self.teardown(&session));
            reaped += 1;
        }
        reaped
    }
}

/// Cloneable entry point to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Move `hub` onto its own task and return a handle to it.
    pub fn spawn(hub: Hub) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_hub(hub, rx));
        Self { tx }
    }

    /// Register a new session. Its `init` is already queued on `outbox` when this returns.
    pub async fn connect(&self, outbox: Outbox) -> Result<SessionId, HubError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(HubCommand::Connect { outbox, reply })
            .map_err(|_| HubError::Stopped)?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    pub fn submit(&self, session: &str, message: ClientMessage) -> Result<(), HubError> {
        self.tx
            .send(HubCommand::Inbound {
                session: session.to_string(),
                message,
            })
            .map_err(|_| HubError::Stopped)
    }

    /// Does not wait; usable from `Drop`.
    pub fn disconnect(&self, session: &str) {
        let _ = self.tx.send(HubCommand::Disconnect {
            session: session.to_string(),
        });
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(HubCommand::Stats { reply })
            .map_err(|_| HubError::Stopped)?;
        rx.await.map_err(|_| HubError::Stopped)
    }
}

async fn run_hub(mut hub: Hub, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
    info!("coordination hub started");
    while let Some(command) = rx.recv().await {
        hub.apply(command);
    }
    info!("coordination hub stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LockSnapshot, UpdateXmlMessage};
    use tokio::sync::mpsc::Receiver;

    const OUTBOX: usize = 64;

    fn hub() -> Hub {
        Hub::new("<seed/>", HubSettings::default())
    }

    fn join(hub: &mut Hub) -> (SessionId, Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOX);
        (hub.connect(tx), rx)
    }

    fn drain(rx: &mut Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn locks(entries: &[(&str, &str)]) -> ServerMessage {
        ServerMessage::LocksUpdate(LocksUpdateMessage {
            locks: entries
                .iter()
                .map(|(e, o)| (e.to_string(), o.to_string()))
                .collect::<LockSnapshot>(),
        })
    }

    #[test]
    fn connect_sends_init_to_newcomer_and_join_to_others() {
        let mut hub = hub();
        let (a, mut rx_a) = join(&mut hub);
        drain(&mut rx_a);

        let (b, mut rx_b) = join(&mut hub);

        let to_b = drain(&mut rx_b);
        assert_eq!(to_b.len(), 1);
        match &to_b[0] {
            ServerMessage::Init(init) => {
                assert_eq!(init.user_id, b);
                assert_eq!(init.xml, "<seed/>");
                let ids: Vec<_> = init.users.iter().map(|u| u.id.clone()).collect();
                assert_eq!(ids, vec![a.clone(), b.clone()]);
                assert!(init.locks.is_empty());
            }
            other => panic!("expected init, got {other:?}"),
        }
        match drain(&mut rx_a).as_slice() {
            [ServerMessage::UserJoin(j)] => assert_eq!(j.user.id, b),
            other => panic!("expected user_join, got {other:?}"),
        }
    }

    #[test]
    fn acquire_grant_then_denial_then_disconnect_scenario() {
        let mut hub = hub();
        let (a, mut rx_a) = join(&mut hub);
        let (b, mut rx_b) = join(&mut hub);
        drain(&mut rx_a);
        drain(&mut rx_b);

        hub.handle(&a, ClientMessage::acquire("Task_1", a.as_str())).unwrap();
        assert_eq!(
            drain(&mut rx_a),
            vec![
                ServerMessage::LockAcquired(LockAcquiredMessage {
                    element_id: "Task_1".into(),
                    user_id: a.clone(),
                }),
                locks(&[("Task_1", a.as_str())]),
            ]
        );
        assert_eq!(drain(&mut rx_b), vec![locks(&[("Task_1", a.as_str())])]);

        hub.handle(&b, ClientMessage::acquire("Task_1", b.as_str())).unwrap();
        assert_eq!(
            drain(&mut rx_b),
            vec![ServerMessage::LockDenied(LockDeniedMessage {
                element_id: "Task_1".into(),
                user_id: b.clone(),
                owner: Some(a.clone()),
                reason: DenyReason::Held,
            })]
        );
        assert!(drain(&mut rx_a).is_empty(), "denial must not be broadcast");
        assert_eq!(hub.locks.owner_of("Task_1"), Some(a.as_str()));

        hub.disconnect(&a);
        assert_eq!(
            drain(&mut rx_b),
            vec![
                locks(&[]),
                ServerMessage::UserLeave(UserLeaveMessage { user_id: a.clone() }),
            ]
        );
    }

    #[test]
    fn exempt_elements_are_never_locked() {
        let mut hub = hub();
        let (a, mut rx_a) = join(&mut hub);
        drain(&mut rx_a);

        hub.handle(&a, ClientMessage::acquire("canvas", a.as_str())).unwrap();

        match drain(&mut rx_a).as_slice() {
            [ServerMessage::LockDenied(d)] => {
                assert_eq!(d.reason, DenyReason::Exempt);
                assert_eq!(d.owner, None);
            }
            other => panic!("expected exempt denial, got {other:?}"),
        }
        assert!(hub.locks.is_empty());
    }

    #[test]
    fn document_update_skips_sender() {
        let mut hub = hub();
        let (a, mut rx_a) = join(&mut hub);
        let (_b, mut rx_b) = join(&mut hub);
        let (_c, mut rx_c) = join(&mut hub);
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_c);

        hub.handle(&a, ClientMessage::update_xml("<new/>", a.as_str())).unwrap();

        assert!(drain(&mut rx_a).is_empty());
        let expected = ServerMessage::XmlUpdate(XmlUpdateMessage {
            xml: "<new/>".into(),
            by: a.clone(),
        });
        assert_eq!(drain(&mut rx_b), vec![expected.clone()]);
        assert_eq!(drain(&mut rx_c), vec![expected]);
        assert_eq!(hub.document.current().by.as_deref(), Some(a.as_str()));
    }

    #[test]
    fn release_of_foreign_lock_changes_nothing_but_still_broadcasts() {
        let mut hub = hub();
        let (a, mut rx_a) = join(&mut hub);
        let (b, mut rx_b) = join(&mut hub);
        hub.handle(&a, ClientMessage::acquire("Task_1", a.as_str())).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);

        hub.handle(&b, ClientMessage::release("Task_1", b.as_str())).unwrap();

        assert_eq!(drain(&mut rx_b), vec![locks(&[("Task_1", a.as_str())])]);
        assert_eq!(drain(&mut rx_a), vec![locks(&[("Task_1", a.as_str())])]);
    }

    #[test]
    fn owner_release_is_confirmed_to_requester() {
        let mut hub = hub();
        let (a, mut rx_a) = join(&mut hub);
        hub.handle(&a, ClientMessage::acquire("Task_1", a.as_str())).unwrap();
        drain(&mut rx_a);

        hub.handle(&a, ClientMessage::release("Task_1", a.as_str())).unwrap();

        assert_eq!(
            drain(&mut rx_a),
            vec![
                ServerMessage::LockReleased(LockReleasedMessage {
                    element_id: "Task_1".into(),
                    user_id: a.clone(),
                }),
                locks(&[]),
            ]
        );
    }

    #[test]
    fn spoofed_identity_is_rejected() {
        let mut hub = hub();
        let (a, mut rx_a) = join(&mut hub);
        let (b, _rx_b) = join(&mut hub);
        drain(&mut rx_a);

        let err = hub
            .handle(&a, ClientMessage::acquire("Task_1", b.as_str()))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::IdentityMismatch { .. }));
        assert!(hub.locks.is_empty());

        let err = hub
            .handle(
                &a,
                ClientMessage::UpdateXml(UpdateXmlMessage {
                    xml: "<x/>".into(),
                    by: Some(b.clone()),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, ProtocolError::IdentityMismatch { .. }));
        assert_eq!(hub.document.current().xml, "<seed/>");
    }

    #[test]
    fn closed_outbox_triggers_full_cleanup() {
        let mut hub = hub();
        let (a, rx_a) = join(&mut hub);
        let (b, mut rx_b) = join(&mut hub);
        hub.handle(&a, ClientMessage::acquire("Task_1", a.as_str())).unwrap();
        drain(&mut rx_b);
        drop(rx_a);

        // The next broadcast discovers a's closed outbox.
        hub.handle(&b, ClientMessage::acquire("Task_2", b.as_str())).unwrap();

        assert_eq!(hub.registry.len(), 1);
        assert_eq!(hub.locks.owner_of("Task_1"), None);
        let to_b = drain(&mut rx_b);
        assert!(to_b.contains(&ServerMessage::UserLeave(UserLeaveMessage { user_id: a.clone() })));
        assert_eq!(to_b.iter().rev().nth(1), Some(&locks(&[("Task_2", b.as_str())])));
    }

    #[test]
    fn stalled_reader_is_disconnected_once_its_outbox_fills() {
        let mut hub = hub();
        let (a, mut rx_a) = join(&mut hub);
        let (b, _stalled) = join(&mut hub);
        hub.handle(&b, ClientMessage::acquire("Task_1", b.as_str())).unwrap();
        drain(&mut rx_a);

        let big = "x".repeat(64 * 1024);
        for _ in 0..OUTBOX {
            hub.handle(&a, ClientMessage::update_xml(big.as_str(), a.as_str())).unwrap();
            if hub.registry.len() == 1 {
                break;
            }
        }

        assert_eq!(hub.registry.len(), 1);
        assert_eq!(hub.locks.owner_of("Task_1"), None);
        let to_a = drain(&mut rx_a);
        assert_eq!(to_a, vec![locks(&[]), ServerMessage::UserLeave(UserLeaveMessage { user_id: b.clone() })]);
    }

    #[test]
    fn duplicate_dead_reports_tear_down_once() {
        let mut hub = hub();
        let (a, rx_a) = join(&mut hub);
        let (_b, mut rx_b) = join(&mut hub);
        drop(rx_a);
        drain(&mut rx_b);

        assert_eq!(hub.reap(vec![a.clone(), a.clone()]), 1);
        let leaves = drain(&mut rx_b)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::UserLeave(_)))
            .count();
        assert_eq!(leaves, 1);
        assert_eq!(hub.reap(vec![a]), 0);
    }

    #[test]
    fn single_lock_policy_releases_previous_lock_on_grant() {
        let mut hub = Hub::new(
            "",
            HubSettings {
                enforce_single_lock: true,
                ..HubSettings::default()
            },
        );
        let (a, _rx) = join(&mut hub);
        hub.handle(&a, ClientMessage::acquire("Task_1", a.as_str())).unwrap();
        hub.handle(&a, ClientMessage::acquire("Task_2", a.as_str())).unwrap();

        assert_eq!(hub.locks.owner_of("Task_1"), None);
        assert_eq!(hub.locks.owner_of("Task_2"), Some(a.as_str()));
    }

    #[test]
    fn messages_from_departed_sessions_are_ignored() {
        let mut hub = hub();
        let (a, _rx_a) = join(&mut hub);
        hub.disconnect(&a);
        hub.handle(&a, ClientMessage::acquire("Task_1", a.as_str())).unwrap();
        assert!(hub.locks.is_empty());
        hub.disconnect(&a);
    }

    #[test]
    fn ping_is_answered_only_to_sender() {
        let mut hub = hub();
        let (a, mut rx_a) = join(&mut hub);
        let (_b, mut rx_b) = join(&mut hub);
        drain(&mut rx_a);
        drain(&mut rx_b);

        hub.handle(&a, ClientMessage::Ping).unwrap();
        assert!(matches!(drain(&mut rx_a).as_slice(), [ServerMessage::Pong(_)]));
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn handle_serializes_commands_through_task() {
        let handle = HubHandle::spawn(hub());
        let (tx_a, mut rx_a) = mpsc::channel(OUTBOX);
        let (tx_b, mut rx_b) = mpsc::channel(OUTBOX);
        let a = handle.connect(tx_a).await.unwrap();
        let b = handle.connect(tx_b).await.unwrap();

        handle.submit(&a, ClientMessage::acquire("Task_1", a.as_str())).unwrap();
        handle.submit(&b, ClientMessage::acquire("Task_1", b.as_str())).unwrap();
        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.locks, 1);

        let a_msgs = drain(&mut rx_a);
        assert!(a_msgs.iter().any(|m| matches!(m, ServerMessage::LockAcquired(_))));
        let b_msgs = drain(&mut rx_b);
        assert!(b_msgs.iter().any(|m| matches!(
            m,
            ServerMessage::LockDenied(d) if d.owner.as_deref() == Some(a.as_str())
        )));

        handle.disconnect(&a);
        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.locks, 0);
    }
}
