use crate::models::{ClientMessage, ElementId, ServerMessage};

use super::context::MutationContext;
use super::guard::{GuardDecision, LockGuard};
use super::reconciler::{ReconcileOutcome, Reconciler};
use super::state::ClientState;
use super::toolkit::DiagramToolkit;

/// Client side of one collaboration session: reconciler plus guard around a toolkit.
///
/// Every method that needs the server returns the messages to send; the
/// caller owns the transport.
pub struct CollabSession<T: DiagramToolkit> {
    reconciler: Reconciler<T>,
    guard: LockGuard,
}

impl<T: DiagramToolkit> CollabSession<T> {
    pub fn new(toolkit: T) -> Self {
        Self {
            reconciler: Reconciler::new(toolkit),
            guard: LockGuard::new(),
        }
    }

    pub fn state(&self) -> &ClientState {
        self.reconciler.state()
    }

    pub fn toolkit(&self) -> &T {
        self.reconciler.toolkit()
    }

    pub fn guard(&self) -> &LockGuard {
        &self.guard
    }

    pub fn receive(&mut self, message: ServerMessage) -> ReconcileOutcome {
        self.guard.observe(&message);
        self.reconciler.apply(message)
    }

    /// Mutation intercept: consulted before the toolkit applies an edit.
    pub fn validate(&self, context: &MutationContext) -> GuardDecision {
        self.guard
            .validate(self.reconciler.state(), self.reconciler.toolkit(), context)
    }

    /// The user clicked or started dragging `element`.
    pub fn select(&mut self, element: &str) -> Vec<ClientMessage> {
        self.guard
            .try_acquire(self.reconciler.state(), self.reconciler.toolkit(), element)
    }

    /// The user clicked empty canvas, or the session is being torn down.
    pub fn release_current(&mut self) -> Vec<ClientMessage> {
        self.guard.release_current(self.reconciler.state())
    }

    /// The toolkit applied an allowed edit and serialized the result.
    pub fn commit_local_edit(&mut self, xml: &str) -> Option<ClientMessage> {
        let me = self.reconciler.state().self_id.clone()?;
        self.reconciler.record_local_document(xml);
        Some(ClientMessage::update_xml(xml, me))
    }

    pub fn affected(&self, context: &MutationContext) -> Vec<ElementId> {
        LockGuard::extract_affected(self.reconciler.toolkit(), context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;

    struct Headless;

    impl DiagramToolkit for Headless {
        fn root_element_id(&self) -> Option<ElementId> {
            Some("Process_1".into())
        }
        fn import_document(&mut self, _xml: &str) {}
        fn render_locks(&mut self, _locks: &LockSnapshot, _self_id: Option<&str>) {}
    }

    fn joined(me: &str, locks: LockSnapshot) -> CollabSession<Headless> {
        let mut session = CollabSession::new(Headless);
        session.receive(ServerMessage::Init(InitMessage {
            xml: "<v1/>".into(),
            user_id: me.into(),
            users: Vec::new(),
            locks,
        }));
        session
    }

    #[test]
    fn blocked_edit_issues_no_acquire() {
        let locks: LockSnapshot = [("Task_2".to_string(), "B".to_string())].into_iter().collect();
        let session = joined("A", locks);

        let decision = session.validate(&MutationContext::Elements(vec![
            "Task_2".into(),
            "Task_3".into(),
        ]));

        assert!(!decision.is_allowed());
        assert!(!session.guard().is_pending("Task_3"));
    }

    #[test]
    fn select_then_grant_settles_pending_and_mirror() {
        let mut session = joined("A", LockSnapshot::new());
        assert_eq!(session.select("Task_1"), vec![ClientMessage::acquire("Task_1", "A")]);
        assert!(session.guard().is_pending("Task_1"));

        session.receive(ServerMessage::LockAcquired(LockAcquiredMessage {
            element_id: "Task_1".into(),
            user_id: "A".into(),
        }));

        assert!(!session.guard().is_pending("Task_1"));
        assert_eq!(session.state().owner_of("Task_1"), Some("A"));
        assert_eq!(session.release_current(), vec![ClientMessage::release("Task_1", "A")]);
    }

    #[test]
    fn local_edit_needs_an_identity() {
        let mut session = CollabSession::new(Headless);
        assert!(session.commit_local_edit("<x/>").is_none());

        let mut session = joined("A", LockSnapshot::new());
        assert_eq!(
            session.commit_local_edit("<v2/>"),
            Some(ClientMessage::update_xml("<v2/>", "A"))
        );
        assert_eq!(session.state().document, "<v2/>");
    }
}
