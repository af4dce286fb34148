use crate::models::SessionId;

/// The canonical document value and who wrote it last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub xml: String,
    /// Originating session, used only for echo suppression. `None` for the seed.
    pub by: Option<SessionId>,
    pub revision: u64,
}

/// Holds the single shared document. Whole-value replace, last write wins.
#[derive(Debug)]
pub struct DocumentStore {
    current: DocumentSnapshot,
}

impl DocumentStore {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            current: DocumentSnapshot {
                xml: seed.into(),
                by: None,
                revision: 0,
            },
        }
    }

    /// Overwrite the canonical value. No well-formedness check happens here.
    pub fn replace(&mut self, xml: String, by: &str) {
        self.current = DocumentSnapshot {
            xml,
            by: Some(by.to_string()),
            revision: self.current.revision + 1,
        };
    }

    pub fn current(&self) -> &DocumentSnapshot {
        &self.current
    }
}
