use std::collections::HashMap;

use crate::models::{ElementId, LockSnapshot, SessionId};

/// Result of an acquire attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Granted,
    Denied { owner: SessionId },
}

/// Authoritative element -> owner mapping.
///
/// Every operation takes `&mut self`, so the decision and the mutation of an
/// acquire happen as a single step for whoever holds the table.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: HashMap<ElementId, SessionId>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant the lock if the element is free or already held by `requester`.
    pub fn acquire(&mut self, element: &str, requester: &str) -> AcquireOutcome {
        match self.locks.get(element) {
            Some(owner) if owner != requester => AcquireOutcome::Denied {
                owner: owner.clone(),
            },
            Some(_) => AcquireOutcome::Granted,
            None => {
                self.locks.insert(element.to_string(), requester.to_string());
                AcquireOutcome::Granted
            }
        }
    }

    /// Clear the entry if `requester` owns it. Returns whether anything was removed.
    pub fn release(&mut self, element: &str, requester: &str) -> bool {
        if self.locks.get(element).map(String::as_str) == Some(requester) {
            self.locks.remove(element);
            true
        } else {
            false
        }
    }

    /// Remove every lock held by `owner`, returning the released elements.
    pub fn release_all(&mut self, owner: &str) -> Vec<ElementId> {
        let mut released: Vec<ElementId> = self
            .locks
            .iter()
            .filter(|(_, o)| o.as_str() == owner)
            .map(|(e, _)| e.clone())
            .collect();
        for element in &released {
            self.locks.remove(element);
        }
        released.sort();
        released
    }

    /// Remove every lock held by `owner` other than `keep`.
    pub fn release_others(&mut self, owner: &str, keep: &str) -> Vec<ElementId> {
        let mut released: Vec<ElementId> = self
            .locks
            .iter()
            .filter(|(e, o)| o.as_str() == owner && e.as_str() != keep)
            .map(|(e, _)| e.clone())
            .collect();
        for element in &released {
            self.locks.remove(element);
        }
        released.sort();
        released
    }

    pub fn snapshot(&self) -> LockSnapshot {
        self.locks
            .iter()
            .map(|(e, o)| (e.clone(), o.clone()))
            .collect()
    }

    pub fn owner_of(&self, element: &str) -> Option<&str> {
        self.locks.get(element).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
