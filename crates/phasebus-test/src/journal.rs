//! Shared record of what interceptors did.

use parking_lot::Mutex;
use std::sync::Arc;

/// An append-only list of entries shared by recording interceptors.
///
/// Clones share the same entries, so one journal can be handed to every
/// interceptor of a test and inspected afterwards.
///
/// ```
/// use phasebus_test::Journal;
///
/// let journal = Journal::new();
/// let shared = journal.clone();
/// shared.record("decode");
/// shared.record("fault:decode");
///
/// assert_eq!(journal.entries(), vec!["decode", "fault:decode"]);
/// assert_eq!(journal.handled(), vec!["decode"]);
/// assert_eq!(journal.faulted(), vec!["decode"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

/// Prefix of entries written by fault handlers.
pub const FAULT_PREFIX: &str = "fault:";

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns a copy of all entries in order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Returns the IDs whose normal handler ran, in order.
    #[must_use]
    pub fn handled(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| !entry.starts_with(FAULT_PREFIX))
            .cloned()
            .collect()
    }

    /// Returns the IDs whose fault handler ran, in order.
    #[must_use]
    pub fn faulted(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| entry.strip_prefix(FAULT_PREFIX))
            .map(str::to_string)
            .collect()
    }

    /// Counts entries equal to `entry`.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_and_clear() {
        let journal = Journal::new();
        journal.record("a");
        journal.record("a");
        journal.record("fault:a");

        assert_eq!(journal.count("a"), 2);
        assert_eq!(journal.count("fault:a"), 1);
        assert_eq!(journal.len(), 3);

        journal.clear();
        assert!(journal.is_empty());
    }
}
