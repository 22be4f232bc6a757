//! Context store: out-of-band data reported by the target.
//!
//! While a queued request is in flight, the target may POST opaque byte
//! strings to the proxy's report-context endpoint, tagged with the request's
//! identifier. The store keeps one append-only sequence per identifier, in
//! invocation order.
//!
//! Sequences are created at queue admission and never destroyed: `/logs` must
//! be able to join them long after the originating request completed, and late
//! reports are accepted for the life of the process.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;

/// Process-wide mapping from request identifier to its context sequence.
///
/// Handlers run concurrently, so the map lives behind a lock; critical
/// sections are short and never held across await points.
#[derive(Debug, Default)]
pub struct ContextStore {
    entries: Mutex<HashMap<String, Vec<Bytes>>>,
}

impl ContextStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request identifier with an empty sequence.
    ///
    /// Called at queue admission, before the target can possibly learn the
    /// identifier, so a report can never race an unregistered id.
    pub fn register(&self, request_id: &str) {
        let mut entries = self.entries.lock().expect("context store lock poisoned");
        entries.entry(request_id.to_string()).or_default();
    }

    /// Appends a raw context payload to the sequence for `request_id`.
    ///
    /// Returns `false` if the identifier was never registered; the caller
    /// maps that to 404.
    #[must_use]
    pub fn append(&self, request_id: &str, payload: Bytes) -> bool {
        let mut entries = self.entries.lock().expect("context store lock poisoned");
        match entries.get_mut(request_id) {
            Some(sequence) => {
                sequence.push(payload);
                true
            }
            None => false,
        }
    }

    /// Returns a snapshot of the sequence for `request_id`, if registered.
    #[must_use]
    pub fn get(&self, request_id: &str) -> Option<Vec<Bytes>> {
        let entries = self.entries.lock().expect("context store lock poisoned");
        entries.get(request_id).cloned()
    }

    /// Whether `request_id` has been registered.
    #[must_use]
    pub fn contains(&self, request_id: &str) -> bool {
        let entries = self.entries.lock().expect("context store lock poisoned");
        entries.contains_key(request_id)
    }
}
