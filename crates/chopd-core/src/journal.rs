//! Request journal: the append-only record of queued requests.
//!
//! One entry per mutating request, created before the upstream fetch (so a
//! crash of the target still leaves the request visible) and completed with
//! either the target's response or the transport error. Entries are immutable
//! once completed.
//!
//! The serialized shape is part of the tool's wire contract with its
//! inspector UIs, hence the camelCase field names.

use std::collections::BTreeMap;
use std::sync::Mutex;

use axum::http::HeaderMap;
use bytes::Bytes;
use serde::Serialize;

use crate::context::ContextStore;

/// Snapshot of the target's response recorded on an entry.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseRecord {
    /// HTTP status code.
    pub status: u16,
    /// Canonical reason phrase for the status, when one exists.
    #[serde(rename = "statusText")]
    pub status_text: String,
    /// Response headers, lossily decoded to strings.
    pub headers: BTreeMap<String, String>,
    /// Response body, lossily decoded to a string.
    pub body: String,
}

/// One journaled request.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Identifier correlating this entry with its context sequence.
    #[serde(rename = "requestId")]
    pub request_id: String,
    /// HTTP method.
    pub method: String,
    /// Path plus query of the original request.
    pub url: String,
    /// Request headers at admission, after identity injection.
    pub headers: BTreeMap<String, String>,
    /// Request body, lossily decoded to a string.
    pub body: String,
    /// ISO-8601 UTC timestamp of admission.
    pub timestamp: String,
    /// The target's response, once received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseRecord>,
    /// Transport-level failure message, if the fetch never completed.
    #[serde(rename = "responseError", skip_serializing_if = "Option::is_none")]
    pub response_error: Option<String>,
    /// Context entries reported for this request, joined in at read time.
    pub contexts: Vec<String>,
}

/// Flattens a header map into name → lossy string pairs.
#[must_use]
pub fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).to_string(),
            )
        })
        .collect()
}

/// Append-only, process-lived list of [`LogEntry`].
///
/// Kept behind its own lock, separate from the context store and the queue,
/// so `/logs` readers never block mutating-request dispatch.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Mutex<Vec<LogEntry>>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fresh entry. Called once per queued request, pre-forward.
    pub fn append(&self, entry: LogEntry) {
        let mut entries = self.entries.lock().expect("journal lock poisoned");
        entries.push(entry);
    }

    /// Completes the entry for `request_id` with the target's response.
    pub fn complete(&self, request_id: &str, response: ResponseRecord) {
        let mut entries = self.entries.lock().expect("journal lock poisoned");
        if let Some(entry) = entries.iter_mut().find(|e| e.request_id == request_id) {
            entry.response = Some(response);
        }
    }

    /// Completes the entry for `request_id` with a transport error.
    pub fn complete_with_error(&self, request_id: &str, message: String) {
        let mut entries = self.entries.lock().expect("journal lock poisoned");
        if let Some(entry) = entries.iter_mut().find(|e| e.request_id == request_id) {
            entry.response_error = Some(message);
        }
    }

    /// Returns a snapshot of all entries in admission order, with each
    /// entry's `contexts` populated from the store at read time.
    #[must_use]
    pub fn snapshot(&self, contexts: &ContextStore) -> Vec<LogEntry> {
        let entries = self.entries.lock().expect("journal lock poisoned");
        let mut out = entries.clone();
        drop(entries);

        for entry in &mut out {
            if let Some(sequence) = contexts.get(&entry.request_id) {
                entry.contexts = sequence
                    .iter()
                    .map(|b| String::from_utf8_lossy(b).to_string())
                    .collect();
            }
        }
        out
    }

    /// Number of journaled requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("journal lock poisoned").len()
    }

    /// Whether the journal is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the admission-time half of an entry.
#[must_use]
pub fn new_entry(
    request_id: String,
    method: &str,
    url: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> LogEntry {
    LogEntry {
        request_id,
        method: method.to_string(),
        url: url.to_string(),
        headers: headers_to_map(headers),
        body: String::from_utf8_lossy(body).to_string(),
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        response: None,
        response_error: None,
        contexts: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn sample_entry(id: &str) -> LogEntry {
        let mut headers = HeaderMap::new();
        headers.insert("x-address", HeaderValue::from_static("0xabc"));
        new_entry(
            id.to_string(),
            "POST",
            "/slow?x=1",
            &headers,
            &Bytes::from_static(b"{\"test\":true}"),
        )
    }

    #[test]
    fn snapshot_preserves_admission_order() {
        let journal = Journal::new();
        let contexts = ContextStore::new();
        journal.append(sample_entry("r1"));
        journal.append(sample_entry("r2"));

        let snapshot = journal.snapshot(&contexts);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].request_id, "r1");
        assert_eq!(snapshot[1].request_id, "r2");
    }

    #[test]
    fn snapshot_joins_contexts_at_read_time() {
        let journal = Journal::new();
        let contexts = ContextStore::new();
        contexts.register("r1");
        journal.append(sample_entry("r1"));

        assert!(journal.snapshot(&contexts)[0].contexts.is_empty());

        assert!(contexts.append("r1", Bytes::from_static(b"context #1")));
        assert!(contexts.append("r1", Bytes::from_static(b"context #2")));

        let snapshot = journal.snapshot(&contexts);
        assert_eq!(snapshot[0].contexts, vec!["context #1", "context #2"]);
    }

    #[test]
    fn complete_records_response_once() {
        let journal = Journal::new();
        journal.append(sample_entry("r1"));
        journal.complete(
            "r1",
            ResponseRecord {
                status: 201,
                status_text: "Created".to_string(),
                headers: BTreeMap::new(),
                body: "{}".to_string(),
            },
        );

        let snapshot = journal.snapshot(&ContextStore::new());
        let response = snapshot[0].response.as_ref().unwrap();
        assert_eq!(response.status, 201);
        assert!(snapshot[0].response_error.is_none());
    }

    #[test]
    fn complete_with_error_records_message() {
        let journal = Journal::new();
        journal.append(sample_entry("r1"));
        journal.complete_with_error("r1", "connection refused".to_string());

        let snapshot = journal.snapshot(&ContextStore::new());
        assert!(snapshot[0].response.is_none());
        assert_eq!(
            snapshot[0].response_error.as_deref(),
            Some("connection refused")
        );
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let mut entry = sample_entry("r1");
        entry.response_error = Some("boom".to_string());
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("requestId").is_some());
        assert!(json.get("responseError").is_some());
        assert!(json.get("request_id").is_none());
    }
}
