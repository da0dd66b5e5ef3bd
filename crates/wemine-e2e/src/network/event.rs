// Observed network traffic
//
// Every request that leaves a session produces a Request event, followed by
// exactly one Response or Failed event. Events carry a per-session sequence
// number so tests can assert call ordering.

use super::controller::{NetworkController, SubscriptionId};
use super::pattern::UrlPattern;
use crate::error::{Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Request is about to be sent (after offline check, before rules)
    Request,
    /// A response arrived, either from the backend or a fulfill rule.
    ///
    /// `status` is `None` when no status was observed.
    Response { status: Option<u16>, body: Bytes },
    /// The request failed at transport level
    Failed { error_code: String },
}

/// One observed request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEvent {
    /// Session-wide order index; strictly increasing
    pub seq: u64,
    /// Time since the session's network controller was created
    pub at: Duration,
    pub method: String,
    pub url: String,
    pub kind: EventKind,
}

impl NetworkEvent {
    pub fn is_request(&self) -> bool {
        matches!(self.kind, EventKind::Request)
    }

    pub fn is_response(&self) -> bool {
        matches!(self.kind, EventKind::Response { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.kind, EventKind::Failed { .. })
    }

    /// Converts a response event into a [`CapturedResponse`].
    pub fn as_response(&self) -> Option<CapturedResponse> {
        match &self.kind {
            EventKind::Response { status, body } => Some(CapturedResponse {
                seq: self.seq,
                at: self.at,
                method: self.method.clone(),
                url: self.url.clone(),
                status: *status,
                body: body.clone(),
            }),
            _ => None,
        }
    }
}

/// A response delivered to a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub seq: u64,
    pub at: Duration,
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub body: Bytes,
}

impl CapturedResponse {
    /// True for 2xx. A response without an observed status is never ok.
    pub fn ok(&self) -> bool {
        self.status.is_some_and(|s| (200..300).contains(&s))
    }

    /// Fails with [`Error::UnexpectedStatus`] unless the status is in `expected`.
    ///
    /// A missing status is reported as `actual: 0`.
    pub fn expect_status(&self, expected: &[u16]) -> Result<&Self> {
        match self.status {
            Some(actual) if expected.contains(&actual) => Ok(self),
            status => Err(Error::UnexpectedStatus {
                url: self.url.clone(),
                expected: expected.to_vec(),
                actual: status.unwrap_or_default(),
            }),
        }
    }

    /// Same as [`expect_status`](Self::expect_status) for any 2xx.
    pub fn expect_success(&self) -> Result<&Self> {
        if self.ok() {
            return Ok(self);
        }
        Err(Error::UnexpectedStatus {
            url: self.url.clone(),
            expected: (200..300).collect(),
            actual: self.status.unwrap_or_default(),
        })
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Append-only log of events seen since it was created.
///
/// A recording is its own subscription: it starts empty, never sees events
/// that happened before it was created, and stops collecting when dropped.
/// Start a new recording to restart the sequence.
pub struct Recording {
    events: Arc<Mutex<Vec<NetworkEvent>>>,
    controller: NetworkController,
    subscription: SubscriptionId,
}

impl Recording {
    pub(crate) fn start(controller: &NetworkController) -> Self {
        let events: Arc<Mutex<Vec<NetworkEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = controller.subscribe(move |event| sink.lock().push(event.clone()));
        Self {
            events,
            controller: controller.clone(),
            subscription,
        }
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<NetworkEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Request events whose URL matches.
    pub fn requests(&self, pattern: &UrlPattern) -> Vec<NetworkEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.is_request() && pattern.matches(&e.url))
            .cloned()
            .collect()
    }

    /// Response events whose URL matches.
    pub fn responses(&self, pattern: &UrlPattern) -> Vec<CapturedResponse> {
        self.events
            .lock()
            .iter()
            .filter(|e| pattern.matches(&e.url))
            .filter_map(NetworkEvent::as_response)
            .collect()
    }

    /// Number of requests whose URL matches.
    pub fn count(&self, pattern: &UrlPattern) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.is_request() && pattern.matches(&e.url))
            .count()
    }

    /// Sequence number of the first request whose URL matches.
    pub fn first_request_seq(&self, pattern: &UrlPattern) -> Option<u64> {
        self.events
            .lock()
            .iter()
            .find(|e| e.is_request() && pattern.matches(&e.url))
            .map(|e| e.seq)
    }

    /// Fails unless the first `earlier` request precedes the first `later` one.
    pub fn assert_order(&self, earlier: &UrlPattern, later: &UrlPattern) -> Result<()> {
        let first = self.first_request_seq(earlier);
        let second = self.first_request_seq(later);
        match (first, second) {
            (Some(a), Some(b)) if a < b => Ok(()),
            (Some(a), Some(b)) => Err(Error::AssertionFailed(format!(
                "expected {} (#{}) before {} (#{})",
                earlier, a, later, b
            ))),
            _ => Err(Error::AssertionFailed(format!(
                "expected requests to both {} and {}, saw {:?} and {:?}",
                earlier, later, first, second
            ))),
        }
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        self.controller.unsubscribe(self.subscription);
    }
}

impl std::fmt::Debug for Recording {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recording")
            .field("subscription", &self.subscription)
            .field("len", &self.len())
            .finish()
    }
}
