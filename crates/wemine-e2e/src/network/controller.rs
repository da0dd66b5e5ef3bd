// NetworkController - session-scoped network conditions and traffic observation
//
// Every outgoing request of a session passes through `intercept`, which
// applies the offline toggle and the installed rules. The transports report
// what happened through `emit_*`, which feeds subscribers (recordings) and
// resolves pending waits. Events are queued in sequence order and delivered
// with no controller lock held, so callbacks and predicates may use the
// controller themselves.

use super::event::{CapturedResponse, EventKind, NetworkEvent, Recording};
use super::pattern::UrlPattern;
use super::rule::{MockResponse, NetworkRule, OFFLINE_ABORT_CODE, RuleAction};
use crate::error::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Extra latency applied by [`NetworkController::simulate_slow_network`] callers
/// that have no better figure
pub const DEFAULT_SLOW_DELAY: Duration = Duration::from_secs(1);

/// Failure rate used by flaky-network tests
pub const DEFAULT_FLAKY_RATE: f64 = 0.3;

/// Handle returned by [`NetworkController::subscribe`]
pub type SubscriptionId = u64;

type Callback = Arc<dyn Fn(&NetworkEvent) + Send + Sync>;
/// Predicate deciding whether a response resolves a wait
pub type WaitPredicate = Arc<dyn Fn(&CapturedResponse) -> bool + Send + Sync>;

/// Request metadata handed to [`NetworkController::intercept`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
        }
    }
}

/// Outcome of rule evaluation for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Interception {
    /// Send the request to the backend
    Continue,
    /// Answer locally with a canned response
    Fulfill(MockResponse),
    /// Fail at transport level with this error code
    Abort(String),
}

struct Waiter {
    predicate: WaitPredicate,
    tx: oneshot::Sender<CapturedResponse>,
}

#[derive(Default)]
struct Dispatch {
    queue: VecDeque<NetworkEvent>,
    // Set while some caller is draining the queue
    draining: bool,
}

struct Inner {
    started: Instant,
    offline: AtomicBool,
    rules: Mutex<Vec<NetworkRule>>,
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
    waiters: Mutex<HashMap<u64, Waiter>>,
    next_id: AtomicU64,
    seq: AtomicU64,
    dispatch: Mutex<Dispatch>,
    rng: Mutex<StdRng>,
}

/// Network conditions and traffic observation for one session.
///
/// Cloning yields another handle to the same state. Rules and the offline
/// toggle are part of the owning session and are cleared when it closes.
#[derive(Clone)]
pub struct NetworkController {
    inner: Arc<Inner>,
}

impl NetworkController {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Controller whose probabilistic aborts replay identically for a seed.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Inner {
                started: Instant::now(),
                offline: AtomicBool::new(false),
                rules: Mutex::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
                waiters: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                seq: AtomicU64::new(0),
                dispatch: Mutex::new(Dispatch::default()),
                rng: Mutex::new(rng),
            }),
        }
    }

    /// Suspends (`true`) or restores (`false`) all outbound traffic.
    ///
    /// While offline every request fails at transport level. Pair each
    /// offline toggle with an online toggle in the same test.
    pub fn set_offline(&self, offline: bool) {
        let was = self.inner.offline.swap(offline, Ordering::SeqCst);
        if was != offline {
            tracing::info!(offline, "Network offline toggle changed");
        }
    }

    pub fn is_offline(&self) -> bool {
        self.inner.offline.load(Ordering::SeqCst)
    }

    /// Adds a rule. Later rules take precedence over earlier ones.
    pub fn install_rule(&self, rule: NetworkRule) {
        tracing::debug!(pattern = %rule.pattern, action = ?rule.action, "Installing network rule");
        self.inner.rules.lock().push(rule);
    }

    /// Answers requests matching `pattern` with `payload` serialized as JSON.
    pub fn mock<T: Serialize + ?Sized>(
        &self,
        pattern: impl Into<UrlPattern>,
        payload: &T,
        status: u16,
    ) -> Result<()> {
        let response = MockResponse::json(status, payload)?;
        self.install_rule(NetworkRule::fulfill(pattern, response));
        Ok(())
    }

    /// Delays every request by `delay`.
    pub fn simulate_slow_network(&self, delay: Duration) {
        self.install_rule(NetworkRule::delay(UrlPattern::Any, delay));
    }

    /// Fails each request with probability `failure_rate`.
    pub fn simulate_flaky_network(&self, failure_rate: f64) -> Result<()> {
        self.install_rule(NetworkRule::abort(UrlPattern::Any, failure_rate)?);
        Ok(())
    }

    /// Fails every request matching `pattern`.
    pub fn block(&self, pattern: impl Into<UrlPattern>) {
        self.install_rule(NetworkRule {
            pattern: pattern.into(),
            action: RuleAction::Abort {
                probability: 1.0,
                error_code: "blockedbyclient".to_string(),
            },
        });
    }

    /// Removes all rules; the offline toggle is left as is.
    pub fn clear_rules(&self) {
        let removed = {
            let mut rules = self.inner.rules.lock();
            let n = rules.len();
            rules.clear();
            n
        };
        if removed > 0 {
            tracing::debug!(removed, "Cleared network rules");
        }
    }

    pub fn rule_count(&self) -> usize {
        self.inner.rules.lock().len()
    }

    /// Registers a callback invoked synchronously for every observed event.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&NetworkEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.subscribers.lock().retain(|(sid, _)| *sid != id);
    }

    /// Starts a new recording of request/response metadata.
    pub fn record(&self) -> Recording {
        Recording::start(self)
    }

    /// Number of waits currently registered and unresolved.
    pub fn pending_waits(&self) -> usize {
        self.inner.waiters.lock().len()
    }

    /// Restores default conditions: online, no rules.
    ///
    /// Returns `true` if the session was still offline, which means the
    /// owning test never restored connectivity.
    pub fn reset(&self) -> bool {
        let was_offline = self.inner.offline.swap(false, Ordering::SeqCst);
        if was_offline {
            tracing::warn!("Session was left offline; restoring connectivity");
        }
        self.clear_rules();
        was_offline
    }

    /// Resets conditions and drops subscribers and pending waits.
    pub(crate) fn shutdown(&self) {
        self.reset();
        self.inner.subscribers.lock().clear();
        // Dropping the senders wakes pending waits with a closed channel
        self.inner.waiters.lock().clear();
    }

    /// Decides what happens to an outgoing request.
    ///
    /// Offline wins over every rule. Otherwise the rules are scanned newest
    /// first: all matching delays are summed and applied, and the first
    /// matching terminal action that fires decides the outcome. An abort that
    /// does not fire lets the scan continue.
    pub async fn intercept(&self, request: &RequestInfo) -> Interception {
        if self.is_offline() {
            tracing::debug!(url = %request.url, "Offline, aborting request");
            return Interception::Abort(OFFLINE_ABORT_CODE.to_string());
        }

        let rules = self.inner.rules.lock().clone();
        let mut delay = Duration::ZERO;
        let mut outcome = Interception::Continue;

        for rule in rules.iter().rev().filter(|r| r.matches(&request.url)) {
            match &rule.action {
                RuleAction::Delay(d) => delay += *d,
                RuleAction::Abort {
                    probability,
                    error_code,
                } => {
                    if matches!(outcome, Interception::Continue) && self.roll(*probability) {
                        outcome = Interception::Abort(error_code.clone());
                    }
                }
                RuleAction::Fulfill(response) => {
                    if matches!(outcome, Interception::Continue) {
                        outcome = Interception::Fulfill(response.clone());
                    }
                }
            }
        }

        if !delay.is_zero() {
            tracing::debug!(url = %request.url, ?delay, "Delaying request");
            tokio::time::sleep(delay).await;
        }

        if !matches!(outcome, Interception::Continue) {
            tracing::debug!(url = %request.url, ?outcome, "Request intercepted");
        }
        outcome
    }

    fn roll(&self, probability: f64) -> bool {
        if probability >= 1.0 {
            return true;
        }
        if probability <= 0.0 {
            return false;
        }
        self.inner.rng.lock().gen_bool(probability)
    }

    pub fn emit_request(&self, request: &RequestInfo) -> NetworkEvent {
        self.emit(request, EventKind::Request)
    }

    pub fn emit_response(
        &self,
        request: &RequestInfo,
        status: Option<u16>,
        body: Bytes,
    ) -> NetworkEvent {
        self.emit(request, EventKind::Response { status, body })
    }

    pub fn emit_failed(&self, request: &RequestInfo, error_code: impl Into<String>) -> NetworkEvent {
        self.emit(
            request,
            EventKind::Failed {
                error_code: error_code.into(),
            },
        )
    }

    fn emit(&self, request: &RequestInfo, kind: EventKind) -> NetworkEvent {
        let event = {
            let mut dispatch = self.inner.dispatch.lock();
            // Numbered under the queue lock so queue order is sequence order
            let event = NetworkEvent {
                seq: self.inner.seq.fetch_add(1, Ordering::SeqCst),
                at: self.inner.started.elapsed(),
                method: request.method.clone(),
                url: request.url.clone(),
                kind,
            };
            dispatch.queue.push_back(event.clone());
            if dispatch.draining {
                // The draining caller (possibly this one, re-entered from a
                // callback) delivers it after the events before it
                return event;
            }
            dispatch.draining = true;
            event
        };

        self.drain();
        event
    }

    fn drain(&self) {
        let _guard = DrainGuard(self);
        loop {
            let next = {
                let mut dispatch = self.inner.dispatch.lock();
                match dispatch.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        dispatch.draining = false;
                        break;
                    }
                }
            };
            self.deliver(&next);
        }
    }

    fn deliver(&self, event: &NetworkEvent) {
        let callbacks: Vec<Callback> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(event);
        }

        if let Some(response) = event.as_response() {
            self.resolve_waiters(&response);
        }
    }

    fn resolve_waiters(&self, response: &CapturedResponse) {
        let candidates: Vec<(u64, WaitPredicate)> = self
            .inner
            .waiters
            .lock()
            .iter()
            .map(|(id, w)| (*id, Arc::clone(&w.predicate)))
            .collect();
        let ready: Vec<u64> = candidates
            .into_iter()
            .filter(|(_, predicate)| predicate(response))
            .map(|(id, _)| id)
            .collect();
        if ready.is_empty() {
            return;
        }

        // A wait cancelled since the snapshot is simply gone
        let resolved: Vec<Waiter> = {
            let mut waiters = self.inner.waiters.lock();
            ready.iter().filter_map(|id| waiters.remove(id)).collect()
        };
        for waiter in resolved {
            // Receiver gone means the wait already timed out
            let _ = waiter.tx.send(response.clone());
        }
    }

    /// Registers a pending wait resolved by the first matching response.
    pub(crate) fn register_waiter(
        &self,
        predicate: WaitPredicate,
    ) -> (u64, oneshot::Receiver<CapturedResponse>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner
            .waiters
            .lock()
            .insert(id, Waiter { predicate, tx });
        (id, rx)
    }

    pub(crate) fn cancel_waiter(&self, id: u64) {
        self.inner.waiters.lock().remove(&id);
    }
}

/// Hands the queue to the next emitter when a callback panics mid-drain.
struct DrainGuard<'a>(&'a NetworkController);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.inner.dispatch.lock().draining = false;
        }
    }
}

impl Default for NetworkController {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NetworkController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkController")
            .field("offline", &self.is_offline())
            .field("rules", &self.rule_count())
            .field("pending_waits", &self.pending_waits())
            .finish()
    }
}
