// WaitCoordinator - bounded waits on network events and page state
//
// Response waits are registered with the session's NetworkController and
// resolved by the first matching response observed after registration. Page
// state waits are cooperative poll loops against the Surface. A timeout is
// the only cancellation; a timed-out wait is unregistered and any late event
// is dropped.

use crate::error::{Error, Result};
use crate::locator::Target;
use crate::network::{CapturedResponse, NetworkController, UrlPattern};
use crate::network::controller::WaitPredicate;
use crate::surface::Surface;
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Default interval between predicate evaluations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Interval between selector checks
pub const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Loading indicator rendered by the application
pub const LOADING_SELECTOR: &str = ".loading, .spinner";

/// Budget for the loading indicator to show up (optional)
pub const LOADING_APPEAR_TIMEOUT: Duration = Duration::from_secs(2);

/// Budget for the loading indicator to go away (required)
pub const LOADING_HIDE_TIMEOUT: Duration = Duration::from_secs(30);

/// Identifies the response a wait is for.
#[derive(Clone)]
pub enum Matcher {
    /// Any response whose URL matches
    Url(UrlPattern),
    /// Responses accepted by an arbitrary predicate
    Predicate {
        description: String,
        predicate: WaitPredicate,
    },
}

impl Matcher {
    pub fn url(pattern: impl Into<UrlPattern>) -> Self {
        Matcher::Url(pattern.into())
    }

    pub fn predicate<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&CapturedResponse) -> bool + Send + Sync + 'static,
    {
        Matcher::Predicate {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Response to `method` requests whose URL matches.
    pub fn method(method: &str, pattern: impl Into<UrlPattern>) -> Self {
        let pattern = pattern.into();
        let method = method.to_ascii_uppercase();
        let description = format!("{} {}", method, pattern);
        Matcher::predicate(description, move |r| {
            r.method.eq_ignore_ascii_case(&method) && pattern.matches(&r.url)
        })
    }

    pub fn matches(&self, response: &CapturedResponse) -> bool {
        match self {
            Matcher::Url(pattern) => pattern.matches(&response.url),
            Matcher::Predicate { predicate, .. } => predicate(response),
        }
    }

    pub fn description(&self) -> String {
        match self {
            Matcher::Url(pattern) => format!("response from {}", pattern),
            Matcher::Predicate { description, .. } => description.clone(),
        }
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description())
    }
}

impl From<&str> for Matcher {
    fn from(pattern: &str) -> Self {
        Matcher::Url(UrlPattern::from(pattern))
    }
}

impl From<UrlPattern> for Matcher {
    fn from(pattern: UrlPattern) -> Self {
        Matcher::Url(pattern)
    }
}

/// A matcher together with its time budget.
#[derive(Debug, Clone)]
pub struct WaitSpec {
    pub matcher: Matcher,
    pub timeout: Duration,
}

impl WaitSpec {
    pub fn new(matcher: impl Into<Matcher>, timeout: Duration) -> Self {
        Self {
            matcher: matcher.into(),
            timeout,
        }
    }
}

/// A registered response wait.
///
/// Registration happens when the wait is created, so a wait created before
/// the action that triggers the request cannot miss its response. The
/// budget runs from registration. Dropping an unresolved wait unregisters it.
pub struct PendingWait {
    network: NetworkController,
    id: u64,
    rx: Option<oneshot::Receiver<CapturedResponse>>,
    description: String,
    registered_at: Instant,
    timeout: Duration,
}

impl PendingWait {
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Resolves with the matching response or fails with
    /// [`Error::Timeout`] once the budget is spent.
    pub async fn wait(mut self) -> Result<CapturedResponse> {
        let Some(rx) = self.rx.take() else {
            return Err(Error::InvalidArgument(format!(
                "wait for {} already consumed",
                self.description
            )));
        };

        let deadline = self.registered_at + self.timeout;
        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(response)) => {
                tracing::debug!(
                    waiting_for = %self.description,
                    url = %response.url,
                    status = ?response.status,
                    "Wait resolved"
                );
                Ok(response)
            }
            Ok(Err(_)) => Err(Error::SessionClosed(format!(
                "wait for {}",
                self.description
            ))),
            Err(_) => {
                self.network.cancel_waiter(self.id);
                let elapsed = self.registered_at.elapsed();
                tracing::debug!(waiting_for = %self.description, ?elapsed, "Wait timed out");
                Err(Error::Timeout {
                    waiting_for: self.description.clone(),
                    elapsed,
                })
            }
        }
    }
}

impl PendingWait {
    /// Returns the response if it has already arrived, without waiting.
    ///
    /// The wait is consumed either way; a response arriving later is dropped.
    pub fn take_if_resolved(mut self) -> Option<CapturedResponse> {
        self.rx.take().and_then(|mut rx| rx.try_recv().ok())
    }
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        self.network.cancel_waiter(self.id);
    }
}

impl std::fmt::Debug for PendingWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingWait")
            .field("description", &self.description)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Awaits every wait concurrently and surfaces the first failure in input
/// order once all of them have finished.
pub async fn wait_all(waits: Vec<PendingWait>) -> Result<Vec<CapturedResponse>> {
    let results = join_all(waits.into_iter().map(PendingWait::wait)).await;
    results.into_iter().collect()
}

/// Element condition for [`WaitCoordinator::wait_for_selector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// At least one match exists
    Attached,
    /// The first match exists and is visible
    Visible,
    /// No match is visible (absence counts)
    Hidden,
    /// No match exists
    Detached,
}

/// Blocks test steps until asynchronous conditions hold.
#[derive(Clone)]
pub struct WaitCoordinator {
    network: NetworkController,
    surface: Arc<dyn Surface>,
}

impl WaitCoordinator {
    pub fn new(network: NetworkController, surface: Arc<dyn Surface>) -> Self {
        Self { network, surface }
    }

    pub fn network(&self) -> &NetworkController {
        &self.network
    }

    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.surface
    }

    /// Registers a response wait now; await it with [`PendingWait::wait`].
    pub fn expect_response(&self, matcher: impl Into<Matcher>, timeout: Duration) -> PendingWait {
        let matcher = matcher.into();
        let description = matcher.description();
        let predicate: WaitPredicate = Arc::new(move |r: &CapturedResponse| matcher.matches(r));
        let (id, rx) = self.network.register_waiter(predicate);
        PendingWait {
            network: self.network.clone(),
            id,
            rx: Some(rx),
            description,
            registered_at: Instant::now(),
            timeout,
        }
    }

    /// Waits for the first matching response observed after this call.
    pub async fn wait_for(
        &self,
        matcher: impl Into<Matcher>,
        timeout: Duration,
    ) -> Result<CapturedResponse> {
        self.expect_response(matcher, timeout).wait().await
    }

    /// Waits for one response per matcher within a shared budget.
    ///
    /// All waits are registered before any is awaited, so interleaved
    /// responses are caught in real time. Results come back in matcher order.
    pub async fn wait_for_all<M>(
        &self,
        matchers: impl IntoIterator<Item = M>,
        timeout: Duration,
    ) -> Result<Vec<CapturedResponse>>
    where
        M: Into<Matcher>,
    {
        let waits: Vec<PendingWait> = matchers
            .into_iter()
            .map(|m| self.expect_response(m, timeout))
            .collect();
        wait_all(waits).await
    }

    /// Runs a [`WaitSpec`].
    pub async fn wait_for_spec(&self, spec: WaitSpec) -> Result<CapturedResponse> {
        self.wait_for(spec.matcher, spec.timeout).await
    }

    /// Polls `predicate` every 500ms until it returns `true`.
    pub async fn wait_for_condition<F, Fut>(
        &self,
        description: &str,
        timeout: Duration,
        predicate: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        poll_until(description, timeout, DEFAULT_POLL_INTERVAL, predicate).await
    }

    /// [`wait_for_condition`](Self::wait_for_condition) with a custom interval.
    pub async fn wait_for_condition_every<F, Fut>(
        &self,
        description: &str,
        timeout: Duration,
        poll_interval: Duration,
        predicate: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        poll_until(description, timeout, poll_interval, predicate).await
    }

    /// Waits until `selector` reaches `state`.
    ///
    /// A control that never becomes attached or visible is reported as
    /// [`Error::ElementNotFound`]; one that never goes away as
    /// [`Error::Timeout`].
    pub async fn wait_for_selector(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<()> {
        let surface = Arc::clone(&self.surface);
        let description = format!("{} to be {:?}", selector, state);
        let result = poll_until(&description, timeout, SELECTOR_POLL_INTERVAL, || {
            let surface = Arc::clone(&surface);
            async move {
                Ok(match state {
                    ElementState::Attached => surface.count(selector).await? > 0,
                    ElementState::Visible => surface.is_visible(selector).await?,
                    ElementState::Hidden => !surface.is_visible(selector).await?,
                    ElementState::Detached => surface.count(selector).await? == 0,
                })
            }
        })
        .await;

        match (result, state) {
            (Err(err), ElementState::Attached | ElementState::Visible) if err.is_timeout() => {
                Err(Error::ElementNotFound(selector.to_string()))
            }
            (other, _) => other,
        }
    }

    /// Resolves a two-tier target to the first tier that matches.
    ///
    /// Every poll tries the test identifier before the fallback.
    pub async fn resolve(&self, target: &Target, timeout: Duration) -> Result<String> {
        let start = Instant::now();
        loop {
            for selector in target.tiers() {
                if self.surface.count(selector).await? > 0 {
                    return Ok(selector.to_string());
                }
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(Error::ElementNotFound(target.to_string()));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL.min(timeout - elapsed)).await;
        }
    }

    /// Waits for the URL to match `pattern`.
    pub async fn wait_for_url(&self, pattern: &UrlPattern, timeout: Duration) -> Result<String> {
        let surface = Arc::clone(&self.surface);
        poll_until(
            &format!("URL to match {}", pattern),
            timeout,
            SELECTOR_POLL_INTERVAL,
            || {
                let url = surface.url();
                async move { Ok(pattern.matches(&url)) }
            },
        )
        .await?;
        Ok(self.surface.url())
    }

    /// Waits out the application's loading indicator.
    pub async fn wait_for_loading_complete(&self) -> Result<()> {
        self.wait_for_indicator(LOADING_SELECTOR, LOADING_APPEAR_TIMEOUT, LOADING_HIDE_TIMEOUT)
            .await
    }

    /// Two-phase indicator wait.
    ///
    /// The indicator may never render; missing it during `appear` is not an
    /// error. It must then be hidden within `hide`.
    pub async fn wait_for_indicator(
        &self,
        selector: &str,
        appear: Duration,
        hide: Duration,
    ) -> Result<()> {
        match self
            .wait_for_selector(selector, ElementState::Visible, appear)
            .await
        {
            Ok(()) => tracing::debug!(selector, "Loading indicator appeared"),
            Err(Error::ElementNotFound(_)) => {
                tracing::debug!(selector, "Loading indicator did not appear, continuing")
            }
            Err(other) => return Err(other),
        }
        self.wait_for_selector(selector, ElementState::Hidden, hide)
            .await
    }
}

/// Cooperative poll loop shared by the page-state waits.
///
/// Evaluates immediately, then every `interval`, with a final evaluation at
/// the deadline so the overshoot stays within one evaluation.
pub(crate) async fn poll_until<F, Fut>(
    description: &str,
    timeout: Duration,
    interval: Duration,
    mut predicate: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = Instant::now();
    loop {
        if predicate().await? {
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(Error::Timeout {
                waiting_for: description.to_string(),
                elapsed,
            });
        }

        tokio::time::sleep(interval.min(timeout - elapsed)).await;
    }
}
