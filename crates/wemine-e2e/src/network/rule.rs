// Network rules installed on a session

use super::pattern::UrlPattern;
use crate::error::{Error, Result};
use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;

/// Transport error code used for rule aborts unless another is given
pub const DEFAULT_ABORT_CODE: &str = "failed";

/// Transport error code reported while the session is offline
pub const OFFLINE_ABORT_CODE: &str = "internetdisconnected";

/// Canned response returned by a fulfill rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain".to_string(),
            body: Bytes::new(),
        }
    }

    /// Serializes `payload` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(status: u16, payload: &T) -> Result<Self> {
        let body = serde_json::to_vec(payload)?;
        Ok(Self {
            status,
            content_type: "application/json".to_string(),
            body: Bytes::from(body),
        })
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// What a rule does to a matching request.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleAction {
    /// Hold the request for a fixed time, then keep evaluating
    Delay(Duration),
    /// Fail the request at transport level with the given probability
    Abort { probability: f64, error_code: String },
    /// Answer with a canned response; the backend never sees the request
    Fulfill(MockResponse),
}

impl RuleAction {
    /// Abort and fulfill end evaluation; delay does not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RuleAction::Delay(_))
    }
}

/// A URL pattern paired with an action.
#[derive(Debug, Clone)]
pub struct NetworkRule {
    pub pattern: UrlPattern,
    pub action: RuleAction,
}

impl NetworkRule {
    pub fn delay(pattern: impl Into<UrlPattern>, delay: Duration) -> Self {
        Self {
            pattern: pattern.into(),
            action: RuleAction::Delay(delay),
        }
    }

    /// Abort rule; `probability` must lie in `0.0..=1.0`.
    pub fn abort(pattern: impl Into<UrlPattern>, probability: f64) -> Result<Self> {
        Self::abort_with_code(pattern, probability, DEFAULT_ABORT_CODE)
    }

    pub fn abort_with_code(
        pattern: impl Into<UrlPattern>,
        probability: f64,
        error_code: impl Into<String>,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(Error::InvalidArgument(format!(
                "abort probability must be within 0.0..=1.0, got {}",
                probability
            )));
        }
        Ok(Self {
            pattern: pattern.into(),
            action: RuleAction::Abort {
                probability,
                error_code: error_code.into(),
            },
        })
    }

    pub fn fulfill(pattern: impl Into<UrlPattern>, response: MockResponse) -> Self {
        Self {
            pattern: pattern.into(),
            action: RuleAction::Fulfill(response),
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        self.pattern.matches(url)
    }
}
