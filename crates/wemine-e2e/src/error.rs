// Error types for wemine-e2e

use std::time::Duration;
use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the application under test
#[derive(Debug, Error)]
pub enum Error {
    /// A wait's condition never became true within its budget
    ///
    /// Carries a description of the matcher or predicate and the time that
    /// actually elapsed before the wait gave up.
    #[error("Timeout after {elapsed:?} waiting for {waiting_for}")]
    Timeout {
        waiting_for: String,
        elapsed: Duration,
    },

    /// A required DOM control never appeared
    ///
    /// Includes the selector (or selector pair) that was polled.
    #[error("Element not found: selector '{0}'")]
    ElementNotFound(String),

    /// An HTTP response carried a status outside the expected set
    #[error("Unexpected status {actual} from {url} (expected one of {expected:?})")]
    UnexpectedStatus {
        url: String,
        expected: Vec<u16>,
        actual: u16,
    },

    /// A request was failed at transport level by a network rule or the
    /// offline toggle. Resilience tests assert for this variant.
    #[error("Request to {url} aborted: {error_code}")]
    TransportAbort { url: String, error_code: String },

    /// A screen-level verification did not hold
    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    /// Invalid argument provided to a harness method
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The session was already torn down
    #[error("Session closed: cannot {0}")]
    SessionClosed(String),

    /// Error reported by the browser backend
    #[error("Browser error: {0}")]
    Browser(String),

    /// HTTP client error (connection refused, TLS, malformed response)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error with additional context
    #[error("{0}: {1}")]
    Context(String, #[source] Box<Error>),
}

impl Error {
    /// Adds context to the error
    pub fn context(self, msg: impl Into<String>) -> Self {
        Error::Context(msg.into(), Box::new(self))
    }

    /// Returns the innermost error, looking through any `Context` layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context(_, inner) => inner.root(),
            other => other,
        }
    }

    /// True for `Timeout`, including when wrapped in context.
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Error::Timeout { .. })
    }

    /// True for `TransportAbort`, including when wrapped in context.
    pub fn is_transport_abort(&self) -> bool {
        matches!(self.root(), Error::TransportAbort { .. })
    }
}

#[cfg(feature = "browser")]
impl From<playwright_rs::Error> for Error {
    fn from(err: playwright_rs::Error) -> Self {
        match err {
            playwright_rs::Error::ElementNotFound(selector) => Error::ElementNotFound(selector),
            other => Error::Browser(other.to_string()),
        }
    }
}
