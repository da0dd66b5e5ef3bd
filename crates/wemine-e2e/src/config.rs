// Suite configuration
//
// Credentials, endpoints and tokens are resolved once per process from the
// environment. Every value has a literal fallback so the suite runs against a
// mock backend with nothing set.

use std::sync::OnceLock;
use std::time::Duration;

/// Default application URL when `BASE_URL` is unset
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Default API URL when `API_BASE_URL` is unset
pub const DEFAULT_API_BASE_URL: &str = "https://api-staging.wemine.com";

static GLOBAL: OnceLock<SuiteConfig> = OnceLock::new();

/// Login credentials for the two-step (local + SSO) sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username typed on the application's own login screen
    pub username: String,
    /// E-mail submitted to the identity provider
    pub sso_email: String,
    /// Password submitted to the identity provider
    pub sso_password: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        sso_email: impl Into<String>,
        sso_password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            sso_email: sso_email.into(),
            sso_password: sso_password.into(),
        }
    }
}

/// Bearer tokens for the roles exercised by the hazard workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTokens {
    pub reporter: String,
    pub pic: String,
    pub supervisor: String,
}

/// Role selector for [`RoleTokens::for_role`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Reporter,
    Pic,
    Supervisor,
}

impl RoleTokens {
    pub fn for_role(&self, role: Role) -> &str {
        match role {
            Role::Reporter => &self.reporter,
            Role::Pic => &self.pic,
            Role::Supervisor => &self.supervisor,
        }
    }
}

/// Timeout classes shared by page models and drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub short: Duration,
    pub medium: Duration,
    pub long: Duration,
    pub extra_long: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(5),
            medium: Duration::from_secs(15),
            long: Duration::from_secs(30),
            extra_long: Duration::from_secs(60),
        }
    }
}

/// Immutable suite configuration.
///
/// Resolve it once with [`SuiteConfig::global`] (environment) or build one
/// explicitly with [`SuiteConfig::from_lookup`] and pass it by reference into
/// the fixture provider. Nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteConfig {
    pub credentials: Credentials,
    /// Origin of the web application
    pub base_url: String,
    /// Origin of the backend API used by API-only tests
    pub api_base_url: String,
    /// Bearer token for API-only tests
    pub api_token: String,
    pub role_tokens: RoleTokens,
    pub timeouts: Timeouts,
}

impl SuiteConfig {
    /// Returns the process-wide configuration, reading the environment on
    /// first use.
    pub fn global() -> &'static SuiteConfig {
        GLOBAL.get_or_init(SuiteConfig::from_env)
    }

    /// Reads configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let config = Self {
            credentials: Credentials {
                username: get("TEST_USERNAME", "testuser@mining.com"),
                sso_email: get("MS_USERNAME", "testuser@mining.com"),
                sso_password: get("MS_PASSWORD", "TestPassword123!"),
            },
            base_url: trim_trailing_slash(get("BASE_URL", DEFAULT_BASE_URL)),
            api_base_url: trim_trailing_slash(get("API_BASE_URL", DEFAULT_API_BASE_URL)),
            api_token: get("API_AUTH_TOKEN", "mock-token-for-testing"),
            role_tokens: RoleTokens {
                reporter: get("REPORTER_AUTH_TOKEN", "mock-reporter-token"),
                pic: get("PIC_AUTH_TOKEN", "mock-pic-token"),
                supervisor: get("SUPERVISOR_AUTH_TOKEN", "mock-supervisor-token"),
            },
            timeouts: Timeouts::default(),
        };

        tracing::debug!(
            base_url = %config.base_url,
            api_base_url = %config.api_base_url,
            username = %config.credentials.username,
            "Resolved suite configuration"
        );

        config
    }

    /// Same configuration pointed at a different application and API origin.
    ///
    /// Used when the backend is a locally started mock on an ephemeral port.
    pub fn with_origins(mut self, base_url: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        self.base_url = trim_trailing_slash(base_url.into());
        self.api_base_url = trim_trailing_slash(api_base_url.into());
        self
    }

    /// Same configuration with different timeout classes.
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
