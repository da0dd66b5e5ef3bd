// Shared integration-test support
//
// A test environment is one mock backend (axum, random port) plus a launcher
// for the in-process mock application, wired into a FixtureProvider.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

pub mod app;
pub mod backend;

use app::{APP_ORIGIN, AppOptions, MockLauncher};
use backend::{BackendStats, MockBackend};
use std::sync::Arc;
use std::time::Duration;
use wemine_e2e::{FixtureProvider, SuiteConfig, Timeouts};

/// Routes harness logs to the test output; `RUST_LOG` controls the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wemine_e2e=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Budgets sized for a local mock backend.
pub fn test_timeouts() -> Timeouts {
    Timeouts {
        short: Duration::from_secs(2),
        medium: Duration::from_secs(5),
        long: Duration::from_secs(10),
        extra_long: Duration::from_secs(15),
    }
}

pub fn test_config(api_base_url: &str) -> SuiteConfig {
    SuiteConfig::default()
        .with_origins(APP_ORIGIN, api_base_url)
        .with_timeouts(test_timeouts())
}

pub struct TestEnv {
    pub backend: MockBackend,
    pub launcher: Arc<MockLauncher>,
    pub provider: FixtureProvider,
}

impl TestEnv {
    pub async fn start() -> Self {
        Self::start_with(AppOptions::default()).await
    }

    pub async fn start_with(options: AppOptions) -> Self {
        init_tracing();
        let backend = MockBackend::start().await;
        let launcher = Arc::new(MockLauncher::new(backend.url()).with_options(options));
        let provider = FixtureProvider::new(test_config(&backend.url()), launcher.clone());
        Self {
            backend,
            launcher,
            provider,
        }
    }

    pub fn stats(&self) -> BackendStats {
        self.backend.stats()
    }
}
