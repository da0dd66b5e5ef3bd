//! wemine-e2e: end-to-end and API test harness for the WeMine mining-operations app
//!
//! The harness coordinates UI actions with the asynchronous backend calls
//! they trigger. Tests get a [`Fixture`] from a [`FixtureProvider`]: one
//! [`Session`] with its [`NetworkController`], a [`WaitCoordinator`], a
//! [`FormDriver`], an [`AuthDriver`], the page models and an [`ApiClient`],
//! all torn down after the test.
//!
//! # Examples
//!
//! ## Staged login
//!
//! ```ignore
//! use wemine_e2e::{FixtureProvider, LoginStage};
//!
//! # async fn demo(provider: FixtureProvider) -> wemine_e2e::Result<()> {
//! provider
//!     .run(|mut fx| async move {
//!         let recording = fx.network.record();
//!         let credentials = fx.config.credentials.clone();
//!
//!         fx.login_page.navigate().await?;
//!         fx.auth.submit_username(&credentials.username).await?;
//!         fx.auth.await_tenant_lookup().await?;
//!         fx.auth
//!             .complete_sso(&credentials.sso_email, &credentials.sso_password)
//!             .await?;
//!         fx.auth.await_profile_and_master().await?;
//!         fx.auth.await_master_data_sync().await?;
//!
//!         assert_eq!(fx.auth.stage(), LoginStage::Ready);
//!         recording.assert_order(&"/user/who".into(), &"/user/me".into())?;
//!         assert!(fx.auth.is_authenticated().await?);
//!         Ok(())
//!     })
//!     .await
//! # }
//! ```
//!
//! ## Adverse network conditions
//!
//! ```ignore
//! use std::time::Duration;
//!
//! # async fn demo(fx: wemine_e2e::Fixture) -> wemine_e2e::Result<()> {
//! fx.network.simulate_slow_network(Duration::from_millis(500));
//! fx.network.simulate_flaky_network(0.3)?;
//! fx.network.mock("/forms/FORM-MAX", &serde_json::json!({"fields": []}), 200)?;
//!
//! let form = fx
//!     .waits
//!     .wait_for("/forms/FORM-MAX", Duration::from_secs(15))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
#[cfg(feature = "browser")]
pub mod browser;
pub mod config;
pub mod data;
mod error;
pub mod fixture;
pub mod form;
pub mod locator;
pub mod models;
pub mod network;
pub mod pages;
pub mod session;
pub mod surface;
pub mod transport;
pub mod wait;

pub use error::{Error, Result};

pub use api::{ApiClient, LookupOutcome};
pub use auth::{AuthDriver, LoginReport, LoginStage, SyncReport};
pub use config::{Credentials, Role, RoleTokens, SuiteConfig, Timeouts};
pub use fixture::{Fixture, FixtureProvider};
pub use form::{FieldDescriptor, FieldKind, FieldValue, FormData, FormDriver};
pub use locator::Target;
pub use network::{
    CapturedResponse, MockResponse, NetworkController, NetworkEvent, NetworkRule, Recording,
    RuleAction, UrlPattern,
};
pub use pages::{
    EquipmentInspectionPage, HazardDetails, HazardReportPage, LoginPage, OfflineSubmission,
};
pub use session::Session;
pub use surface::{ControlSnapshot, Launcher, StorageState, Surface, SurfaceContext};
pub use transport::{HttpRequest, HttpResponse, HttpTransport};
pub use wait::{ElementState, Matcher, PendingWait, WaitCoordinator, WaitSpec};

#[cfg(feature = "browser")]
pub use browser::PlaywrightLauncher;
