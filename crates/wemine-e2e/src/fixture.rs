// FixtureProvider - per-test wiring and guaranteed teardown
//
// Each test gets one Session and one instance of every driver and page model
// bound to it. The session is closed after the test body whether it returns
// Ok, returns Err or panics.

use crate::api::ApiClient;
use crate::auth::{AuthDriver, LoginReport};
use crate::config::SuiteConfig;
use crate::error::Result;
use crate::form::FormDriver;
use crate::network::NetworkController;
use crate::pages::{EquipmentInspectionPage, HazardReportPage, LoginPage};
use crate::session::Session;
use crate::surface::Launcher;
use crate::wait::WaitCoordinator;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Everything a test body works with.
pub struct Fixture {
    pub config: SuiteConfig,
    pub session: Session,
    pub network: NetworkController,
    pub waits: WaitCoordinator,
    pub form: FormDriver,
    pub login_page: LoginPage,
    pub auth: AuthDriver,
    pub equipment: EquipmentInspectionPage,
    pub hazard: HazardReportPage,
    pub api: ApiClient,
    /// Set by [`FixtureProvider::run_authenticated`]
    pub login: Option<LoginReport>,
}

impl Fixture {
    fn wire(config: &SuiteConfig, session: Session) -> Result<Self> {
        let network = session.network().clone();
        let waits = session.waits();
        let form = FormDriver::new(waits.clone());
        let login_page = LoginPage::new(waits.clone(), config.base_url.clone(), config.timeouts);
        let auth = AuthDriver::new(login_page.clone(), waits.clone());
        let equipment = EquipmentInspectionPage::new(
            waits.clone(),
            form.clone(),
            network.clone(),
            config.timeouts,
        );
        let hazard = HazardReportPage::new(waits.clone(), form.clone(), config.timeouts);
        let api = ApiClient::from_config(session.http().clone(), config)?;

        Ok(Self {
            config: config.clone(),
            session,
            network,
            waits,
            form,
            login_page,
            auth,
            equipment,
            hazard,
            api,
            login: None,
        })
    }
}

/// Builds fixtures from one configuration and one surface launcher.
#[derive(Clone)]
pub struct FixtureProvider {
    config: SuiteConfig,
    launcher: Arc<dyn Launcher>,
}

impl FixtureProvider {
    pub fn new(config: SuiteConfig, launcher: Arc<dyn Launcher>) -> Self {
        Self { config, launcher }
    }

    /// Provider using the process-wide environment configuration.
    pub fn from_env(launcher: Arc<dyn Launcher>) -> Self {
        Self::new(SuiteConfig::global().clone(), launcher)
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Opens a session and wires a fixture. The caller owns teardown.
    pub async fn setup(&self) -> Result<Fixture> {
        let session = Session::open(&self.config, self.launcher.as_ref()).await?;
        match Fixture::wire(&self.config, session.clone()) {
            Ok(fixture) => Ok(fixture),
            Err(e) => {
                if let Err(teardown_err) = session.close().await {
                    tracing::warn!(error = %teardown_err, "Teardown after failed setup failed");
                }
                Err(e)
            }
        }
    }

    /// Runs `body` with a fresh fixture and closes the session afterwards.
    ///
    /// A body error is returned as is (a teardown error after it is only
    /// logged); a panic is resumed after teardown.
    pub async fn run<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnOnce(Fixture) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let fixture = self.setup().await?;
        let session = fixture.session.clone();
        run_and_teardown(session, body(fixture)).await
    }

    /// Like [`run`](Self::run), but logs in with the configured credentials
    /// before the body starts.
    pub async fn run_authenticated<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnOnce(Fixture) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut fixture = self.setup().await?;
        let session = fixture.session.clone();
        let credentials = self.config.credentials.clone();

        run_and_teardown(session, async move {
            let report = fixture
                .auth
                .perform_complete_login(&credentials)
                .await
                .map_err(|e| e.context("pre-authenticating fixture"))?;
            tracing::info!(username = %credentials.username, "Fixture pre-authenticated");
            fixture.login = Some(report);
            body(fixture).await
        })
        .await
    }
}

async fn run_and_teardown<T, Fut>(session: Session, body: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let outcome = AssertUnwindSafe(body).catch_unwind().await;
    let teardown = session.close().await;

    match outcome {
        Err(panic) => {
            if let Err(e) = teardown {
                tracing::warn!(error = %e, "Teardown after panic failed");
            }
            std::panic::resume_unwind(panic)
        }
        Ok(Err(e)) => {
            if let Err(teardown_err) = teardown {
                tracing::warn!(error = %teardown_err, "Teardown after failure failed");
            }
            Err(e)
        }
        Ok(Ok(value)) => {
            teardown?;
            Ok(value)
        }
    }
}
