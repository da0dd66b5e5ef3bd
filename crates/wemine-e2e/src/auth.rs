// AuthDriver - staged login flow
//
// Login is driven as a sequence of awaited stages so that callers can verify
// each backend call on its own:
//
//   Idle -> UsernameEntered -> TenantLookupPending -> SsoRedirect
//        -> SsoCredentialsEntered -> ProfileFetchPending -> MasterDataSyncing
//        -> Ready
//
// Any non-2xx lookup/profile response or timeout moves the driver to Failed.
// Response waits for a stage are registered before the action that triggers
// them, so fast responses cannot slip past.

use crate::config::Credentials;
use crate::data::endpoints;
use crate::error::{Error, Result};
use crate::network::{CapturedResponse, UrlPattern};
use crate::pages::login::{LoginPage, PROGRESS_BAR};
use crate::surface::StorageState;
use crate::wait::{Matcher, PendingWait, WaitCoordinator};
use std::fmt;
use std::path::Path;

/// Storage key holding the session token
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Stages of the login sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginStage {
    Idle,
    UsernameEntered,
    TenantLookupPending,
    SsoRedirect,
    SsoCredentialsEntered,
    ProfileFetchPending,
    MasterDataSyncing,
    Ready,
    Failed,
}

impl LoginStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoginStage::Ready | LoginStage::Failed)
    }

    /// The stage that follows on success.
    pub fn next(self) -> Option<LoginStage> {
        use LoginStage::*;
        match self {
            Idle => Some(UsernameEntered),
            UsernameEntered => Some(TenantLookupPending),
            TenantLookupPending => Some(SsoRedirect),
            SsoRedirect => Some(SsoCredentialsEntered),
            SsoCredentialsEntered => Some(ProfileFetchPending),
            ProfileFetchPending => Some(MasterDataSyncing),
            MasterDataSyncing => Some(Ready),
            Ready | Failed => None,
        }
    }

    /// Forward by one stage, or to `Failed` from any non-terminal stage.
    pub fn can_transition_to(self, to: LoginStage) -> bool {
        (to == LoginStage::Failed && !self.is_terminal()) || self.next() == Some(to)
    }
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Responses of the tenant lookup stage
#[derive(Debug, Clone)]
pub struct TenantLookup {
    pub user: CapturedResponse,
    pub tenant: CapturedResponse,
}

/// Responses of the profile stage
#[derive(Debug, Clone)]
pub struct ProfileFetch {
    pub profile: CapturedResponse,
    pub master: CapturedResponse,
}

/// Which auxiliary master-data endpoints were observed during sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub called: Vec<String>,
    pub missing: Vec<String>,
}

/// Everything observed during a complete login
#[derive(Debug, Clone)]
pub struct LoginReport {
    pub lookup: TenantLookup,
    /// Whether the identity-provider pages were shown
    pub sso_shown: bool,
    pub profile: ProfileFetch,
    pub sync: SyncReport,
}

#[derive(Default)]
struct StageWaits {
    user: Option<PendingWait>,
    tenant: Option<PendingWait>,
    profile: Option<PendingWait>,
    master: Option<PendingWait>,
    auxiliary: Vec<(&'static str, PendingWait)>,
}

fn tenant_pattern() -> UrlPattern {
    UrlPattern::regex(r"/tenant/(info|lookup)")
        .unwrap_or_else(|_| UrlPattern::fragment(endpoints::TENANT_INFO))
}

/// Drives the login flow and reports authentication state.
pub struct AuthDriver {
    login: LoginPage,
    waits: WaitCoordinator,
    stage: LoginStage,
    failure: Option<String>,
    pending: StageWaits,
}

impl AuthDriver {
    pub fn new(login: LoginPage, waits: WaitCoordinator) -> Self {
        Self {
            login,
            waits,
            stage: LoginStage::Idle,
            failure: None,
            pending: StageWaits::default(),
        }
    }

    pub fn stage(&self) -> LoginStage {
        self.stage
    }

    /// Message of the error that moved the driver to `Failed`.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn login_page(&self) -> &LoginPage {
        &self.login
    }

    /// Back to `Idle`, dropping any pending stage waits.
    pub fn reset(&mut self) {
        self.stage = LoginStage::Idle;
        self.failure = None;
        self.pending = StageWaits::default();
    }

    fn advance(&mut self, to: LoginStage) -> Result<()> {
        if !self.stage.can_transition_to(to) {
            return Err(Error::InvalidArgument(format!(
                "login cannot move from {} to {}",
                self.stage, to
            )));
        }
        tracing::debug!(from = %self.stage, to = %to, "Login stage");
        self.stage = to;
        Ok(())
    }

    /// Records a failure and hands the error back unchanged.
    fn fail(&mut self, err: Error) -> Error {
        tracing::warn!(stage = %self.stage, error = %err, "Login failed");
        self.failure = Some(format!("{}: {}", self.stage, err));
        self.stage = LoginStage::Failed;
        self.pending = StageWaits::default();
        err
    }

    fn expect(&self, stage: LoginStage) -> Result<()> {
        if self.stage == stage {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "login is at {}, expected {}",
                self.stage, stage
            )))
        }
    }

    /// Idle -> UsernameEntered: types the username and presses continue.
    ///
    /// Every stage wait is registered here, before the click: without an
    /// identity-provider redirect the profile and master data are fetched
    /// straight after the lookup. Waits past the lookup also span the SSO
    /// pages and get the extra-long budget.
    pub async fn submit_username(&mut self, username: &str) -> Result<()> {
        self.expect(LoginStage::Idle)?;
        let timeouts = self.login.timeouts();
        self.pending.user = Some(self.waits.expect_response(endpoints::USER_WHO, timeouts.long));
        self.pending.tenant = Some(self.waits.expect_response(tenant_pattern(), timeouts.long));
        self.pending.profile = Some(
            self.waits
                .expect_response(endpoints::USER_ME, timeouts.extra_long),
        );
        self.pending.master = Some(
            self.waits
                .expect_response(endpoints::TENANT_MASTER, timeouts.extra_long),
        );
        self.pending.auxiliary = endpoints::AUXILIARY
            .iter()
            .map(|&path| {
                let wait = self
                    .waits
                    .expect_response(auxiliary_matcher(path), timeouts.extra_long);
                (path, wait)
            })
            .collect();

        let result = async {
            self.login.enter_username(username).await?;
            self.login.click_continue().await
        }
        .await;
        if let Err(e) = result {
            return Err(self.fail(e));
        }
        self.advance(LoginStage::UsernameEntered)
    }

    /// UsernameEntered -> TenantLookupPending -> SsoRedirect: both the user
    /// lookup and the tenant lookup must succeed.
    ///
    /// The user lookup is checked first so a 404 surfaces as
    /// `UnexpectedStatus` without waiting out the tenant call.
    pub async fn await_tenant_lookup(&mut self) -> Result<TenantLookup> {
        self.expect(LoginStage::UsernameEntered)?;
        self.advance(LoginStage::TenantLookupPending)?;

        let user = self.pending.user.take();
        let tenant = self.pending.tenant.take();
        let result = async {
            let user = await_success(user, endpoints::USER_WHO).await?;
            let tenant = await_success(tenant, endpoints::TENANT_INFO).await?;
            Ok::<_, Error>((user, tenant))
        }
        .await;
        let (user, tenant) = match result {
            Ok(pair) => pair,
            Err(e) => return Err(self.fail(e)),
        };

        self.advance(LoginStage::SsoRedirect)?;
        Ok(TenantLookup { user, tenant })
    }

    /// SsoRedirect -> SsoCredentialsEntered: signs in at the identity
    /// provider if the application redirected there.
    ///
    /// The "stay signed in" prompt is optional. Returns whether the
    /// identity-provider pages were shown.
    pub async fn complete_sso(&mut self, email: &str, password: &str) -> Result<bool> {
        self.expect(LoginStage::SsoRedirect)?;
        let result = async {
            if !self.login.wait_for_sso_redirect().await? {
                tracing::info!("No identity-provider redirect, skipping SSO credentials");
                return Ok(false);
            }
            self.login.enter_sso_email(email).await?;
            self.login.enter_sso_password(password).await?;
            self.login.confirm_stay_signed_in().await?;
            Ok::<bool, Error>(true)
        }
        .await;

        match result {
            Ok(shown) => {
                self.advance(LoginStage::SsoCredentialsEntered)?;
                Ok(shown)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// SsoCredentialsEntered -> ProfileFetchPending -> MasterDataSyncing:
    /// profile and master-data calls must both succeed.
    pub async fn await_profile_and_master(&mut self) -> Result<ProfileFetch> {
        self.expect(LoginStage::SsoCredentialsEntered)?;
        self.advance(LoginStage::ProfileFetchPending)?;

        let profile = self.pending.profile.take();
        let master = self.pending.master.take();
        let result = async {
            let profile = await_success(profile, endpoints::USER_ME).await?;
            let master = await_success(master, endpoints::TENANT_MASTER).await?;
            Ok::<_, Error>((profile, master))
        }
        .await;
        let (profile, master) = match result {
            Ok(pair) => pair,
            Err(e) => return Err(self.fail(e)),
        };

        self.advance(LoginStage::MasterDataSyncing)?;
        Ok(ProfileFetch { profile, master })
    }

    /// MasterDataSyncing -> Ready.
    ///
    /// The progress bar must appear (medium budget) and then go away (extra
    /// long budget). Auxiliary endpoints seen while it showed are reported;
    /// missing ones are logged only.
    pub async fn await_master_data_sync(&mut self) -> Result<SyncReport> {
        self.expect(LoginStage::MasterDataSyncing)?;
        let timeouts = self.login.timeouts();

        let result = async {
            self.login.wait_for_progress_visible(timeouts.medium).await?;
            tracing::debug!(selector = PROGRESS_BAR, "Master-data sync in progress");
            self.login
                .wait_for_progress_hidden(timeouts.extra_long)
                .await
        }
        .await;
        if let Err(e) = result {
            return Err(self.fail(e));
        }

        let mut report = SyncReport::default();
        for (path, wait) in std::mem::take(&mut self.pending.auxiliary) {
            match wait.take_if_resolved() {
                Some(_) => report.called.push(path.to_string()),
                None => {
                    tracing::info!(endpoint = path, "Optional master-data endpoint not called");
                    report.missing.push(path.to_string());
                }
            }
        }

        self.advance(LoginStage::Ready)?;
        tracing::info!(called = report.called.len(), "Login complete");
        Ok(report)
    }

    /// Runs every stage from the login screen to `Ready`.
    pub async fn perform_complete_login(&mut self, credentials: &Credentials) -> Result<LoginReport> {
        if self.stage != LoginStage::Idle {
            self.reset();
        }
        if let Err(e) = self.login.navigate().await {
            return Err(self.fail(e));
        }
        self.submit_username(&credentials.username).await?;
        let lookup = self.await_tenant_lookup().await?;
        let sso_shown = self
            .complete_sso(&credentials.sso_email, &credentials.sso_password)
            .await?;
        let profile = self.await_profile_and_master().await?;
        let sync = self.await_master_data_sync().await?;
        Ok(LoginReport {
            lookup,
            sso_shown,
            profile,
            sync,
        })
    }

    /// Whether persisted storage holds a session token. No network calls.
    pub async fn is_authenticated(&self) -> Result<bool> {
        let state = self.waits.surface().storage_state().await?;
        Ok(state
            .item(AUTH_TOKEN_KEY)
            .is_some_and(|token| !token.trim().is_empty()))
    }

    /// Drops cookies and storage and returns to `Idle`.
    pub async fn clear_auth(&mut self) -> Result<()> {
        self.waits.surface().clear_storage().await?;
        self.reset();
        tracing::debug!("Cleared authentication state");
        Ok(())
    }

    /// Snapshot of cookies and storage for reuse by later sessions.
    pub async fn save_auth_state(&self) -> Result<StorageState> {
        self.waits.surface().storage_state().await
    }

    /// Like [`save_auth_state`](Self::save_auth_state), and also writes the
    /// snapshot to `path` as JSON.
    pub async fn save_auth_state_to(&self, path: impl AsRef<Path>) -> Result<StorageState> {
        let path = path.as_ref();
        let state = self.save_auth_state().await?;
        std::fs::write(path, serde_json::to_vec_pretty(&state)?)?;
        tracing::debug!(path = %path.display(), "Saved authentication state");
        Ok(state)
    }

    pub async fn is_login_successful(&self) -> Result<bool> {
        self.login.is_login_successful().await
    }

    pub async fn check_restart_prompt(&self) -> bool {
        self.login.check_restart_prompt().await
    }
}

/// `/forms` must not also match `/forms/{code}` fetches made later.
fn auxiliary_matcher(path: &'static str) -> Matcher {
    Matcher::predicate(format!("response from {}", path), move |r| {
        let path_only = r.url.split(['?', '#']).next().unwrap_or_default();
        path_only.ends_with(path)
    })
}

/// Awaits a stage wait registered earlier and requires a 2xx status.
async fn await_success(wait: Option<PendingWait>, what: &str) -> Result<CapturedResponse> {
    let wait = wait.ok_or_else(|| {
        Error::InvalidArgument(format!("no wait registered for {}", what))
    })?;
    let response = wait.wait().await?;
    response.expect_success()?;
    Ok(response)
}
