// Login screen and identity-provider screens

use crate::config::Timeouts;
use crate::error::{Error, Result};
use crate::locator::Target;
use crate::network::UrlPattern;
use crate::wait::{ElementState, WaitCoordinator};
use std::time::Duration;

/// Time the application gets to redirect to the identity provider
pub const SSO_REDIRECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Fragment identifying identity-provider URLs
pub const SSO_DOMAIN_FRAGMENT: &str = "microsoft";

pub const PROGRESS_BAR: &str = "[data-testid=\"progress-bar\"], .progress-bar";
pub const RESTART_PROMPT: &str = "[data-testid=\"restart-prompt\"], .restart-notification";
pub const PROFILE_ICON: &str = "[data-testid=\"profile-icon\"], .user-profile";
pub const ERROR_MESSAGE: &str = ".error-message, .alert-error, [data-testid=\"error-message\"]";

const SSO_EMAIL: &str = "input[type=\"email\"], input[name=\"loginfmt\"]";
const SSO_PASSWORD: &str = "input[type=\"password\"], input[name=\"passwd\"]";
const SSO_NEXT: &str = "input[type=\"submit\"], button[type=\"submit\"]";
const SSO_SIGN_IN: &str = "input[type=\"submit\"][value*=\"Sign in\"], button:has-text(\"Sign in\")";
const SSO_STAY_SIGNED_IN: &str = "input[type=\"submit\"], button:has-text(\"Yes\")";

fn username_input() -> Target {
    Target::test_id("username-input").or("#username, input[name=\"username\"]")
}

fn continue_button() -> Target {
    Target::test_id("continue-btn").or("button:has-text(\"Continue\")")
}

/// The application's login screen and the identity-provider pages it
/// redirects to.
#[derive(Clone)]
pub struct LoginPage {
    waits: WaitCoordinator,
    base_url: String,
    timeouts: Timeouts,
}

impl LoginPage {
    pub fn new(waits: WaitCoordinator, base_url: impl Into<String>, timeouts: Timeouts) -> Self {
        Self {
            waits,
            base_url: base_url.into(),
            timeouts,
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Opens `/login` and waits for the username field.
    pub async fn navigate(&self) -> Result<()> {
        let url = format!("{}/login", self.base_url);
        tracing::debug!(%url, "Opening login screen");
        self.waits.surface().goto(&url).await?;
        self.waits.resolve(&username_input(), self.timeouts.long).await?;
        Ok(())
    }

    pub async fn enter_username(&self, username: &str) -> Result<()> {
        let selector = self.waits.resolve(&username_input(), self.timeouts.long).await?;
        self.waits.surface().fill(&selector, username).await
    }

    pub async fn click_continue(&self) -> Result<()> {
        let selector = self.waits.resolve(&continue_button(), self.timeouts.medium).await?;
        self.waits.surface().click(&selector).await
    }

    pub fn is_on_sso_page(&self) -> bool {
        self.waits.surface().url().contains(SSO_DOMAIN_FRAGMENT)
    }

    /// Waits briefly for the identity-provider redirect.
    ///
    /// Returns `false` if the application never left its own domain, which
    /// happens when a session is still valid.
    pub async fn wait_for_sso_redirect(&self) -> Result<bool> {
        let pattern = UrlPattern::fragment(SSO_DOMAIN_FRAGMENT);
        match self.waits.wait_for_url(&pattern, SSO_REDIRECT_TIMEOUT).await {
            Ok(url) => {
                tracing::debug!(%url, "Redirected to identity provider");
                Ok(true)
            }
            Err(e) if e.is_timeout() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Submits the e-mail step of the identity provider.
    pub async fn enter_sso_email(&self, email: &str) -> Result<()> {
        self.fill_and_submit(SSO_EMAIL, email, SSO_NEXT).await
    }

    /// Submits the password step of the identity provider.
    pub async fn enter_sso_password(&self, password: &str) -> Result<()> {
        self.fill_and_submit(SSO_PASSWORD, password, SSO_SIGN_IN).await
    }

    async fn fill_and_submit(&self, field: &str, value: &str, button: &str) -> Result<()> {
        self.waits
            .wait_for_selector(field, ElementState::Visible, self.timeouts.medium)
            .await?;
        let surface = self.waits.surface();
        surface.fill(field, value).await?;
        surface.click(button).await
    }

    /// Accepts the "stay signed in?" prompt if it shows up.
    ///
    /// The prompt is optional; returns whether it was shown.
    pub async fn confirm_stay_signed_in(&self) -> Result<bool> {
        match self
            .waits
            .wait_for_selector(SSO_STAY_SIGNED_IN, ElementState::Visible, self.timeouts.short)
            .await
        {
            Ok(()) => {
                self.waits.surface().click(SSO_STAY_SIGNED_IN).await?;
                Ok(true)
            }
            Err(Error::ElementNotFound(_)) => {
                tracing::debug!("Stay-signed-in prompt did not appear");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn wait_for_progress_visible(&self, timeout: Duration) -> Result<()> {
        self.waits
            .wait_for_selector(PROGRESS_BAR, ElementState::Visible, timeout)
            .await
    }

    pub async fn wait_for_progress_hidden(&self, timeout: Duration) -> Result<()> {
        self.waits
            .wait_for_selector(PROGRESS_BAR, ElementState::Hidden, timeout)
            .await
    }

    /// True once the profile icon renders (medium budget).
    pub async fn is_login_successful(&self) -> Result<bool> {
        match self
            .waits
            .wait_for_selector(PROFILE_ICON, ElementState::Visible, self.timeouts.medium)
            .await
        {
            Ok(()) => Ok(true),
            Err(Error::ElementNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether the first-sync restart notice is showing. Absence is `false`.
    pub async fn check_restart_prompt(&self) -> bool {
        self.waits
            .surface()
            .is_visible(RESTART_PROMPT)
            .await
            .unwrap_or(false)
    }

    /// Text of the visible error element, if any.
    pub async fn error_message(&self) -> Result<Option<String>> {
        let surface = self.waits.surface();
        if !surface.is_visible(ERROR_MESSAGE).await? {
            return Ok(None);
        }
        Ok(surface
            .text_content(ERROR_MESSAGE)
            .await?
            .map(|t| t.trim().to_string()))
    }

    /// Waits for an error element to show up.
    pub async fn wait_for_error(&self, timeout: Duration) -> Result<String> {
        self.waits
            .wait_for_selector(ERROR_MESSAGE, ElementState::Visible, timeout)
            .await?;
        Ok(self.error_message().await?.unwrap_or_default())
    }
}
