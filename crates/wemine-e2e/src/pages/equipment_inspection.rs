// Equipment inspection screen: submissions list and dynamic form

use crate::config::Timeouts;
use crate::data::endpoints;
use crate::error::{Error, Result};
use crate::form::{FieldKind, FieldValue, FormData, FormDriver};
use crate::locator::Target;
use crate::network::{CapturedResponse, NetworkController};
use crate::wait::{ElementState, Matcher, WaitCoordinator};
use std::path::Path;
use std::time::Duration;

/// Budget for the dynamic form container to render
pub const FORM_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Words in the sync-status text that show a submission was queued rather
/// than sent
pub const QUEUED_MARKERS: [&str; 3] = ["queued", "offline", "pending"];

/// Sync state element the application renders for queued submissions
pub const SYNC_STATUS_QUEUED: &str =
    "[data-testid=\"sync-status\"][data-state=\"queued\"], .sync-status.queued";

const SYNC_STATUS: &str = "[data-testid=\"sync-status\"], .sync-status";

const SUBMISSIONS_LIST: &str = "[data-testid=\"submissions-list\"], .submissions-list";
const SUBMISSION_ITEMS: &str = "[data-testid=\"submissions-list\"] .submission-item, \
     .submissions-list .submission-item, \
     [data-testid=\"submissions-list\"] li, \
     [data-testid=\"submissions-list\"] tr";
const FORM_CONTAINER: &str = "[data-testid=\"dynamic-form\"], .dynamic-form-container";
const FORM_CONTROLS: &str = "input, select, textarea";

fn menu() -> Target {
    Target::test_id("equipment-inspection-menu").or("a:has-text(\"Equipment Inspection\")")
}

fn new_submission_button() -> Target {
    Target::test_id("new-submission-btn").or("button:has-text(\"New Submission\")")
}

fn form_code_select() -> Target {
    Target::test_id("form-code-select").or("select[name=\"formCode\"], #formCode")
}

fn submit_button() -> Target {
    Target::test_id("submit-btn").or("button[type=\"submit\"]")
}

fn success_message() -> Target {
    Target::test_id("success-message").or(".alert-success, .success-notification")
}

/// What happened to a submission made while offline.
#[derive(Debug, Clone)]
pub struct OfflineSubmission {
    /// The page showed a queued state while offline
    pub queued: bool,
    /// Responses received while offline; zero means nothing reached the
    /// backend
    pub responses_while_offline: usize,
    /// The submission sent once connectivity returned
    pub synced: CapturedResponse,
}

/// Equipment inspection screen.
#[derive(Clone)]
pub struct EquipmentInspectionPage {
    waits: WaitCoordinator,
    form: FormDriver,
    network: NetworkController,
    timeouts: Timeouts,
}

impl EquipmentInspectionPage {
    pub fn new(
        waits: WaitCoordinator,
        form: FormDriver,
        network: NetworkController,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            waits,
            form: form.scoped(FORM_CONTAINER),
            network,
            timeouts,
        }
    }

    pub fn form(&self) -> &FormDriver {
        &self.form
    }

    async fn click(&self, target: Target) -> Result<()> {
        let selector = self.waits.resolve(&target, self.timeouts.long).await?;
        self.waits.surface().click(&selector).await
    }

    /// Opens the screen from the navigation menu.
    pub async fn navigate(&self) -> Result<()> {
        self.click(menu()).await?;
        self.waits.wait_for_loading_complete().await
    }

    pub async fn is_submissions_list_visible(&self) -> Result<bool> {
        self.waits.surface().is_visible(SUBMISSIONS_LIST).await
    }

    pub async fn is_new_submission_visible(&self) -> Result<bool> {
        self.waits
            .surface()
            .is_visible(&new_submission_button().union())
            .await
    }

    pub async fn click_new_submission(&self) -> Result<()> {
        self.click(new_submission_button()).await?;
        self.waits.wait_for_loading_complete().await
    }

    /// Picks a form code; the application then fetches its definition.
    pub async fn select_form_code(&self, code: &str) -> Result<()> {
        let selector = self
            .waits
            .resolve(&form_code_select(), self.timeouts.long)
            .await?;
        self.waits.surface().select_option(&selector, code).await?;
        self.waits.wait_for_loading_complete().await
    }

    /// Waits for the dynamic form and its first control.
    pub async fn wait_for_form_load(&self) -> Result<()> {
        self.waits
            .wait_for_selector(FORM_CONTAINER, ElementState::Visible, FORM_LOAD_TIMEOUT)
            .await?;
        self.waits
            .wait_for_selector(FORM_CONTROLS, ElementState::Attached, self.timeouts.short)
            .await
    }

    pub async fn fill_text_field(&self, name: &str, value: &str) -> Result<()> {
        self.form.fill_field(name, &FieldValue::text(value)).await
    }

    pub async fn fill_date_field(&self, name: &str, date: &str) -> Result<()> {
        self.form.fill_field(name, &FieldValue::date(date)).await
    }

    pub async fn select_dropdown_option(&self, name: &str, value: &str) -> Result<()> {
        self.form.fill_field(name, &FieldValue::select(value)).await
    }

    pub async fn select_radio_option(&self, name: &str, option: &str) -> Result<()> {
        self.form.fill_field(name, &FieldValue::radio(option)).await
    }

    pub async fn upload_image(&self, name: &str, path: &Path) -> Result<()> {
        self.form.fill_field(name, &FieldValue::image(path)).await
    }

    /// Selects `code`, waits for its form and fills `data`.
    pub async fn fill_complete_form(&self, code: &str, data: &FormData) -> Result<()> {
        self.select_form_code(code).await?;
        self.wait_for_form_load().await?;
        self.form.fill_form(data).await
    }

    /// Counts rendered controls and checks `min <= n <= max`.
    pub async fn verify_field_count(&self, min: usize, max: usize) -> Result<usize> {
        let n = self.form.count_controls().await?;
        if n < min || n > max {
            return Err(Error::AssertionFailed(format!(
                "form renders {} controls, expected {}..={}",
                n, min, max
            )));
        }
        Ok(n)
    }

    pub async fn read_value(&self, name: &str, kind: FieldKind) -> Result<String> {
        self.form.read_value(name, kind).await
    }

    pub async fn radio_option_count(&self, name: &str) -> Result<usize> {
        self.form.radio_option_count(name).await
    }

    /// Whether the form-code selector carries the `required` attribute.
    pub async fn is_form_code_required(&self) -> Result<bool> {
        let selector = self
            .waits
            .resolve(&form_code_select(), self.timeouts.medium)
            .await?;
        Ok(self
            .waits
            .surface()
            .get_attribute(&selector, "required")
            .await?
            .is_some())
    }

    pub async fn submit(&self) -> Result<()> {
        self.click(submit_button()).await
    }

    /// Waits for the success notice (medium budget).
    pub async fn wait_for_success(&self) -> Result<()> {
        self.waits
            .resolve(&success_message(), self.timeouts.medium)
            .await
            .map(|_| ())
    }

    /// Submits and returns the submission response.
    pub async fn submit_and_capture(&self) -> Result<CapturedResponse> {
        let pending = self.waits.expect_response(
            Matcher::method("POST", endpoints::EQUIPMENT_SUBMIT),
            self.timeouts.long,
        );
        self.submit().await?;
        let response = pending.wait().await?;
        response.expect_status(&[201])?;
        Ok(response)
    }

    /// Returns to the list and checks that it mentions `form_code`.
    pub async fn verify_submission_in_list(&self, form_code: &str) -> Result<bool> {
        self.navigate().await?;
        let text = self
            .waits
            .surface()
            .text_content(SUBMISSIONS_LIST)
            .await?
            .unwrap_or_default();
        Ok(text.contains(form_code))
    }

    pub async fn submission_count(&self) -> Result<usize> {
        self.waits.surface().count(SUBMISSION_ITEMS).await
    }

    /// Whether the page shows a queued submission.
    ///
    /// Either the sync-status element is in its queued state, or its text
    /// mentions one of [`QUEUED_MARKERS`] (case-insensitive). Text elsewhere
    /// on the page is not consulted.
    pub async fn is_submission_queued(&self) -> Result<bool> {
        let surface = self.waits.surface();
        if surface.count(SYNC_STATUS_QUEUED).await? > 0 {
            return Ok(true);
        }
        if surface.count(SYNC_STATUS).await? == 0 {
            return Ok(false);
        }
        let text = surface
            .text_content(SYNC_STATUS)
            .await?
            .unwrap_or_default()
            .to_lowercase();
        Ok(QUEUED_MARKERS.iter().any(|marker| text.contains(marker)))
    }

    /// Submits while offline, then restores connectivity and waits for the
    /// queued submission to sync.
    ///
    /// Connectivity is restored on every path out of this method.
    pub async fn submit_offline(&self) -> Result<OfflineSubmission> {
        let recording = self.network.record();
        self.network.set_offline(true);

        let queued = async {
            self.submit().await?;
            let waited = self
                .waits
                .wait_for_condition("submission to be queued", self.timeouts.short, || {
                    self.is_submission_queued()
                })
                .await;
            match waited {
                Ok(()) => Ok(true),
                Err(e) if e.is_timeout() => Ok(false),
                Err(e) => Err(e),
            }
        }
        .await;

        let responses_while_offline = recording.events().iter().filter(|e| e.is_response()).count();
        drop(recording);

        // Registered before going online so the sync cannot be missed
        let synced = self.waits.expect_response(
            Matcher::method("POST", endpoints::EQUIPMENT_SUBMIT),
            self.timeouts.long,
        );
        self.network.set_offline(false);
        let queued = queued?;

        tracing::info!(queued, responses_while_offline, "Offline submission made, waiting for sync");
        let synced = synced.wait().await?;
        Ok(OfflineSubmission {
            queued,
            responses_while_offline,
            synced,
        })
    }
}
