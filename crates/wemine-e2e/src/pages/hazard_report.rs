// Safety hazard report screen

use crate::config::Timeouts;
use crate::data::{TestLocation, endpoints};
use crate::error::{Error, Result};
use crate::form::{FieldValue, FormData, FormDriver};
use crate::locator::Target;
use crate::models::{HazardReceipt, is_hazard_number};
use crate::wait::{ElementState, Matcher, WaitCoordinator};
use std::path::PathBuf;

const REPORT_FORM: &str = "[data-testid=\"hazard-form\"], form.hazard-report";

fn menu() -> Target {
    Target::test_id("hazard-report-menu").or("a:has-text(\"Hazard Report\")")
}

fn new_report_button() -> Target {
    Target::test_id("new-hazard-btn").or("button:has-text(\"Report Hazard\")")
}

fn submit_button() -> Target {
    Target::test_id("submit-hazard-btn").or("button[type=\"submit\"]")
}

fn success_message() -> Target {
    Target::test_id("success-message").or(".alert-success, .success-notification")
}

fn hazard_number() -> Target {
    Target::test_id("hazard-number").or(".hazard-number")
}

/// The mandatory fields of a hazard report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HazardDetails {
    pub location: String,
    pub sublocation: String,
    pub area: String,
    pub area_description: String,
    pub evidence: PathBuf,
    /// Username of the person in charge
    pub pic: String,
}

impl HazardDetails {
    pub fn at(
        location: &TestLocation,
        area_description: impl Into<String>,
        evidence: impl Into<PathBuf>,
        pic: impl Into<String>,
    ) -> Self {
        Self {
            location: location.location.to_string(),
            sublocation: location.sublocation.to_string(),
            area: location.area.to_string(),
            area_description: area_description.into(),
            evidence: evidence.into(),
            pic: pic.into(),
        }
    }

    /// Form entries keyed by the rendered field names.
    pub fn form_data(&self) -> FormData {
        FormData::from([
            ("location".to_string(), FieldValue::select(&self.location)),
            ("sublocation".to_string(), FieldValue::select(&self.sublocation)),
            ("area".to_string(), FieldValue::select(&self.area)),
            (
                "areaDescription".to_string(),
                FieldValue::text(&self.area_description),
            ),
            ("evidence".to_string(), FieldValue::image(&self.evidence)),
            ("pic".to_string(), FieldValue::select(&self.pic)),
        ])
    }
}

/// Hazard report screen.
#[derive(Clone)]
pub struct HazardReportPage {
    waits: WaitCoordinator,
    form: FormDriver,
    timeouts: Timeouts,
}

impl HazardReportPage {
    pub fn new(waits: WaitCoordinator, form: FormDriver, timeouts: Timeouts) -> Self {
        Self {
            waits,
            form: form.scoped(REPORT_FORM),
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

    pub async fn navigate(&self) -> Result<()> {
        self.click(menu()).await?;
        self.waits.wait_for_loading_complete().await
    }

    /// Opens an empty report form.
    pub async fn new_report(&self) -> Result<()> {
        self.click(new_report_button()).await?;
        self.waits
            .wait_for_selector(REPORT_FORM, ElementState::Visible, self.timeouts.medium)
            .await
    }

    pub async fn fill_mandatory_fields(&self, details: &HazardDetails) -> Result<()> {
        self.form.fill_form(&details.form_data()).await
    }

    /// Mandatory fields that are still empty.
    pub async fn unfilled_mandatory_fields(&self) -> Result<Vec<String>> {
        self.form.read_required_unfilled().await
    }

    pub async fn submit(&self) -> Result<()> {
        self.click(submit_button()).await
    }

    pub async fn wait_for_success(&self) -> Result<()> {
        self.waits
            .resolve(&success_message(), self.timeouts.medium)
            .await
            .map(|_| ())
    }

    /// Hazard number shown after a successful report.
    pub async fn hazard_number(&self) -> Result<String> {
        let selector = self
            .waits
            .resolve(&hazard_number(), self.timeouts.medium)
            .await?;
        let number = self
            .waits
            .surface()
            .text_content(&selector)
            .await?
            .unwrap_or_default()
            .trim()
            .to_string();
        if !is_hazard_number(&number) {
            return Err(Error::AssertionFailed(format!(
                "'{}' is not a hazard number",
                number
            )));
        }
        Ok(number)
    }

    /// Submits, requires a 201 and returns the validated receipt.
    pub async fn submit_and_capture(&self) -> Result<HazardReceipt> {
        let pending = self.waits.expect_response(
            Matcher::method("POST", endpoints::SAFETY_HAZARD),
            self.timeouts.long,
        );
        self.submit().await?;
        let response = pending.wait().await?;
        response.expect_status(&[201])?;
        let receipt: HazardReceipt = response.json()?;
        receipt.validate()?;
        Ok(receipt)
    }

    /// Opens a new report, fills it and submits it.
    pub async fn report(&self, details: &HazardDetails) -> Result<HazardReceipt> {
        self.new_report().await?;
        self.fill_mandatory_fields(details).await?;
        let receipt = self.submit_and_capture().await?;
        self.wait_for_success().await?;
        tracing::info!(hazard = %receipt.hazard_number, "Hazard reported");
        Ok(receipt)
    }
}
