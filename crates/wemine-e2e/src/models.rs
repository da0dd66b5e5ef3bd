// Backend wire models
//
// Shapes of the JSON the backend exchanges with the application. Response
// models carry `validate` methods that check the invariants the suite
// asserts on; they never reshape data.

use crate::data;
use crate::error::{Error, Result};
use crate::form::FieldKind;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

/// Bounds on the number of fields in a form definition
pub const MIN_FORM_FIELDS: usize = 1;
pub const MAX_FORM_FIELDS: usize = 50;

static SUBMISSION_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^INS-\d{4}-\d{3,}$").expect("valid regex"));

static HAZARD_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HZD-\d{4}-\d{3,}$").expect("valid regex"));

static TENANT_DOMAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("valid regex"));

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::AssertionFailed(message()))
    }
}

/// `POST /user/who` request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWhoRequest {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub domain: String,
}

/// `POST /user/who` success body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLookup {
    pub tenant: Tenant,
    pub user_id: String,
}

impl UserLookup {
    pub fn validate(&self) -> Result<()> {
        check(!self.user_id.is_empty(), || "userId is empty".to_string())?;
        check(!self.tenant.id.is_empty(), || "tenant.id is empty".to_string())?;
        check(TENANT_DOMAIN.is_match(&self.tenant.domain), || {
            format!("tenant domain '{}' is not a slug", self.tenant.domain)
        })
    }
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

/// `GET /user/me` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub tenant_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl UserProfile {
    pub fn validate(&self) -> Result<()> {
        check(EMAIL.is_match(&self.email), || {
            format!("'{}' is not an e-mail address", self.email)
        })?;
        check(!self.role.is_empty(), || "role is empty".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
}

/// One field of a form definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
}

impl FormField {
    pub fn field_kind(&self) -> FieldKind {
        FieldKind::from_definition_type(&self.kind)
    }
}

/// `GET /forms/{code}` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDefinition {
    pub id: String,
    pub code: String,
    pub name: String,
    pub fields: Vec<FormField>,
    pub version: u32,
    pub active: bool,
}

impl FormDefinition {
    /// Checks `1 <= fields <= 50`. The backend enforces the bound; the
    /// suite only verifies it.
    pub fn validate_field_count(&self) -> Result<usize> {
        let n = self.fields.len();
        check((MIN_FORM_FIELDS..=MAX_FORM_FIELDS).contains(&n), || {
            format!(
                "form {} has {} fields, expected {}..={}",
                self.code, n, MIN_FORM_FIELDS, MAX_FORM_FIELDS
            )
        })?;
        Ok(n)
    }

    /// Checks the field count and that `order` values are unique.
    pub fn validate(&self) -> Result<()> {
        self.validate_field_count()?;
        let mut orders: Vec<u32> = self.fields.iter().map(|f| f.order).collect();
        orders.sort_unstable();
        orders.dedup();
        check(orders.len() == self.fields.len(), || {
            format!("form {} has duplicate field order values", self.code)
        })
    }

    /// Fields sorted by `order`.
    pub fn ordered_fields(&self) -> Vec<&FormField> {
        let mut fields: Vec<&FormField> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.order);
        fields
    }

    pub fn required_field_names(&self) -> Vec<&str> {
        self.ordered_fields()
            .into_iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect()
    }
}

/// `POST /equipment/inspection/submit` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionSubmission {
    pub form_code: String,
    pub form_id: String,
    pub submitted_by: String,
    pub submitted_at: String,
    pub equipment_id: String,
    pub fields: BTreeMap<String, Value>,
}

impl InspectionSubmission {
    /// Builds a submission with a generated value for every field.
    ///
    /// Text fields get `"Test value for <name>"`, dates the current
    /// date-time, selects and radios their first option (`option1` if the
    /// definition lists none), images the evidence image as a data URL.
    pub fn from_definition(
        definition: &FormDefinition,
        submitted_by: &str,
        equipment_id: &str,
    ) -> Result<Self> {
        let mut fields = BTreeMap::new();
        for field in definition.ordered_fields() {
            let value = match field.field_kind() {
                FieldKind::Text => Value::String(format!("Test value for {}", field.name)),
                FieldKind::Date => Value::String(data::current_date_time()),
                FieldKind::Select | FieldKind::Radio => Value::String(
                    field
                        .options
                        .first()
                        .map(|o| o.value.clone())
                        .unwrap_or_else(|| "option1".to_string()),
                ),
                FieldKind::Image => Value::String(evidence_data_url(&data::test_image_path())?),
            };
            fields.insert(field.name.clone(), value);
        }

        Ok(Self {
            form_code: definition.code.clone(),
            form_id: definition.id.clone(),
            submitted_by: submitted_by.to_string(),
            submitted_at: chrono::Utc::now().to_rfc3339(),
            equipment_id: equipment_id.to_string(),
            fields,
        })
    }

    /// Overrides one field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// `POST /equipment/inspection/submit` 201 body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub id: String,
    pub submission_number: String,
    pub form_code: String,
    pub status: String,
    pub submitted_at: String,
    #[serde(default)]
    pub submitted_by: Option<String>,
}

impl SubmissionReceipt {
    pub const SUBMITTED: &'static str = "SUBMITTED";

    pub fn validate(&self) -> Result<()> {
        check(SUBMISSION_NUMBER.is_match(&self.submission_number), || {
            format!(
                "submission number '{}' does not match INS-YYYY-NNN",
                self.submission_number
            )
        })?;
        check(self.status == Self::SUBMITTED, || {
            format!("submission status is '{}', expected SUBMITTED", self.status)
        })
    }
}

/// `POST /safety/hazard` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardReportRequest {
    pub location: String,
    pub sublocation: String,
    pub area: String,
    pub area_description: String,
    /// Evidence image as a data URL
    pub evidence: String,
    pub pic: String,
    pub reported_by: String,
    pub reported_at: String,
}

impl HazardReportRequest {
    /// Report at `location` with the evidence image attached.
    pub fn new(
        location: &data::TestLocation,
        description: impl Into<String>,
        pic: impl Into<String>,
        reported_by: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            location: location.location.to_string(),
            sublocation: location.sublocation.to_string(),
            area: location.area.to_string(),
            area_description: description.into(),
            evidence: evidence_data_url(&data::test_image_path())?,
            pic: pic.into(),
            reported_by: reported_by.into(),
            reported_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// `POST /safety/hazard` 201 body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardReceipt {
    pub id: String,
    pub hazard_number: String,
    pub status: String,
    pub followup_task_id: String,
    pub location: String,
    pub sublocation: String,
    pub area: String,
    pub pic: String,
}

impl HazardReceipt {
    pub const OPEN: &'static str = "OPEN";

    pub fn validate(&self) -> Result<()> {
        check(HAZARD_NUMBER.is_match(&self.hazard_number), || {
            format!(
                "hazard number '{}' does not match HZD-YYYY-NNN",
                self.hazard_number
            )
        })?;
        check(self.status == Self::OPEN, || {
            format!("hazard status is '{}', expected OPEN", self.status)
        })?;
        check(!self.followup_task_id.is_empty(), || {
            "hazard has no follow-up task".to_string()
        })
    }

    /// Checks that the receipt echoes the reported location and PIC.
    pub fn matches_request(&self, request: &HazardReportRequest) -> Result<()> {
        check(
            self.location == request.location
                && self.sublocation == request.sublocation
                && self.area == request.area
                && self.pic == request.pic,
            || format!("hazard {} does not echo the reported location/PIC", self.hazard_number),
        )
    }
}

pub fn is_submission_number(value: &str) -> bool {
    SUBMISSION_NUMBER.is_match(value)
}

pub fn is_hazard_number(value: &str) -> bool {
    HAZARD_NUMBER.is_match(value)
}

/// Reads an image file into a `data:` URL.
pub fn evidence_data_url(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::from(e).context(format!("reading {}", path.display())))?;
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}
