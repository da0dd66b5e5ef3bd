// FormDriver - fills and inspects dynamically rendered forms
//
// Field sets are unknown until the form definition arrives, so every field
// is addressed by name and kind alone. Each kind resolves its control through
// a test identifier first and a semantic selector second.

use crate::error::{Error, Result};
use crate::locator::{Target, attribute_selector, escape_css_string};
use crate::surface::ControlSnapshot;
use crate::wait::WaitCoordinator;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

/// Wait budget for a single field control to render
pub const DEFAULT_FIELD_TIMEOUT: Duration = Duration::from_secs(5);

/// Kinds of dynamic form fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Date,
    Select,
    Radio,
    Image,
}

impl FieldKind {
    /// Parses the `type` of a backend field definition.
    ///
    /// Unknown types are rendered as text inputs by the application.
    pub fn from_definition_type(kind: &str) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "date" | "datetime" => FieldKind::Date,
            "select" | "dropdown" => FieldKind::Select,
            "radio" => FieldKind::Radio,
            "image" | "file" | "photo" => FieldKind::Image,
            _ => FieldKind::Text,
        }
    }

    /// Control for field `name`, identifier first.
    ///
    /// Radio options are addressed per option, see [`radio_target`].
    pub fn target(self, name: &str) -> Target {
        let by_name = attribute_selector("name", name);
        let by_id = format!("#{}", css_ident(name));
        match self {
            FieldKind::Text => Target::test_id(&format!("{}-input", name)).or(format!(
                "input{by_name}, textarea{by_name}, {by_id}"
            )),
            FieldKind::Date => Target::test_id(&format!("{}-date", name)).or(format!(
                "input[type=\"date\"]{by_name}, input[type=\"datetime-local\"]{by_name}, \
                 {by_name}, {by_id}"
            )),
            FieldKind::Select => {
                Target::test_id(&format!("{}-select", name)).or(format!("select{by_name}, {by_id}"))
            }
            FieldKind::Radio => Target::test_id(&format!("{}-radio", name))
                .or(format!("input[type=\"radio\"]{by_name}")),
            FieldKind::Image => Target::test_id(&format!("{}-image", name))
                .or(format!("input[type=\"file\"]{by_name}")),
        }
    }
}

/// The radio button for option `value` of field `name`, identifier first.
pub fn radio_target(name: &str, value: &str) -> Target {
    Target::test_id(&format!("{}-{}", name, value)).or(format!(
        "input[type=\"radio\"]{}[value=\"{}\"]",
        attribute_selector("name", name),
        escape_css_string(value)
    ))
}

/// Escapes `name` for use after `#`. A leading digit, also one after a
/// leading hyphen, takes the code point form.
fn css_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        let leading = i == 0 || (i == 1 && name.starts_with('-'));
        if c.is_ascii_digit() && leading {
            out.push_str(&format!("\\{:x} ", u32::from(c)));
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// The value written into one field, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Text(String),
    /// `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM`
    Date(String),
    /// Option value
    Select(String),
    /// Value of the option to check
    Radio(String),
    /// File to attach
    Image(PathBuf),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn date(value: impl Into<String>) -> Self {
        FieldValue::Date(value.into())
    }

    pub fn select(value: impl Into<String>) -> Self {
        FieldValue::Select(value.into())
    }

    pub fn radio(value: impl Into<String>) -> Self {
        FieldValue::Radio(value.into())
    }

    pub fn image(path: impl Into<PathBuf>) -> Self {
        FieldValue::Image(path.into())
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Date(_) => FieldKind::Date,
            FieldValue::Select(_) => FieldKind::Select,
            FieldValue::Radio(_) => FieldKind::Radio,
            FieldValue::Image(_) => FieldKind::Image,
        }
    }

    /// What the control reports as its value once filled.
    ///
    /// File inputs report the bare file name.
    pub fn expected_control_value(&self) -> String {
        match self {
            FieldValue::Text(v)
            | FieldValue::Date(v)
            | FieldValue::Select(v)
            | FieldValue::Radio(v) => v.clone(),
            FieldValue::Image(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// One named entry to write into a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub value: FieldValue,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn kind(&self) -> FieldKind {
        self.value.kind()
    }
}

/// Field name to value; keys are unique by construction.
pub type FormData = BTreeMap<String, FieldValue>;

/// Collects descriptors into [`FormData`], rejecting duplicate names.
pub fn form_data(fields: impl IntoIterator<Item = FieldDescriptor>) -> Result<FormData> {
    let mut data = FormData::new();
    for field in fields {
        if data.contains_key(&field.name) {
            return Err(Error::InvalidArgument(format!(
                "duplicate form field '{}'",
                field.name
            )));
        }
        data.insert(field.name, field.value);
    }
    Ok(data)
}

/// Fills and reads the controls of one dynamically generated form.
#[derive(Clone)]
pub struct FormDriver {
    waits: WaitCoordinator,
    scope: Option<String>,
    field_timeout: Duration,
}

impl FormDriver {
    pub fn new(waits: WaitCoordinator) -> Self {
        Self {
            waits,
            scope: None,
            field_timeout: DEFAULT_FIELD_TIMEOUT,
        }
    }

    /// Restricts introspection to the subtree matching `selector`.
    pub fn scoped(mut self, selector: impl Into<String>) -> Self {
        self.scope = Some(selector.into());
        self
    }

    pub fn with_field_timeout(mut self, timeout: Duration) -> Self {
        self.field_timeout = timeout;
        self
    }

    /// Writes one field.
    ///
    /// Fails with [`Error::ElementNotFound`] if the control does not render
    /// within the field budget.
    pub async fn fill_field(&self, name: &str, value: &FieldValue) -> Result<()> {
        let surface = self.waits.surface();
        match value {
            FieldValue::Text(text) | FieldValue::Date(text) => {
                let selector = self.resolve(value.kind().target(name)).await?;
                surface.fill(&selector, text).await?;
            }
            FieldValue::Select(option) => {
                let selector = self.resolve(FieldKind::Select.target(name)).await?;
                surface.select_option(&selector, option).await?;
            }
            FieldValue::Radio(option) => {
                let selector = self.resolve(radio_target(name, option)).await?;
                surface.click(&selector).await?;
            }
            FieldValue::Image(path) => {
                let selector = self.resolve(FieldKind::Image.target(name)).await?;
                surface.set_input_files(&selector, path).await?;
            }
        }
        tracing::debug!(field = name, kind = ?value.kind(), "Filled form field");
        Ok(())
    }

    pub async fn fill_descriptor(&self, field: &FieldDescriptor) -> Result<()> {
        self.fill_field(&field.name, &field.value).await
    }

    /// Fills every entry. Entries are independent of each other.
    pub async fn fill_form(&self, data: &FormData) -> Result<()> {
        for (name, value) in data {
            self.fill_field(name, value)
                .await
                .map_err(|e| e.context(format!("filling field '{}'", name)))?;
        }
        Ok(())
    }

    /// Current value of field `name`.
    ///
    /// For radio groups this is the value of the checked option, or an empty
    /// string if none is checked.
    pub async fn read_value(&self, name: &str, kind: FieldKind) -> Result<String> {
        if kind == FieldKind::Radio {
            let checked = self
                .controls()
                .await?
                .into_iter()
                .find(|c| c.is_radio() && c.checked && c.name.as_deref() == Some(name));
            return Ok(checked.map(|c| c.value).unwrap_or_default());
        }
        let selector = self.resolve(kind.target(name)).await?;
        self.waits.surface().input_value(&selector).await
    }

    /// Names of all input-capable controls currently rendered.
    pub async fn read_field_names(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .controls()
            .await?
            .iter()
            .filter(|c| c.is_fillable())
            .filter_map(|c| c.field_name().map(str::to_string))
            .collect())
    }

    /// Number of input-capable controls (every radio button counts).
    pub async fn count_controls(&self) -> Result<usize> {
        Ok(self
            .controls()
            .await?
            .iter()
            .filter(|c| c.is_fillable())
            .count())
    }

    /// Names of mandatory fields that are still empty.
    ///
    /// Whitespace-only counts as empty; a radio group is empty while none of
    /// its options is checked. Names are reported once, in render order.
    pub async fn read_required_unfilled(&self) -> Result<Vec<String>> {
        let controls = self.controls().await?;
        let mut unfilled: Vec<String> = Vec::new();

        for control in controls.iter().filter(|c| c.required && c.is_fillable()) {
            let Some(name) = control.field_name() else {
                continue;
            };
            let empty = if control.is_radio() {
                !controls
                    .iter()
                    .any(|c| c.is_radio() && c.checked && c.name.as_deref() == Some(name))
            } else if control.is_checkbox() {
                !control.checked
            } else {
                control.value.trim().is_empty()
            };
            if empty && !unfilled.iter().any(|n| n == name) {
                unfilled.push(name.to_string());
            }
        }
        Ok(unfilled)
    }

    /// Number of options rendered for radio field `name`.
    ///
    /// The application caps radio groups at four options; callers assert it.
    pub async fn radio_option_count(&self, name: &str) -> Result<usize> {
        let selector = format!(
            "input[type=\"radio\"]{}",
            attribute_selector("name", name)
        );
        self.waits.surface().count(&selector).await
    }

    async fn controls(&self) -> Result<Vec<ControlSnapshot>> {
        self.waits.surface().controls(self.scope.as_deref()).await
    }

    async fn resolve(&self, target: Target) -> Result<String> {
        self.waits.resolve(&target, self.field_timeout).await
    }
}
