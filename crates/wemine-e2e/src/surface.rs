// DOM surface - the screen the page models drive
//
// Page models and drivers talk to the application only through this trait.
// The default implementation used by the test-suite is an in-process mock
// application; the `browser` feature provides one backed by Chromium.

use crate::error::Result;
use crate::network::NetworkController;
use crate::transport::HttpTransport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Snapshot of one input-capable control.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlSnapshot {
    /// Lower-case tag name (`input`, `select`, `textarea`)
    pub tag: String,
    /// `type` attribute of inputs
    pub input_type: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub test_id: Option<String>,
    pub value: String,
    pub checked: bool,
    pub required: bool,
    /// Text of the associated `<label>`, if any
    pub label: Option<String>,
}

impl ControlSnapshot {
    /// Identity used for field-name introspection: `name`, then `data-testid`,
    /// then `id`.
    pub fn field_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.test_id.as_deref())
            .or(self.id.as_deref())
    }

    pub fn is_radio(&self) -> bool {
        self.input_type.as_deref() == Some("radio")
    }

    pub fn is_checkbox(&self) -> bool {
        self.input_type.as_deref() == Some("checkbox")
    }

    /// Buttons and hidden inputs are not fillable
    pub fn is_fillable(&self) -> bool {
        !matches!(
            self.input_type.as_deref(),
            Some("submit" | "button" | "reset" | "hidden" | "image")
        )
    }
}

/// A cookie in a saved storage state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

/// A storage key/value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageItem {
    pub name: String,
    pub value: String,
}

/// Storage of one origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    pub origin: String,
    pub local_storage: Vec<StorageItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_storage: Vec<StorageItem>,
}

/// Persisted authentication state of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageState {
    pub cookies: Vec<Cookie>,
    pub origins: Vec<OriginState>,
}

impl StorageState {
    /// Looks `key` up in local storage, then session storage, of any origin.
    pub fn item(&self, key: &str) -> Option<&str> {
        self.origins.iter().find_map(|origin| {
            origin
                .local_storage
                .iter()
                .chain(origin.session_storage.iter())
                .find(|item| item.name == key)
                .map(|item| item.value.as_str())
        })
    }
}

/// The application screen of one session.
///
/// Selectors are CSS, optionally comma-separated unions and `:has-text()`.
/// Actions operate on the first matching element.
#[async_trait]
pub trait Surface: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    /// Current location
    fn url(&self) -> String;

    /// Number of elements matching `selector`
    async fn count(&self, selector: &str) -> Result<usize>;

    /// Whether the first match exists and is visible
    async fn is_visible(&self, selector: &str) -> Result<bool>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Selects the option with `value` in a `<select>`
    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn set_input_files(&self, selector: &str, path: &Path) -> Result<()>;

    async fn input_value(&self, selector: &str) -> Result<String>;

    async fn text_content(&self, selector: &str) -> Result<Option<String>>;

    async fn get_attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Input-capable controls under `scope` (whole page when `None`)
    async fn controls(&self, scope: Option<&str>) -> Result<Vec<ControlSnapshot>>;

    /// Cookies plus local/session storage of the current origin
    async fn storage_state(&self) -> Result<StorageState>;

    /// Drops cookies and local/session storage
    async fn clear_storage(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// What a [`Launcher`] gets to build a surface with.
#[derive(Debug, Clone)]
pub struct SurfaceContext {
    /// Conditions the surface's traffic must obey
    pub network: NetworkController,
    /// Transport already bound to `network`
    pub http: HttpTransport,
    pub base_url: String,
}

/// Opens one surface per session.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn open(&self, context: SurfaceContext) -> Result<Arc<dyn Surface>>;
}
