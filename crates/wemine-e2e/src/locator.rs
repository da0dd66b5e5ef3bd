// Two-tier element targets
//
// Every control the harness touches is addressed by its stable
// `data-testid` first and a semantic CSS selector second.

use std::fmt;

/// Attribute carrying the stable test identifier
pub const TEST_ID_ATTRIBUTE: &str = "data-testid";

/// An element addressed by test identifier with a semantic fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    primary: Option<String>,
    fallback: Option<String>,
}

impl Target {
    /// Target addressed by `data-testid` only.
    pub fn test_id(id: &str) -> Self {
        Self {
            primary: Some(test_id_selector(id)),
            fallback: None,
        }
    }

    /// Target addressed by a plain selector only.
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            primary: Some(selector.into()),
            fallback: None,
        }
    }

    /// Adds the semantic fallback tried when the identifier finds nothing.
    pub fn or(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    /// Selectors in lookup order.
    pub fn tiers(&self) -> impl Iterator<Item = &str> {
        self.primary.iter().chain(self.fallback.iter()).map(String::as_str)
    }

    /// Both tiers as one comma-separated union.
    pub fn union(&self) -> String {
        self.tiers().collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tiers().collect::<Vec<_>>().join(" | "))
    }
}

/// `[data-testid="<id>"]`
pub fn test_id_selector(id: &str) -> String {
    attribute_selector(TEST_ID_ATTRIBUTE, id)
}

/// `[<attr>="<value>"]` with the value escaped.
pub fn attribute_selector(attr: &str, value: &str) -> String {
    format!("[{}=\"{}\"]", attr, escape_css_string(value))
}

/// Escapes backslashes and double quotes for a double-quoted CSS string.
pub fn escape_css_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
