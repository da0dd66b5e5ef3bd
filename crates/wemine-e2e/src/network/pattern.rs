// URL patterns used by network rules and waits

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;

/// A pattern tested against full request URLs.
///
/// Endpoint fragments such as `/user/who` match any URL that contains them,
/// which tolerates host, prefix and query variants. Strings containing glob
/// metacharacters are compiled as globs (`*/api/*`), and arbitrary regular
/// expressions are available through [`UrlPattern::regex`].
#[derive(Debug, Clone)]
pub enum UrlPattern {
    /// Matches every URL
    Any,
    /// URL contains the fragment
    Substring(String),
    /// Glob over the whole URL
    Glob(glob::Pattern),
    /// Regex searched anywhere in the URL
    Regex(Regex),
}

impl UrlPattern {
    /// Parses a pattern string.
    ///
    /// `*` and `**/*` match everything; other strings with `*`, `?` or `[` are
    /// globs; the rest are plain fragments.
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::InvalidArgument("empty URL pattern".to_string()));
        }
        if pattern == "*" || pattern == "**" || pattern == "**/*" {
            return Ok(UrlPattern::Any);
        }
        if pattern.contains(['*', '?', '[']) {
            let compiled = glob::Pattern::new(pattern).map_err(|e| {
                Error::InvalidArgument(format!("invalid glob pattern '{}': {}", pattern, e))
            })?;
            return Ok(UrlPattern::Glob(compiled));
        }
        Ok(UrlPattern::Substring(pattern.to_string()))
    }

    /// Compiles a regular expression pattern.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(UrlPattern::Regex)
            .map_err(|e| Error::InvalidArgument(format!("invalid regex '{}': {}", pattern, e)))
    }

    /// Fragment pattern without parsing; never fails.
    pub fn fragment(fragment: impl Into<String>) -> Self {
        UrlPattern::Substring(fragment.into())
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlPattern::Any => true,
            UrlPattern::Substring(fragment) => url.contains(fragment.as_str()),
            UrlPattern::Glob(pattern) => pattern.matches(url),
            UrlPattern::Regex(regex) => regex.is_match(url),
        }
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlPattern::Any => f.write_str("**/*"),
            UrlPattern::Substring(fragment) => f.write_str(fragment),
            UrlPattern::Glob(pattern) => f.write_str(pattern.as_str()),
            UrlPattern::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

impl From<&str> for UrlPattern {
    /// Converts a fragment or glob; an invalid glob degrades to a fragment.
    fn from(pattern: &str) -> Self {
        UrlPattern::parse(pattern).unwrap_or_else(|_| UrlPattern::fragment(pattern))
    }
}

impl From<String> for UrlPattern {
    fn from(pattern: String) -> Self {
        UrlPattern::from(pattern.as_str())
    }
}

impl From<Regex> for UrlPattern {
    fn from(regex: Regex) -> Self {
        UrlPattern::Regex(regex)
    }
}
