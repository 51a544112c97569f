//! Icon name parsing and validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for icon name parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("Icon name is empty")]
    Empty,
    #[error("Too many segments in icon name: {0}")]
    TooManySegments(String),
    #[error("Icon name has no prefix: {0}")]
    MissingPrefix(String),
    #[error("Invalid characters in icon name: {0}")]
    InvalidCharacters(String),
}

/// Fully qualified icon name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IconName {
    /// API provider, empty for the public API.
    #[serde(default)]
    pub provider: String,
    /// Icon set prefix. Empty only for simple names.
    pub prefix: String,
    /// Icon name inside the set.
    pub name: String,
}

impl IconName {
    /// Creates a new icon name.
    pub fn new(
        provider: impl Into<String>,
        prefix: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            prefix: prefix.into(),
            name: name.into(),
        }
    }

    /// Parses an icon name without simple-name support.
    ///
    /// Accepts `@provider:prefix:name`, `prefix:name` and `prefix-name`.
    pub fn parse(value: &str) -> Result<Self, NameError> {
        Self::parse_with(value, false, "")
    }

    /// Parses an icon name.
    ///
    /// When `allow_simple_name` is set and no provider is involved, a name
    /// without any separator is accepted with an empty prefix.
    pub fn parse_with(
        value: &str,
        allow_simple_name: bool,
        default_provider: &str,
    ) -> Result<Self, NameError> {
        if value.is_empty() {
            return Err(NameError::Empty);
        }

        let mut segments: Vec<&str> = value.split(':').collect();
        let mut provider = default_provider.to_string();

        if value.starts_with('@') {
            if !(2..=3).contains(&segments.len()) {
                return Err(NameError::TooManySegments(value.to_string()));
            }
            provider = segments.remove(0)[1..].to_string();
        }

        let parsed = match segments.as_slice() {
            [prefix, name] => Self::new(provider, *prefix, *name),
            [provider, prefix, name] => Self::new(*provider, *prefix, *name),
            [single] => match single.split_once('-') {
                Some((prefix, name)) => Self::new(provider, prefix, name),
                None if allow_simple_name && provider.is_empty() => {
                    Self::new(provider, "", *single)
                }
                None => return Err(NameError::MissingPrefix(value.to_string())),
            },
            _ => return Err(NameError::TooManySegments(value.to_string())),
        };

        if parsed.is_valid(allow_simple_name) {
            Ok(parsed)
        } else {
            Err(NameError::InvalidCharacters(value.to_string()))
        }
    }

    /// Checks every segment against the icon name pattern.
    pub fn is_valid(&self, allow_simple_name: bool) -> bool {
        let provider_ok = self.provider.is_empty() || is_valid_segment(&self.provider);
        let prefix_ok = if self.prefix.is_empty() {
            allow_simple_name && self.provider.is_empty()
        } else {
            is_valid_segment(&self.prefix)
        };
        provider_ok && prefix_ok && is_valid_segment(&self.name)
    }
}

impl fmt::Display for IconName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.provider.is_empty() {
            write!(f, "@{}:", self.provider)?;
        }
        if self.prefix.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.prefix, self.name)
        }
    }
}

/// Checks a single name segment against `^[a-z0-9]+(-[a-z0-9]+)*$`.
pub fn is_valid_segment(value: &str) -> bool {
    !value.is_empty()
        && value.split('-').all(|part| {
            !part.is_empty() && part.bytes().all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9'))
        })
}
