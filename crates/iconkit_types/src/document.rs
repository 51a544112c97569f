//! Icon set documents.
//!
//! The JSON shape matches externally hosted icon sets: a `prefix`, an
//! `icons` map, optional `aliases`, root-level default properties, an
//! optional `lastModified` timestamp and an optional `not_found` list.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::icon::{AliasEntry, IconData, IconEntry, IconProps};
use crate::name::is_valid_segment;

/// Error type for icon set documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to parse icon set JSON: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Icon set validation failed: {0}")]
    ValidationError(String),
}

/// A bundle of icons sharing a prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IconSetDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub prefix: String,
    #[serde(default)]
    pub icons: BTreeMap<String, IconEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, AliasEntry>,
    #[serde(flatten)]
    pub defaults: IconProps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<u64>,
    #[serde(default, rename = "not_found", skip_serializing_if = "Vec::is_empty")]
    pub not_found: Vec<String>,
}

/// Result of resolving every icon and alias of a document.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResolvedIconSet {
    /// Icons and aliases that resolved to concrete data.
    pub icons: Vec<(String, IconData)>,
    /// Aliases whose parent chain is cyclic or dangling.
    pub broken_aliases: Vec<String>,
}

// Path is relative to this file: ../../../schemas/v1/icon-set.json
const ICON_SET_SCHEMA_JSON: &str = include_str!("../../../schemas/v1/icon-set.json");

static SCHEMA: OnceLock<Validator> = OnceLock::new();

/// Longest alias chain that still resolves.
pub const MAX_ALIAS_DEPTH: usize = 36;

/// Parses and validates an icon set JSON string.
pub fn validate_icon_set(json_str: &str) -> Result<IconSetDocument, DocumentError> {
    let instance: Value = serde_json::from_str(json_str)?;
    IconSetDocument::from_value(instance)
}

impl IconSetDocument {
    /// Creates an empty document for the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            provider: None,
            prefix: prefix.into(),
            icons: BTreeMap::new(),
            aliases: BTreeMap::new(),
            defaults: IconProps::default(),
            last_modified: None,
            not_found: Vec::new(),
        }
    }

    /// Adds an icon body, returning the document for chaining.
    pub fn with_icon(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.icons.insert(
            name.into(),
            IconEntry {
                body: body.into(),
                props: IconProps::default(),
            },
        );
        self
    }

    /// Adds an alias, returning the document for chaining.
    pub fn with_alias(mut self, name: impl Into<String>, parent: impl Into<String>) -> Self {
        self.aliases.insert(
            name.into(),
            AliasEntry {
                parent: parent.into(),
                props: IconProps::default(),
            },
        );
        self
    }

    /// Validates a JSON value and converts it into a document.
    ///
    /// The document structure (prefix, icons map) must be valid. Individual
    /// icons or aliases that are malformed are dropped instead of failing the
    /// whole document.
    pub fn from_value(instance: Value) -> Result<Self, DocumentError> {
        let schema = SCHEMA.get_or_init(|| {
            let schema_json: Value =
                serde_json::from_str(ICON_SET_SCHEMA_JSON).expect("Invalid embedded schema");
            Validator::new(&schema_json).expect("Invalid schema compilation")
        });

        if let Err(e) = schema.validate(&instance) {
            let error_msg = format!("{} at {}", e, e.instance_path());
            return Err(DocumentError::ValidationError(error_msg));
        }

        let Value::Object(mut root) = instance else {
            return Err(DocumentError::ValidationError(
                "Icon set must be an object".to_string(),
            ));
        };

        let raw_icons = root.remove("icons");
        let raw_aliases = root.remove("aliases");

        let mut document: IconSetDocument = serde_json::from_value(Value::Object(root))?;
        document.icons = collect_entries(&document.prefix, raw_icons);
        document.aliases = collect_entries(&document.prefix, raw_aliases);

        Ok(document)
    }

    /// Returns true when the document defines neither icons nor aliases.
    pub fn is_empty(&self) -> bool {
        self.icons.is_empty() && self.aliases.is_empty()
    }

    /// Resolves a single icon or alias by name.
    pub fn resolve_icon(&self, name: &str) -> Option<IconData> {
        let chain = parent_chain(self, name)?;
        Some(self.build_icon(name, &chain))
    }

    /// Resolves every icon and alias in the document.
    pub fn resolve_icons(&self) -> ResolvedIconSet {
        let mut resolved = ResolvedIconSet::default();

        for (name, entry) in &self.icons {
            resolved.icons.push((
                name.clone(),
                IconData::from_props(entry.body.clone(), &self.defaults.merge(&entry.props)),
            ));
        }

        for name in self.aliases.keys() {
            if self.icons.contains_key(name) {
                continue;
            }
            match parent_chain(self, name) {
                Some(chain) => resolved
                    .icons
                    .push((name.clone(), self.build_icon(name, &chain))),
                None => {
                    debug!("Alias {}:{} does not resolve", self.prefix, name);
                    resolved.broken_aliases.push(name.clone());
                }
            }
        }

        resolved
    }

    /// Merges `name` and its parents, ordered from `name` to the concrete icon.
    fn build_icon(&self, name: &str, parents: &[&str]) -> IconData {
        let root = parents.last().copied().unwrap_or(name);
        let Some(icon) = self.icons.get(root) else {
            // parent_chain only returns chains that end at a concrete icon
            return IconData::new(String::new());
        };

        let mut props = self.defaults.merge(&icon.props);
        for alias in std::iter::once(name).chain(parents.iter().copied()).rev() {
            if let Some(entry) = self.aliases.get(alias)
                && !self.icons.contains_key(alias)
            {
                props = props.merge(&entry.props);
            }
        }

        IconData::from_props(icon.body.clone(), &props)
    }
}

/// Finds the parents of `name` up to the concrete icon.
///
/// Returns `None` for cyclic or dangling chains and for chains longer than
/// [`MAX_ALIAS_DEPTH`].
fn parent_chain<'a>(document: &'a IconSetDocument, name: &'a str) -> Option<Vec<&'a str>> {
    let mut chain: Vec<&str> = Vec::new();
    let mut current = name;
    while !document.icons.contains_key(current) {
        let parent = document.aliases.get(current)?.parent.as_str();
        if chain.len() == MAX_ALIAS_DEPTH || parent == name || chain.contains(&parent) {
            return None;
        }
        chain.push(parent);
        current = parent;
    }
    Some(chain)
}

fn collect_entries<T>(prefix: &str, raw: Option<Value>) -> BTreeMap<String, T>
where
    T: for<'de> Deserialize<'de>,
{
    let Some(Value::Object(entries)) = raw else {
        return BTreeMap::new();
    };

    entries
        .into_iter()
        .filter_map(|(name, value)| {
            if !is_valid_segment(&name) {
                debug!("Skipping invalid icon name {}:{}", prefix, name);
                return None;
            }
            match serde_json::from_value(value) {
                Ok(entry) => Some((name, entry)),
                Err(e) => {
                    debug!("Skipping malformed icon {}:{}: {}", prefix, name, e);
                    None
                }
            }
        })
        .collect()
}
