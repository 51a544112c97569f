//! Icon data types.

use serde::{Deserialize, Serialize};

/// Default icon width and height.
pub const DEFAULT_ICON_SIZE: f64 = 16.0;

/// Optional icon properties.
///
/// Used for per-icon overrides, alias overrides and icon set defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IconProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_flip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v_flip: Option<bool>,
}

impl IconProps {
    /// Merges `child` on top of `self`.
    ///
    /// Transformations stack: rotations add up modulo 4 and flips toggle.
    /// Every other property set on `child` replaces the parent value.
    pub fn merge(&self, child: &IconProps) -> IconProps {
        let rotate = match (self.rotate, child.rotate) {
            (None, None) => None,
            (a, b) => Some((a.unwrap_or(0) + b.unwrap_or(0)).rem_euclid(4)),
        };
        let flip = |a: Option<bool>, b: Option<bool>| match (a, b) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(false) != b.unwrap_or(false)),
        };

        IconProps {
            left: child.left.or(self.left),
            top: child.top.or(self.top),
            width: child.width.or(self.width),
            height: child.height.or(self.height),
            rotate,
            h_flip: flip(self.h_flip, child.h_flip),
            v_flip: flip(self.v_flip, child.v_flip),
        }
    }
}

/// Icon as stored in an icon set document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconEntry {
    /// SVG content without the `<svg>` wrapper.
    pub body: String,
    #[serde(flatten)]
    pub props: IconProps,
}

/// Alias entry pointing to another icon in the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub parent: String,
    #[serde(flatten)]
    pub props: IconProps,
}

/// Fully resolved icon data, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IconData {
    pub body: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub rotate: i32,
    pub h_flip: bool,
    pub v_flip: bool,
}

impl IconData {
    /// Creates icon data with default dimensions.
    pub fn new(body: impl Into<String>) -> Self {
        Self::from_props(body.into(), &IconProps::default())
    }

    /// Builds icon data from a body and merged properties.
    pub fn from_props(body: String, props: &IconProps) -> Self {
        Self {
            body,
            left: props.left.unwrap_or(0.0),
            top: props.top.unwrap_or(0.0),
            width: props.width.unwrap_or(DEFAULT_ICON_SIZE),
            height: props.height.unwrap_or(DEFAULT_ICON_SIZE),
            rotate: props.rotate.unwrap_or(0).rem_euclid(4),
            h_flip: props.h_flip.unwrap_or(false),
            v_flip: props.v_flip.unwrap_or(false),
        }
    }
}
