//! Shared icon types for iconkit.
//!
//! - [`IconName`]: `(provider, prefix, name)` triple and its string forms
//! - [`IconData`]: resolved icon ready for rendering
//! - [`IconSetDocument`]: icon set JSON wire format with alias resolution

pub mod document;
pub mod icon;
pub mod name;

pub use document::{
    DocumentError, IconSetDocument, MAX_ALIAS_DEPTH, ResolvedIconSet, validate_icon_set,
};
pub use icon::{AliasEntry, DEFAULT_ICON_SIZE, IconData, IconEntry, IconProps};
pub use name::{IconName, NameError, is_valid_segment};
