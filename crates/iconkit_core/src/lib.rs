//! # iconkit_core
//!
//! Icon data resolution and caching.
//!
//! This crate provides:
//! - The in-memory [`IconStore`]
//! - The [`IconLoader`] that batches, deduplicates and aborts load requests
//! - The [`IconLibrary`] facade and the process-wide [`global`] instance
//! - Configuration loading
//! - The [`NodeLoader`] for build tooling
//!
//! ## Example
//!
//! ```rust,ignore
//! use iconkit_core::{IconLibrary, LibraryConfig};
//!
//! let config = LibraryConfig::from_file("iconkit.json")?;
//! let library = IconLibrary::from_config(config);
//! library.init_cache();
//!
//! let result = library.load(&["mdi:home", "mdi:account"]).await;
//! for name in &result.missing {
//!     eprintln!("missing icon: {name}");
//! }
//! let home = library.get_icon_data("mdi:home");
//! ```

mod config;
mod error;
mod library;
mod loader;
mod node_loader;
mod retry;
mod storage;

pub use config::{CacheConfig, CacheTierConfig, LibraryConfig, RetryConfig};
pub use error::{ConfigError, LoadError};
pub use library::{IconLibrary, IconLibraryBuilder, global};
pub use loader::{
    AbortHandle, CustomIconLoader, CustomIconsLoader, IconLoader, LoadCallback, LoadResult,
    PendingLoad,
};
pub use node_loader::{NodeLoader, NodeLoaderOptions, possible_icon_names};
pub use retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, RetryPolicy};
pub use storage::{FailureKind, FailureRecord, IconStatus, IconStore, SetKey};
