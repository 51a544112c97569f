//! Icon loading for build tooling.
//!
//! Tries the library first (store, persistent cache, API) and falls back to
//! icon sets installed under `node_modules`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use iconkit_types::{IconData, IconName, IconSetDocument, validate_icon_set};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::library::IconLibrary;

static WARNED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

/// Options for [`NodeLoader::load_node_icon`].
#[derive(Debug, Clone, Default)]
pub struct NodeLoaderOptions {
    /// Directories to search for `node_modules`, in order.
    pub cwd: Vec<PathBuf>,
    /// Tag included in the warning logged when the icon cannot be found.
    pub warn: Option<String>,
}

impl NodeLoaderOptions {
    /// Searches from the current working directory.
    pub fn current_dir() -> Self {
        Self {
            cwd: std::env::current_dir().into_iter().collect(),
            warn: None,
        }
    }
}

/// Loads icons for build tooling.
pub struct NodeLoader<'a> {
    library: &'a IconLibrary,
    /// Parsed icon set files by path; `None` marks unreadable files.
    collections: Mutex<HashMap<PathBuf, Option<Arc<IconSetDocument>>>>,
}

impl<'a> NodeLoader<'a> {
    pub fn new(library: &'a IconLibrary) -> Self {
        Self {
            library,
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves `icon` of `collection`.
    ///
    /// Tries several spellings of the icon name. Logs a warning once per
    /// distinct `options.warn` tag when nothing is found.
    pub async fn load_node_icon(
        &self,
        collection: &str,
        icon: &str,
        options: &NodeLoaderOptions,
    ) -> Option<Arc<IconData>> {
        let candidates = possible_icon_names(icon);

        if let Some(data) = self.load_from_library(collection, &candidates).await {
            return Some(data);
        }

        for cwd in &options.cwd {
            let Some(document) = self.load_collection(cwd, collection).await else {
                continue;
            };
            if let Some(data) = candidates
                .iter()
                .find_map(|candidate| document.resolve_icon(candidate))
            {
                return Some(Arc::new(data));
            }
        }

        if let Some(tag) = &options.warn {
            warn_once(&format!("failed to load `{tag}` icon"));
        }
        None
    }

    async fn load_from_library(
        &self,
        collection: &str,
        candidates: &[String],
    ) -> Option<Arc<IconData>> {
        let names: Vec<IconName> = candidates
            .iter()
            .map(|candidate| IconName::new("", collection, candidate.clone()))
            .filter(|name| name.is_valid(false))
            .collect();
        if names.is_empty() {
            return None;
        }

        self.library.loader().load(&names).await;
        let store = self.library.store();
        names.iter().find_map(|name| store.get_icon(name))
    }

    /// Finds and parses an installed icon set, searching `cwd` and its ancestors.
    async fn load_collection(&self, cwd: &Path, prefix: &str) -> Option<Arc<IconSetDocument>> {
        for path in collection_paths(cwd, prefix) {
            let cached = self.collections.lock().get(&path).cloned();
            match cached {
                Some(Some(document)) => return Some(document),
                Some(None) => continue,
                None => {}
            }

            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    debug!("Cannot read {}: {}", path.display(), e);
                    continue;
                }
            };

            let document = match validate_icon_set(&content) {
                Ok(document) => Some(Arc::new(document)),
                Err(e) => {
                    warn!("Invalid icon set {}: {}", path.display(), e);
                    None
                }
            };
            self.collections.lock().insert(path, document.clone());
            if document.is_some() {
                return document;
            }
        }
        None
    }
}

fn collection_paths(cwd: &Path, prefix: &str) -> Vec<PathBuf> {
    let split = cwd
        .ancestors()
        .map(|dir| {
            dir.join("node_modules")
                .join("@iconify-json")
                .join(prefix)
                .join("icons.json")
        });
    let full = cwd.ancestors().map(|dir| {
        dir.join("node_modules")
            .join("@iconify")
            .join("json")
            .join("json")
            .join(format!("{prefix}.json"))
    });
    split.chain(full).collect()
}

/// Spellings tried for an icon name: as given, camelCase to kebab-case, and
/// a dash inserted before trailing digits.
pub fn possible_icon_names(icon: &str) -> Vec<String> {
    let mut kebab = String::with_capacity(icon.len() + 4);
    let mut digits = String::with_capacity(icon.len() + 4);
    let mut previous: Option<char> = None;

    for c in icon.chars() {
        let after_lower = previous.is_some_and(|p| p.is_ascii_lowercase());
        if after_lower && c.is_ascii_uppercase() {
            kebab.push('-');
        }
        if after_lower && c.is_ascii_digit() {
            digits.push('-');
        }
        kebab.push(c.to_ascii_lowercase());
        digits.push(c);
        previous = Some(c);
    }

    let mut names = vec![icon.to_string()];
    for name in [kebab, digits] {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Logs `message` unless it was logged before. Returns true if logged.
fn warn_once(message: &str) -> bool {
    let warned = WARNED.get_or_init(|| Mutex::new(HashSet::new()));
    if !warned.lock().insert(message.to_string()) {
        return false;
    }
    warn!("{}", message);
    true
}
