//! Plugin Loading
//!
//! A plugin is a shared library that produces one or more instances through
//! the entry points described in [`hostaware_types::abi`]. Loading is behind
//! the [`PluginLoader`] trait so the manager can be driven by an in-memory
//! loader in tests.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use libloading::{Library, Symbol};
use tracing::debug;

use hostaware_types::{
    ABI_VERSION, ABI_VERSION_SYMBOL, AbiVersionFn, GET_INSTANCES_SYMBOL, GetInstancesFn, Instance,
};

use crate::{ManagerError, ManagerResult};

/// Instances produced by a library, plus the handle keeping its code mapped
pub struct LoadedPlugin {
    pub library: Option<Arc<Library>>,
    pub instances: Vec<Box<dyn Instance>>,
}

/// Turns a plugin path into instances
pub trait PluginLoader: Send + 'static {
    fn load(&self, path: &Path) -> ManagerResult<LoadedPlugin>;
}

/// Loads plugins from shared libraries with `libloading`
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl PluginLoader for DylibLoader {
    fn load(&self, path: &Path) -> ManagerResult<LoadedPlugin> {
        // SAFETY: loading a library runs its initializers. Plugin directories
        // are operator controlled, the same trust boundary as the daemon binary.
        let library = unsafe { Library::new(path) }.map_err(|e| ManagerError::Library {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let instances = {
            // SAFETY: the symbol types match what `export_instances!` emits.
            let version: Symbol<AbiVersionFn> = unsafe { library.get(ABI_VERSION_SYMBOL) }
                .map_err(|_| missing_symbol(path, ABI_VERSION_SYMBOL))?;
            let found = version();
            if found != ABI_VERSION {
                return Err(ManagerError::AbiMismatch {
                    path: path.to_path_buf(),
                    expected: ABI_VERSION,
                    found,
                });
            }

            let get_instances: Symbol<GetInstancesFn> =
                unsafe { library.get(GET_INSTANCES_SYMBOL) }
                    .map_err(|_| missing_symbol(path, GET_INSTANCES_SYMBOL))?;

            let mut instances = Vec::new();
            catch_unwind(AssertUnwindSafe(|| get_instances(&mut instances))).map_err(|_| {
                ManagerError::Library {
                    path: path.to_path_buf(),
                    reason: "entry point panicked".to_string(),
                }
            })?;
            instances
        };

        debug!(path = %path.display(), count = instances.len(), "Library opened");
        Ok(LoadedPlugin {
            library: Some(Arc::new(library)),
            instances,
        })
    }
}

fn missing_symbol(path: &Path, symbol: &[u8]) -> ManagerError {
    let symbol = symbol.strip_suffix(b"\0").unwrap_or(symbol);
    ManagerError::MissingSymbol {
        path: path.to_path_buf(),
        symbol: String::from_utf8_lossy(symbol).into_owned(),
    }
}

/// Plugin name for a library path (its file name)
pub fn plugin_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Record
// ─────────────────────────────────────────────────────────────────────────────

/// A loaded plugin as tracked by the manager
pub struct Plugin {
    pub name: String,
    pub path: PathBuf,
    pub loaded_at: DateTime<Local>,
    /// Instance names in the order the library produced them
    pub instances: Vec<String>,
    /// Dropped last, after every instance cell has released its clone
    pub library: Option<Arc<Library>>,
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("instances", &self.instances)
            .finish()
    }
}
