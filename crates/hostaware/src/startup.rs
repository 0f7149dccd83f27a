//! Startup Orchestration
//!
//! Brings the manager to the configured initial state: load the libraries in
//! the plugin directory, then enable the instances listed under `[[enable]]`.
//! Failures are logged and skipped; the daemon still starts.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use hostaware_runtime::{ManagerError, ManagerHandle};

use crate::config::Config;

/// Plugin libraries (`*.so`) in `dir`, sorted by file name
///
/// A missing directory yields an empty list.
pub async fn discover_libraries(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Plugin directory does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut libraries = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "so") && entry.file_type().await?.is_file() {
            libraries.push(path);
        }
    }
    libraries.sort();
    Ok(libraries)
}

/// Resolve a plugin argument to a library path
///
/// Anything containing a path separator is used as given. A bare file name is
/// looked up in `<dir>/<kind>/` when a kind is given and that file exists,
/// otherwise in `<dir>/`.
pub fn resolve_plugin_path(dir: &Path, plugin: &str, kind: Option<&str>) -> PathBuf {
    let given = Path::new(plugin);
    if given.components().count() > 1 || given.is_absolute() {
        return given.to_path_buf();
    }
    if let Some(kind) = kind.filter(|k| !k.is_empty()) {
        let candidate = dir.join(kind).join(plugin);
        if candidate.is_file() {
            return candidate;
        }
    }
    dir.join(plugin)
}

pub async fn auto_load(manager: &ManagerHandle, config: &Config) -> usize {
    let dir = &config.plugins.dir;
    let libraries = match discover_libraries(dir).await {
        Ok(libraries) => libraries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to scan plugin directory");
            return 0;
        }
    };

    let mut loaded = 0;
    for path in libraries {
        match manager.load(&path).await {
            Ok(instances) => {
                info!(path = %path.display(), instances = ?instances, "Plugin loaded");
                loaded += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to load plugin"),
        }
    }
    loaded
}

pub async fn enable_configured(manager: &ManagerHandle, config: &Config) {
    for entry in &config.enable {
        let path = resolve_plugin_path(&config.plugins.dir, &entry.plugin, None);
        match manager.load(&path).await {
            Ok(_) | Err(ManagerError::PluginAlreadyLoaded(_)) => {}
            Err(e) => {
                warn!(plugin = %entry.plugin, error = %e, "Skipping enable list entry");
                continue;
            }
        }

        for instance in &entry.instances {
            match manager.enable(instance.as_str(), "").await {
                Ok(()) => info!(instance = %instance, "Instance enabled"),
                Err(ManagerError::AlreadyEnabled(_)) => {
                    debug!(instance = %instance, "Instance already enabled")
                }
                Err(e) => warn!(instance = %instance, error = %e, "Failed to enable instance"),
            }
        }
    }
}

/// Auto-load (if configured) and apply the enable list
pub async fn run(manager: &ManagerHandle, config: &Config) {
    if config.plugins.auto_load {
        let loaded = auto_load(manager, config).await;
        info!(count = loaded, dir = %config.plugins.dir.display(), "Auto-loaded plugins");
    }
    enable_configured(manager, config).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discover_libraries() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["libb.so", "liba.so", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.so")).unwrap();

        let found = discover_libraries(dir.path()).await.unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("liba.so"), dir.path().join("libb.so")]
        );

        let missing = discover_libraries(&dir.path().join("absent")).await.unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_resolve_plugin_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("tune")).unwrap();
        std::fs::write(dir.path().join("tune").join("libirq.so"), b"").unwrap();

        assert_eq!(
            resolve_plugin_path(dir.path(), "/opt/libx.so", Some("tune")),
            PathBuf::from("/opt/libx.so")
        );
        assert_eq!(
            resolve_plugin_path(dir.path(), "./libx.so", None),
            PathBuf::from("./libx.so")
        );
        assert_eq!(
            resolve_plugin_path(dir.path(), "libirq.so", Some("tune")),
            dir.path().join("tune").join("libirq.so")
        );
        assert_eq!(
            resolve_plugin_path(dir.path(), "libx.so", Some("tune")),
            dir.path().join("libx.so")
        );
        assert_eq!(
            resolve_plugin_path(dir.path(), "libirq.so", Some("")),
            dir.path().join("libirq.so")
        );
    }
}
