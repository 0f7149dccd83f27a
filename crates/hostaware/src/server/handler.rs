//! Control Request Handler
//!
//! Handles one connection: read a request, run it against the manager, write
//! the response. Every failure reaches the client as an error response whose
//! first payload entry is the reason.

use std::collections::HashSet;

use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use hostaware_protocol::{
    EdgeRecord, EdgeState, Opt, ProtocolError, Request, Response, read_request, write_response,
};
use hostaware_runtime::{DependencyEdge, ErrorKind, ManagerError, plugin_name};

use super::state::ServerState;
use crate::config::{Config, ConfigError};
use crate::startup::{discover_libraries, resolve_plugin_path};

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("plugin {0} is not in the catalogue")]
    NotInCatalogue(String),

    #[error("failed to scan plugin directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration reader failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::Manager(e) => e.kind(),
            RequestError::Config(e) => e.kind(),
            RequestError::NotInCatalogue(_) => ErrorKind::NotFound,
            RequestError::Protocol(_)
            | RequestError::MissingArgument(_)
            | RequestError::Io(_)
            | RequestError::Task(_) => ErrorKind::TransportFailure,
        }
    }

    fn into_response(self) -> Response {
        Response::error(format!("{}: {}", self.kind(), self))
    }
}

type RequestResult = Result<Vec<String>, RequestError>;

/// Serve the single exchange on `stream`
pub async fn handle_connection(mut stream: UnixStream, state: ServerState) {
    let request = match read_request(&mut stream).await {
        Ok(Some(request)) => request,
        Ok(None) => {
            debug!("Client closed connection without a request");
            return;
        }
        Err(e) => {
            warn!(error = %e, "Malformed request");
            let response = RequestError::from(e).into_response();
            let _ = write_response(&mut stream, &response).await;
            return;
        }
    };

    let response = handle_request(&state, &request).await;
    if let Err(e) = write_response(&mut stream, &response).await {
        warn!(opt = %request.opt, error = %e, "Failed to send response");
    }
}

/// Run one request and build its response
pub async fn handle_request(state: &ServerState, request: &Request) -> Response {
    debug!(opt = %request.opt, args = ?request.payload, "Handling request");

    let result = match request.opt {
        Opt::Load => handle_load(state, request).await,
        Opt::Remove => handle_remove(state, request).await,
        Opt::Enable => handle_enable(state, request).await,
        Opt::Disable => handle_disable(state, request).await,
        Opt::Query => match required(request, 0, "plugin") {
            Ok(plugin) => handle_query(state, Some(plugin)).await,
            Err(e) => Err(e),
        },
        Opt::QueryAll => handle_query(state, None).await,
        Opt::QueryDep => match required(request, 0, "instance") {
            Ok(instance) => handle_query_dep(state, Some(instance)).await,
            Err(e) => Err(e),
        },
        Opt::QueryAllDeps => handle_query_dep(state, None).await,
        Opt::List => handle_list(state).await,
        Opt::Install => handle_install(state, request).await,
        Opt::Reload => handle_reload(state).await,
    };

    match result {
        Ok(lines) => Response::ok(lines),
        Err(e) => {
            warn!(opt = %request.opt, error = %e, "Request failed");
            e.into_response()
        }
    }
}

fn required<'a>(request: &'a Request, index: usize, name: &'static str) -> Result<&'a str, RequestError> {
    request
        .get(index)
        .filter(|arg| !arg.is_empty())
        .ok_or(RequestError::MissingArgument(name))
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_load(state: &ServerState, request: &Request) -> RequestResult {
    let plugin = required(request, 0, "path")?;
    let kind = request.get(1);
    let dir = state.config().await.plugins.dir;
    let path = resolve_plugin_path(&dir, plugin, kind);

    let instances = state.manager().load(&path).await?;
    info!(path = %path.display(), instances = ?instances, "Plugin loaded");
    Ok(instances)
}

async fn handle_remove(state: &ServerState, request: &Request) -> RequestResult {
    let plugin = required(request, 0, "plugin")?;
    state.manager().remove(plugin).await?;
    info!(plugin, "Plugin removed");
    Ok(Vec::new())
}

async fn handle_enable(state: &ServerState, request: &Request) -> RequestResult {
    let instance = required(request, 0, "instance")?;
    let params = request.get(1).unwrap_or_default();
    state.manager().enable(instance, params).await?;
    info!(instance, "Instance enabled");
    Ok(Vec::new())
}

async fn handle_disable(state: &ServerState, request: &Request) -> RequestResult {
    let instance = required(request, 0, "instance")?;
    state.manager().disable(instance).await?;
    info!(instance, "Instance disabled");
    Ok(Vec::new())
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_query(state: &ServerState, plugin: Option<&str>) -> RequestResult {
    let plugins = state.manager().query(plugin).await?;
    Ok(plugins.iter().map(|status| status.render()).collect())
}

async fn handle_query_dep(state: &ServerState, instance: Option<&str>) -> RequestResult {
    let edges = state.manager().query_dependencies(instance).await?;
    edges
        .iter()
        .map(|edge| edge_record(edge).to_payload().map_err(RequestError::from))
        .collect()
}

fn edge_record(edge: &DependencyEdge) -> EdgeRecord {
    let state = if !edge.present {
        EdgeState::Missing
    } else if edge.resolved {
        EdgeState::Resolved
    } else {
        EdgeState::Unavailable
    };
    EdgeRecord {
        from: edge.from.clone(),
        to: edge.to.clone(),
        state,
    }
}

/// Catalogue entries, then libraries in the plugin directory, then plugins
/// loaded from elsewhere, as `name<TAB>status<TAB>description`
async fn handle_list(state: &ServerState) -> RequestResult {
    let config = state.config().await;
    let loaded: HashSet<String> = state
        .manager()
        .query(None)
        .await?
        .into_iter()
        .map(|plugin| plugin.name)
        .collect();
    let present: Vec<String> = discover_libraries(&config.plugins.dir)
        .await?
        .iter()
        .map(|path| plugin_name(path))
        .collect();

    let status = |name: &str| {
        if loaded.contains(name) {
            "loaded"
        } else if present.iter().any(|p| p == name) {
            "installed"
        } else {
            "available"
        }
    };

    let mut lines: Vec<String> = config
        .available
        .iter()
        .map(|entry| format!("{}\t{}\t{}", entry.name, status(&entry.name), entry.description))
        .collect();
    for name in &present {
        if config.catalogue_entry(name).is_none() {
            lines.push(format!("{}\t{}\t", name, status(name)));
        }
    }
    let mut elsewhere: Vec<&String> = loaded
        .iter()
        .filter(|name| config.catalogue_entry(name).is_none() && !present.contains(*name))
        .collect();
    elsewhere.sort();
    for name in elsewhere {
        lines.push(format!("{name}\tloaded\t"));
    }
    Ok(lines)
}

// ─────────────────────────────────────────────────────────────────────────────
// Maintenance
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_install(state: &ServerState, request: &Request) -> RequestResult {
    let name = required(request, 0, "plugin")?;
    let config = state.config().await;
    let entry = config
        .catalogue_entry(name)
        .ok_or_else(|| RequestError::NotInCatalogue(name.to_string()))?;
    Ok(vec![entry.url.clone()])
}

async fn handle_reload(state: &ServerState) -> RequestResult {
    let path = state.config_path().to_path_buf();
    let config = tokio::task::spawn_blocking(move || Config::load(&path)).await??;
    let previous = state.config().await;
    if previous.server.socket != config.server.socket {
        warn!(
            socket = %config.server.socket.display(),
            "Socket path change takes effect after restart"
        );
    }

    let level = config.log.level.clone();
    state.replace_config(config).await?;
    info!(path = %state.config_path().display(), "Configuration reloaded");
    Ok(vec![format!("log level: {level}")])
}

#[cfg(test)]
mod tests {
    use super::*;

    use hostaware_runtime::{DylibLoader, PluginManager};

    use crate::logging::LogControl;

    #[test]
    fn test_edge_record_states() {
        let edge = |resolved, present| DependencyEdge {
            from: "tune".into(),
            to: "collector".into(),
            resolved,
            present,
        };
        assert_eq!(edge_record(&edge(true, true)).state, EdgeState::Resolved);
        assert_eq!(edge_record(&edge(false, true)).state, EdgeState::Unavailable);
        assert_eq!(edge_record(&edge(false, false)).state, EdgeState::Missing);
    }

    #[test]
    fn test_error_reason_carries_kind() {
        let response = RequestError::from(ManagerError::PluginNotFound("libx.so".into())).into_response();
        assert_eq!(response.reason(), Some("not found: plugin libx.so does not exist"));

        let response = RequestError::MissingArgument("instance").into_response();
        assert_eq!(response.reason(), Some("transport failure: missing argument: instance"));
    }

    #[tokio::test]
    async fn test_reload_swaps_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostaware.toml");
        std::fs::write(&path, "[log]\nlevel = \"warn\"\n").unwrap();

        let manager = PluginManager::spawn(DylibLoader, tokio::runtime::Handle::current()).unwrap();
        let state = ServerState::new(
            manager.clone(),
            Config::default(),
            path.clone(),
            LogControl::detached("info"),
        );

        assert_eq!(handle_reload(&state).await.unwrap(), vec!["log level: warn"]);
        assert_eq!(state.log().level(), "warn");
        assert_eq!(state.config().await.log.level, "warn");

        std::fs::write(&path, "[log]\nlevel = \"shouty\"\n").unwrap();
        let err = handle_reload(&state).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert_eq!(state.log().level(), "warn");

        manager.shutdown().await.unwrap();
    }
}
