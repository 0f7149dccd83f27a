//! Drives the control socket through the real client with in-memory plugins.

use std::path::{Path, PathBuf};

use tokio::sync::oneshot;

use hostaware::config::Config;
use hostaware::logging::LogControl;
use hostaware::server::{self, ServerState};
use hostaware::startup;
use hostaware_protocol::{EdgeRecord, EdgeState, Opt, Request, Response, send_request};
use hostaware_runtime::hostaware_types::{Instance, InstanceContext, InstanceKind, InstanceResult};
use hostaware_runtime::{
    LoadedPlugin, ManagerError, ManagerHandle, ManagerResult, PluginLoader, PluginManager,
    plugin_name,
};

struct Quiet {
    name: &'static str,
    kind: InstanceKind,
    deps: Vec<String>,
}

impl Instance for Quiet {
    fn name(&self) -> &str {
        self.name
    }

    fn period(&self) -> u64 {
        3_600_000
    }

    fn kind(&self) -> InstanceKind {
        self.kind
    }

    fn dependencies(&self) -> Vec<String> {
        self.deps.clone()
    }

    fn enable(&mut self, _ctx: &InstanceContext, _params: &str) -> InstanceResult {
        Ok(())
    }

    fn disable(&mut self, _ctx: &InstanceContext) {}

    fn run(&mut self, _ctx: &InstanceContext) {}
}

/// Serves two libraries by file name: a collector and a tune depending on it
struct MemoryLoader;

impl PluginLoader for MemoryLoader {
    fn load(&self, path: &Path) -> ManagerResult<LoadedPlugin> {
        let instance: Box<dyn Instance> = match plugin_name(path).as_str() {
            "libcollector.so" => Box::new(Quiet {
                name: "collector",
                kind: InstanceKind::COLLECTOR,
                deps: Vec::new(),
            }),
            "libtune.so" => Box::new(Quiet {
                name: "tune",
                kind: InstanceKind::TUNE,
                deps: vec!["collector".into()],
            }),
            _ => {
                return Err(ManagerError::Library {
                    path: path.to_path_buf(),
                    reason: "no such file".into(),
                });
            }
        };
        Ok(LoadedPlugin {
            library: None,
            instances: vec![instance],
        })
    }
}

struct Daemon {
    _dir: tempfile::TempDir,
    socket: PathBuf,
    config_path: PathBuf,
    state: ServerState,
    manager: ManagerHandle,
    stop_tx: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl Daemon {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let plugins = dir.path().join("plugins");
        std::fs::create_dir(&plugins).unwrap();
        for name in ["libcollector.so", "libtune.so", "libextra.so"] {
            std::fs::write(plugins.join(name), b"").unwrap();
        }

        let config_path = dir.path().join("hostaware.toml");
        std::fs::write(&config_path, config_text(&plugins, "info")).unwrap();
        let config = Config::load(&config_path).unwrap();

        let manager = PluginManager::spawn(MemoryLoader, tokio::runtime::Handle::current()).unwrap();
        let socket = dir.path().join("run").join("hostaware.sock");
        let listener = server::bind(&socket).unwrap();
        let state = ServerState::new(
            manager.clone(),
            config,
            config_path.clone(),
            LogControl::detached("info"),
        );

        let (stop_tx, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(server::serve(listener, state.clone(), async move {
            let _ = stopped.await;
        }));

        Self {
            _dir: dir,
            socket,
            config_path,
            state,
            manager,
            stop_tx,
            server,
        }
    }

    async fn send(&self, request: Request) -> Response {
        send_request(&self.socket, &request).await.unwrap()
    }

    async fn stop(self) {
        let _ = self.stop_tx.send(());
        self.server.await.unwrap().unwrap();
        self.manager.shutdown().await.unwrap();
    }
}

fn config_text(plugins: &Path, level: &str) -> String {
    format!(
        r#"
[log]
level = "{level}"

[plugins]
dir = "{}"
auto_load = false

[[available]]
name = "libcollector.so"
description = "Collector"
url = "https://example.invalid/libcollector.rpm"

[[available]]
name = "libremote.so"
description = "Not installed"
url = "https://example.invalid/libremote.rpm"
"#,
        plugins.display()
    )
}

fn reason(response: &Response) -> &str {
    response.reason().unwrap_or("")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_lifecycle_over_socket() {
    let daemon = Daemon::start().await;

    let response = daemon.send(Request::new(Opt::Enable).arg("tune")).await;
    assert!(reason(&response).starts_with("not found"), "{response:?}");

    let response = daemon.send(Request::new(Opt::Load).arg("libtune.so")).await;
    assert_eq!(response, Response::ok(vec!["tune".into()]));

    let response = daemon.send(Request::new(Opt::Enable).arg("tune")).await;
    assert!(reason(&response).starts_with("dependency unavailable"), "{response:?}");

    let response = daemon.send(Request::new(Opt::Load).arg("libcollector.so").arg("")).await;
    assert_eq!(response, Response::ok(vec!["collector".into()]));

    let response = daemon.send(Request::new(Opt::Load).arg("libtune.so")).await;
    assert!(reason(&response).starts_with("already in state"));

    let response = daemon.send(Request::new(Opt::Enable).arg("tune").arg("")).await;
    assert!(response.is_ok(), "{response:?}");

    let response = daemon.send(Request::new(Opt::QueryDep).arg("tune")).await;
    let edges: Vec<EdgeRecord> = response
        .payload
        .iter()
        .map(|entry| EdgeRecord::from_payload(entry).unwrap())
        .collect();
    assert_eq!(
        edges,
        vec![EdgeRecord {
            from: "tune".into(),
            to: "collector".into(),
            state: EdgeState::Resolved,
        }]
    );

    let response = daemon.send(Request::new(Opt::Query).arg("libtune.so")).await;
    assert!(response.payload[0].contains("tune (tune) available running"));

    // Enabling the tune brought up the collector it depends on
    let response = daemon.send(Request::new(Opt::Remove).arg("libcollector.so")).await;
    assert!(reason(&response).starts_with("resource busy"), "{response:?}");
    let response = daemon.send(Request::new(Opt::Disable).arg("collector")).await;
    assert!(response.is_ok(), "{response:?}");

    // Removing the collector strands the tune, which is disabled
    let response = daemon.send(Request::new(Opt::Remove).arg("libcollector.so")).await;
    assert!(response.is_ok(), "{response:?}");

    let response = daemon.send(Request::new(Opt::QueryAllDeps)).await;
    let edge = EdgeRecord::from_payload(&response.payload[0]).unwrap();
    assert_eq!(edge.state, EdgeState::Missing);

    let response = daemon.send(Request::new(Opt::QueryAll)).await;
    assert_eq!(response.payload.len(), 1);
    assert!(response.payload[0].contains("tune (tune) unavailable close"));

    let response = daemon.send(Request::new(Opt::Disable).arg("tune")).await;
    assert!(!response.is_ok());

    let response = daemon.send(Request::new(Opt::Remove).arg("libtune.so")).await;
    assert!(response.is_ok());
    let response = daemon.send(Request::new(Opt::Query).arg("libtune.so")).await;
    assert!(reason(&response).starts_with("not found"));

    daemon.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_and_install() {
    let daemon = Daemon::start().await;

    let response = daemon.send(Request::new(Opt::Load).arg("libcollector.so")).await;
    assert!(response.is_ok());

    let response = daemon.send(Request::new(Opt::List)).await;
    assert_eq!(
        response.payload,
        vec![
            "libcollector.so\tloaded\tCollector".to_string(),
            "libremote.so\tavailable\tNot installed".to_string(),
            "libextra.so\tinstalled\t".to_string(),
            "libtune.so\tinstalled\t".to_string(),
        ]
    );

    let response = daemon.send(Request::new(Opt::Install).arg("libremote.so")).await;
    assert_eq!(
        response,
        Response::ok(vec!["https://example.invalid/libremote.rpm".into()])
    );

    let response = daemon.send(Request::new(Opt::Install).arg("libnope.so")).await;
    assert_eq!(
        reason(&response),
        "not found: plugin libnope.so is not in the catalogue"
    );

    daemon.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reload_and_bad_requests() {
    let daemon = Daemon::start().await;
    let plugins = daemon.state.config().await.plugins.dir;

    std::fs::write(&daemon.config_path, config_text(&plugins, "debug")).unwrap();
    let response = daemon.send(Request::new(Opt::Reload)).await;
    assert_eq!(response, Response::ok(vec!["log level: debug".into()]));
    assert_eq!(daemon.state.log().level(), "debug");

    std::fs::write(&daemon.config_path, config_text(&plugins, "shouty")).unwrap();
    let response = daemon.send(Request::new(Opt::Reload)).await;
    assert!(reason(&response).starts_with("config invalid"));
    assert_eq!(daemon.state.log().level(), "debug");
    assert_eq!(daemon.state.config().await.log.level, "debug");

    let response = daemon.send(Request::new(Opt::Enable)).await;
    assert_eq!(
        reason(&response),
        "transport failure: missing argument: instance"
    );

    let response = daemon.send(Request::new(Opt::Load).arg("libmissing.so")).await;
    assert!(reason(&response).starts_with("transport failure"));

    daemon.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_startup_orchestration() {
    let daemon = Daemon::start().await;
    let mut config = daemon.state.config().await;
    config.plugins.auto_load = true;
    config.enable = toml::from_str::<Config>(
        r#"
        [[enable]]
        plugin = "libtune.so"
        instances = ["collector", "tune", "ghost"]
        "#,
    )
    .unwrap()
    .enable;

    // libextra.so is rejected by the loader; the rest still comes up
    startup::run(&daemon.manager, &config).await;

    let status = daemon.manager.instance("tune").await.unwrap();
    assert!(status.enabled);
    assert!(daemon.manager.instance("collector").await.unwrap().enabled);
    assert_eq!(daemon.manager.query(None).await.unwrap().len(), 2);

    daemon.stop().await;
}
