//! Hostaware Control Client
//!
//! Sends one control request to a running daemon and prints the result.

mod ops;

use std::io;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{ArgGroup, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use hostaware_protocol::{DEFAULT_SOCKET_PATH, Opt, Request, send_request};

/// Control a running hostaware daemon
#[derive(Parser, Debug)]
#[command(name = "hostaware-ctl")]
#[command(about = "Control a running hostaware daemon", long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["load", "remove", "query", "query_dep", "enable", "disable", "list", "install", "reload"]),
))]
struct Args {
    /// Load a plugin library (file name in the plugin directory, or a path)
    #[arg(short, long, value_name = "PLUGIN")]
    load: Option<String>,

    /// Plugin type, used as a subdirectory of the plugin directory
    #[arg(short = 't', long = "type", value_name = "TYPE", requires = "load")]
    kind: Option<String>,

    /// Remove a loaded plugin
    #[arg(short, long, value_name = "PLUGIN")]
    remove: Option<String>,

    /// Show status of one plugin, or of all plugins
    #[arg(short, long, value_name = "PLUGIN", num_args = 0..=1, default_missing_value = "")]
    query: Option<String>,

    /// Show dependencies of one instance, or of all instances, and write a
    /// Graphviz file
    #[arg(short = 'Q', long, value_name = "INSTANCE", num_args = 0..=1, default_missing_value = "")]
    query_dep: Option<String>,

    /// Enable an instance
    #[arg(short, long, value_name = "INSTANCE")]
    enable: Option<String>,

    /// Parameters passed to the instance being enabled
    #[arg(short, long, requires = "enable")]
    params: Option<String>,

    /// Disable an instance
    #[arg(short, long, value_name = "INSTANCE")]
    disable: Option<String>,

    /// List installable and installed plugins
    #[arg(long)]
    list: bool,

    /// Show where to download a plugin from the catalogue
    #[arg(short, long, value_name = "PLUGIN")]
    install: Option<String>,

    /// Make the daemon re-read its configuration
    #[arg(long)]
    reload: bool,

    /// Daemon control socket
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Where `--query-dep` writes the Graphviz file
    #[arg(long, default_value = "dep.dot")]
    dot: PathBuf,
}

impl Args {
    fn request(&self) -> Request {
        if let Some(plugin) = &self.load {
            let request = Request::new(Opt::Load).arg(plugin);
            match &self.kind {
                Some(kind) => request.arg(kind),
                None => request,
            }
        } else if let Some(plugin) = &self.remove {
            Request::new(Opt::Remove).arg(plugin)
        } else if let Some(plugin) = &self.query {
            if plugin.is_empty() {
                Request::new(Opt::QueryAll)
            } else {
                Request::new(Opt::Query).arg(plugin)
            }
        } else if let Some(instance) = &self.query_dep {
            if instance.is_empty() {
                Request::new(Opt::QueryAllDeps)
            } else {
                Request::new(Opt::QueryDep).arg(instance)
            }
        } else if let Some(instance) = &self.enable {
            Request::new(Opt::Enable)
                .arg(instance)
                .arg(self.params.clone().unwrap_or_default())
        } else if let Some(instance) = &self.disable {
            Request::new(Opt::Disable).arg(instance)
        } else if let Some(plugin) = &self.install {
            Request::new(Opt::Install).arg(plugin)
        } else if self.reload {
            Request::new(Opt::Reload)
        } else {
            Request::new(Opt::List)
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let request = args.request();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let response = rt.block_on(send_request(&args.socket, &request))?;
    debug!(opt = %request.opt, ok = response.is_ok(), "Response received");

    if let Some(reason) = response.reason() {
        bail!("{} failed: {}", request.opt, reason);
    }

    for line in ops::format_response(&request, &response)? {
        println!("{line}");
    }

    if matches!(request.opt, Opt::QueryDep | Opt::QueryAllDeps) {
        let edges = ops::parse_edges(&response)?;
        ops::write_dot(&args.dot, &edges)?;
        println!("Dependency graph written to {}", args.dot.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_for(argv: &[&str]) -> Request {
        let mut full = vec!["hostaware-ctl"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap().request()
    }

    #[test]
    fn test_requests_from_flags() {
        assert_eq!(
            request_for(&["-l", "libirq.so", "-t", "tune"]),
            Request::new(Opt::Load).arg("libirq.so").arg("tune")
        );
        assert_eq!(
            request_for(&["--load", "/opt/libx.so"]),
            Request::new(Opt::Load).arg("/opt/libx.so")
        );
        assert_eq!(
            request_for(&["-r", "libirq.so"]),
            Request::new(Opt::Remove).arg("libirq.so")
        );
        assert_eq!(request_for(&["-q"]), Request::new(Opt::QueryAll));
        assert_eq!(
            request_for(&["-q", "libirq.so"]),
            Request::new(Opt::Query).arg("libirq.so")
        );
        assert_eq!(request_for(&["-Q"]), Request::new(Opt::QueryAllDeps));
        assert_eq!(
            request_for(&["--query-dep", "tune"]),
            Request::new(Opt::QueryDep).arg("tune")
        );
        assert_eq!(
            request_for(&["-e", "tune", "-p", "cpu=2"]),
            Request::new(Opt::Enable).arg("tune").arg("cpu=2")
        );
        assert_eq!(
            request_for(&["-d", "tune"]),
            Request::new(Opt::Disable).arg("tune")
        );
        assert_eq!(request_for(&["--list"]), Request::new(Opt::List));
        assert_eq!(
            request_for(&["-i", "libirq.so"]),
            Request::new(Opt::Install).arg("libirq.so")
        );
        assert_eq!(request_for(&["--reload"]), Request::new(Opt::Reload));
    }

    #[test]
    fn test_exactly_one_action() {
        assert!(Args::try_parse_from(["hostaware-ctl"]).is_err());
        assert!(Args::try_parse_from(["hostaware-ctl", "-e", "a", "-d", "b"]).is_err());
        assert!(Args::try_parse_from(["hostaware-ctl", "-t", "tune"]).is_err());
    }
}
