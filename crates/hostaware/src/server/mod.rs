//! Control Socket Server
//!
//! Accepts connections on a Unix domain socket and serves one request per
//! connection on its own task.

mod handler;
mod state;

pub use handler::{RequestError, handle_connection, handle_request};
pub use state::ServerState;

use std::future::Future;
use std::io;
use std::path::Path;

use tokio::net::UnixListener;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Bind the control socket at `path`
///
/// Creates missing parent directories and replaces a stale socket file. Fails
/// with `AddrInUse` if another daemon is accepting on it.
pub fn bind(path: &Path) -> io::Result<UnixListener> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    if path.exists() {
        if std::os::unix::net::UnixStream::connect(path).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{} is served by another process", path.display()),
            ));
        }
        debug!(socket = %path.display(), "Removing stale socket");
        std::fs::remove_file(path)?;
    }

    UnixListener::bind(path)
}

/// Accept connections until `shutdown` resolves
pub async fn serve<F>(listener: UnixListener, state: ServerState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    info!("Control socket ready");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let span = info_span!("connection", id = %Uuid::new_v4());
                        tokio::spawn(handle_connection(stream, state.clone()).instrument(span));
                    }
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                }
            }
            _ = &mut shutdown => break,
        }
    }

    info!("Control socket closed");
    Ok(())
}
