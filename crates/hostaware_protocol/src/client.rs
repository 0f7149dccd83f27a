//! Control Client
//!
//! Used by the CLI and by tests to talk to a running daemon.

use std::path::Path;

use tokio::net::UnixStream;
use tracing::debug;

use crate::{ProtocolError, ProtocolResult, Request, Response, read_response, write_request};

/// Send one request to the daemon listening on `socket` and wait for its
/// response
pub async fn send_request(socket: &Path, request: &Request) -> ProtocolResult<Response> {
    let mut stream = UnixStream::connect(socket).await?;
    debug!(socket = %socket.display(), opt = %request.opt, "Sending request");

    write_request(&mut stream, request).await?;
    read_response(&mut stream)
        .await?
        .ok_or(ProtocolError::ConnectionClosed)
}
