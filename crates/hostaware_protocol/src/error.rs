//! Protocol errors.

/// Errors that can occur while exchanging control messages
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown operation code: {0}")]
    UnknownOpt(u8),

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),

    #[error("Connection closed before a response arrived")]
    ConnectionClosed,
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
