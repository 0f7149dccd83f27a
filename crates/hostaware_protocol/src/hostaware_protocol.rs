//! Hostaware Protocol - Control channel between clients and the daemon
//!
//! One request and one response are exchanged per connection over a Unix
//! domain socket.
//!
//! # Wire Format
//!
//! Each frame is:
//! - 4 bytes: length of what follows (big-endian u32)
//! - 1 byte: operation code ([`Opt`] for requests, [`ResponseOpt`] for responses)
//! - N bytes: JSON array of strings (the payload)

mod client;
mod error;
mod frame;
mod message;

pub use client::*;
pub use error::*;
pub use frame::*;
pub use message::*;

/// Control socket used when neither side is told otherwise
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/hostaware/hostaware.sock";
