//! Control Messages
//!
//! Requests carry an [`Opt`] and a list of string arguments; responses carry a
//! [`ResponseOpt`] and a list of result lines. On error, the first payload
//! entry is the reason.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, ProtocolResult};

/// Operation requested by a client
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opt {
    /// `[path, type?]`
    Load = 1,
    /// `[plugin]`
    Remove = 2,
    /// `[instance, params?]`
    Enable = 3,
    /// `[instance]`
    Disable = 4,
    /// `[plugin]`
    Query = 5,
    QueryAll = 6,
    /// `[instance]`
    QueryDep = 7,
    QueryAllDeps = 8,
    List = 9,
    /// `[plugin]`
    Install = 10,
    Reload = 11,
}

impl TryFrom<u8> for Opt {
    type Error = ProtocolError;

    fn try_from(value: u8) -> ProtocolResult<Self> {
        match value {
            1 => Ok(Opt::Load),
            2 => Ok(Opt::Remove),
            3 => Ok(Opt::Enable),
            4 => Ok(Opt::Disable),
            5 => Ok(Opt::Query),
            6 => Ok(Opt::QueryAll),
            7 => Ok(Opt::QueryDep),
            8 => Ok(Opt::QueryAllDeps),
            9 => Ok(Opt::List),
            10 => Ok(Opt::Install),
            11 => Ok(Opt::Reload),
            _ => Err(ProtocolError::UnknownOpt(value)),
        }
    }
}

impl fmt::Display for Opt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Opt::Load => "load",
            Opt::Remove => "remove",
            Opt::Enable => "enable",
            Opt::Disable => "disable",
            Opt::Query => "query",
            Opt::QueryAll => "query_all",
            Opt::QueryDep => "query_dep",
            Opt::QueryAllDeps => "query_all_deps",
            Opt::List => "list",
            Opt::Install => "install",
            Opt::Reload => "reload",
        };
        f.write_str(s)
    }
}

/// Outcome of a request
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseOpt {
    Ok = 0x80,
    Error = 0x81,
}

impl TryFrom<u8> for ResponseOpt {
    type Error = ProtocolError;

    fn try_from(value: u8) -> ProtocolResult<Self> {
        match value {
            0x80 => Ok(ResponseOpt::Ok),
            0x81 => Ok(ResponseOpt::Error),
            _ => Err(ProtocolError::UnknownOpt(value)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub opt: Opt,
    pub payload: Vec<String>,
}

impl Request {
    pub fn new(opt: Opt) -> Self {
        Self {
            opt,
            payload: Vec::new(),
        }
    }

    /// Builder-style argument push
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.payload.push(value.into());
        self
    }

    /// Argument at `index`, if present
    pub fn get(&self, index: usize) -> Option<&str> {
        self.payload.get(index).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub opt: ResponseOpt,
    pub payload: Vec<String>,
}

impl Response {
    pub fn ok(payload: Vec<String>) -> Self {
        Self {
            opt: ResponseOpt::Ok,
            payload,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            opt: ResponseOpt::Error,
            payload: vec![reason.into()],
        }
    }

    pub fn is_ok(&self) -> bool {
        self.opt == ResponseOpt::Ok
    }

    /// Error reason, for error responses
    pub fn reason(&self) -> Option<&str> {
        match self.opt {
            ResponseOpt::Ok => None,
            ResponseOpt::Error => Some(self.payload.first().map_or("unknown error", |s| s.as_str())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dependency Records
// ─────────────────────────────────────────────────────────────────────────────

/// State of the target of a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeState {
    /// Target exists and is available
    Resolved,
    /// Target exists but is unavailable
    Unavailable,
    /// Target is not loaded
    Missing,
}

/// One `from -> to` dependency, as carried in `QueryDep` responses
///
/// Each payload entry is one record encoded as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: String,
    pub to: String,
    pub state: EdgeState,
}

impl EdgeRecord {
    pub fn to_payload(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_payload(entry: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(entry)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opt_codes() {
        for code in 1..=11u8 {
            let opt = Opt::try_from(code).unwrap();
            assert_eq!(opt as u8, code);
        }
        assert!(matches!(Opt::try_from(0), Err(ProtocolError::UnknownOpt(0))));
        assert!(matches!(Opt::try_from(0x80), Err(ProtocolError::UnknownOpt(0x80))));
        assert_eq!(Opt::QueryAllDeps.to_string(), "query_all_deps");
    }

    #[test]
    fn test_error_reason() {
        let response = Response::error("plugin libx.so does not exist");
        assert!(!response.is_ok());
        assert_eq!(response.reason(), Some("plugin libx.so does not exist"));

        let empty = Response {
            opt: ResponseOpt::Error,
            payload: Vec::new(),
        };
        assert_eq!(empty.reason(), Some("unknown error"));
        assert_eq!(Response::ok(vec!["x".into()]).reason(), None);
    }

    #[test]
    fn test_edge_record_payload() {
        let record = EdgeRecord {
            from: "tune".into(),
            to: "collector".into(),
            state: EdgeState::Missing,
        };
        let entry = record.to_payload().unwrap();
        assert!(entry.contains("\"missing\""));
        assert_eq!(EdgeRecord::from_payload(&entry).unwrap(), record);
        assert!(EdgeRecord::from_payload("tune collector").is_err());
    }
}
