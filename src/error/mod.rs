// error.rs
use std::{error::Error, fmt};

const ERR_MSG_NOT_FOUND: &str = "no such node, hook, type or path element";
const ERR_MSG_EXISTS: &str = "name already exists";
const ERR_MSG_ADDR_IN_USE: &str = "node name already in use";
const ERR_MSG_BUSY: &str = "type still has live instances";
const ERR_MSG_NOT_CONNECTED: &str = "hook is not connected";
const ERR_MSG_NET_DOWN: &str = "hook or node is going away";
const ERR_MSG_INVALID: &str = "invalid argument";
const ERR_MSG_NO_MEMORY: &str = "out of resources";
const ERR_MSG_IN_PROGRESS: &str = "operation queued, not yet completed";

const ENOENT: i32 = 2;
const ENOMEM: i32 = 12;
const EBUSY: i32 = 16;
const EEXIST: i32 = 17;
const EINVAL: i32 = 22;
const EINPROGRESS: i32 = 36;
const EADDRINUSE: i32 = 48;
const ENETDOWN: i32 = 50;
const ENOTCONN: i32 = 57;

/// Errors surfaced by the graph engine.
///
/// Every variant maps to a Unix errno so that control-message responses can
/// carry it in their `error` field and tooling can print the usual text.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NgError {
    NotFound,
    Exists,
    AddrInUse,
    Busy,
    NotConnected,
    NetDown,
    Invalid,
    NoMemory,
    InProgress,
}

pub type NgResult<T> = Result<T, NgError>;

impl NgError {
    /// Errno value carried in control-message responses.
    pub fn errno(&self) -> i32 {
        match self {
            NgError::NotFound => ENOENT,
            NgError::Exists => EEXIST,
            NgError::AddrInUse => EADDRINUSE,
            NgError::Busy => EBUSY,
            NgError::NotConnected => ENOTCONN,
            NgError::NetDown => ENETDOWN,
            NgError::Invalid => EINVAL,
            NgError::NoMemory => ENOMEM,
            NgError::InProgress => EINPROGRESS,
        }
    }

    /// Inverse of [`errno`](Self::errno). `0` is success; unknown values map to `Invalid`.
    pub fn from_errno(code: i32) -> Option<Self> {
        match code {
            0 => None,
            ENOENT => Some(NgError::NotFound),
            EEXIST => Some(NgError::Exists),
            EADDRINUSE => Some(NgError::AddrInUse),
            EBUSY => Some(NgError::Busy),
            ENOTCONN => Some(NgError::NotConnected),
            ENETDOWN => Some(NgError::NetDown),
            ENOMEM => Some(NgError::NoMemory),
            EINPROGRESS => Some(NgError::InProgress),
            _ => Some(NgError::Invalid),
        }
    }
}

impl fmt::Display for NgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NgError::NotFound => write!(f, "{ERR_MSG_NOT_FOUND}"),
            NgError::Exists => write!(f, "{ERR_MSG_EXISTS}"),
            NgError::AddrInUse => write!(f, "{ERR_MSG_ADDR_IN_USE}"),
            NgError::Busy => write!(f, "{ERR_MSG_BUSY}"),
            NgError::NotConnected => write!(f, "{ERR_MSG_NOT_CONNECTED}"),
            NgError::NetDown => write!(f, "{ERR_MSG_NET_DOWN}"),
            NgError::Invalid => write!(f, "{ERR_MSG_INVALID}"),
            NgError::NoMemory => write!(f, "{ERR_MSG_NO_MEMORY}"),
            NgError::InProgress => write!(f, "{ERR_MSG_IN_PROGRESS}"),
        }
    }
}

impl Error for NgError {}

impl From<bincode::Error> for NgError {
    fn from(_: bincode::Error) -> Self {
        NgError::Invalid
    }
}

impl From<serde_json::Error> for NgError {
    fn from(_: serde_json::Error) -> Self {
        NgError::Invalid
    }
}

/// Failure to receive from a [`ControlPort`](crate::nodes::port::ControlPort).
#[derive(Debug)]
pub enum RecvError {
    Timeout,
    Disconnected,
}

impl Error for RecvError {}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvError::Timeout => write!(f, "operation timed out"),
            RecvError::Disconnected => write!(f, "connection disconnected"),
        }
    }
}
