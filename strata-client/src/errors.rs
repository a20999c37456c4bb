//! Error types for strata-client.

use std::{fmt, io};

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// An `rpc_error` answer, split into its parts.
///
/// Server error messages may end in a number (`FLOOD_WAIT_30`,
/// `FILE_MIGRATE_2`); it is moved into [`RpcError::value`] so the name can be
/// matched on its own.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcError {
    /// Status code (`400`, `420`, `500`...).
    pub code: i32,
    /// Error name without the numeric suffix.
    pub name: String,
    /// The numeric suffix, if the message had one.
    pub value: Option<u32>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "rpc error {}: {} ({v})", self.code, self.name),
            None => write!(f, "rpc error {}: {}", self.code, self.name),
        }
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// Split a server message such as `"FLOOD_WAIT_30"`.
    pub fn from_telegram(code: i32, message: &str) -> Self {
        let split = message
            .rsplit_once('_')
            .filter(|(_, tail)| !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|(head, tail)| Some((head, tail.parse::<u32>().ok()?)));
        match split {
            Some((name, value)) => Self { code, name: name.to_owned(), value: Some(value) },
            None => Self { code, name: message.to_owned(), value: None },
        }
    }

    /// Whether the name matches `pattern`.  A leading or trailing `*` turns
    /// the match into an ends-with or starts-with test.
    pub fn is(&self, pattern: &str) -> bool {
        match (pattern.strip_suffix('*'), pattern.strip_prefix('*')) {
            (Some(prefix), _) => self.name.starts_with(prefix),
            (None, Some(suffix)) => self.name.ends_with(suffix),
            (None, None) => self.name == pattern,
        }
    }

    /// Seconds to wait for a `420 FLOOD_WAIT_X`.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        (self.code == 420 && self.name == "FLOOD_WAIT").then_some(self.value?.into())
    }
}

// ─── InvocationError ──────────────────────────────────────────────────────────

/// Why a request sent through the client failed.
#[derive(Debug)]
pub enum InvocationError {
    /// The server rejected the request.
    Rpc(RpcError),
    /// Network / I/O failure that reconnecting could not recover from.
    Io(io::Error),
    /// Response deserialization failed.
    Deserialize(String),
    /// The request was dropped (e.g. sender task shut down).
    Dropped,
    /// The server answered with a transport error code (e.g. `-404`).
    Transport {
        /// Negative error code.
        code: i32,
    },
    /// An inbound frame failed its integrity checks while the request was in flight.
    Frame(String),
    /// The server refused the message itself (`bad_msg_notification` 34, 35 or 64).
    BadMessage {
        /// The notification's error code.
        code: i32,
    },
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e)              => write!(f, "{e}"),
            Self::Io(e)               => write!(f, "I/O error: {e}"),
            Self::Deserialize(s)      => write!(f, "deserialize error: {s}"),
            Self::Dropped             => write!(f, "request dropped"),
            Self::Transport { code }  => write!(f, "transport error {code}"),
            Self::Frame(s)            => write!(f, "frame error: {s}"),
            Self::BadMessage { code } => write!(f, "bad message (code {code})"),
        }
    }
}

impl std::error::Error for InvocationError {}

impl From<io::Error> for InvocationError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl From<strata_tl::deserialize::Error> for InvocationError {
    fn from(e: strata_tl::deserialize::Error) -> Self { Self::Deserialize(e.to_string()) }
}

impl From<RpcError> for InvocationError {
    fn from(e: RpcError) -> Self { Self::Rpc(e) }
}

impl InvocationError {
    /// [`RpcError::is`] for RPC errors, `false` for everything else.
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc(e) => e.is(pattern),
            _            => false,
        }
    }

    /// [`RpcError::flood_wait_seconds`] for RPC errors.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        match self {
            Self::Rpc(e) => e.flood_wait_seconds(),
            _            => None,
        }
    }
}
