//! Handshake options sent once at the start of every connection.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Marks a connection as speaking the minirpc protocol.
pub const MAGIC_NUMBER: u32 = 0x3bef5c;

/// Default time allowed for connecting and completing the handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Serialization scheme used for headers and bodies after the handshake.
///
/// Travels as a MIME-like string. Strings this build does not know are kept
/// in [`CodecType::Unknown`] so the handshake can name the offending type
/// instead of failing with a generic decode error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CodecType {
    /// Compact binary encoding (postcard).
    Binary,
    /// Structured text encoding (JSON).
    Json,
    /// Anything else received from a peer.
    Unknown(String),
}

impl CodecType {
    pub const BINARY: &'static str = "application/postcard";
    pub const JSON: &'static str = "application/json";

    pub fn as_str(&self) -> &str {
        match self {
            CodecType::Binary => Self::BINARY,
            CodecType::Json => Self::JSON,
            CodecType::Unknown(s) => s,
        }
    }
}

impl Default for CodecType {
    fn default() -> Self {
        CodecType::Binary
    }
}

impl From<String> for CodecType {
    fn from(s: String) -> Self {
        match s.as_str() {
            Self::BINARY => CodecType::Binary,
            Self::JSON => CodecType::Json,
            _ => CodecType::Unknown(s),
        }
    }
}

impl From<&str> for CodecType {
    fn from(s: &str) -> Self {
        CodecType::from(s.to_string())
    }
}

impl From<CodecType> for String {
    fn from(codec: CodecType) -> Self {
        codec.as_str().to_string()
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection options negotiated by the handshake.
///
/// Always encoded as JSON, independently of the codec it selects.
///
/// # Fields
///
/// - `magic_number`: must equal [`MAGIC_NUMBER`] or the server drops the connection
/// - `codec_type`: codec used for every frame after the handshake
/// - `connect_timeout`: bound on connect + handshake on the client (`None` or zero = unlimited)
/// - `handle_timeout`: bound on each server-side invocation (`None` = unlimited)
///
/// # Example
///
/// ```
/// use minirpc_common::protocol::{CodecType, Options};
/// use std::time::Duration;
///
/// let opts = Options::default()
///     .with_codec(CodecType::Json)
///     .with_handle_timeout(Duration::from_secs(1));
/// assert_eq!(opts.codec_type, CodecType::Json);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Options {
    pub magic_number: u32,
    pub codec_type: CodecType,
    pub connect_timeout: Option<Duration>,
    pub handle_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            magic_number: MAGIC_NUMBER,
            codec_type: CodecType::Binary,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            handle_timeout: None,
        }
    }
}

impl Options {
    pub fn with_codec(mut self, codec_type: CodecType) -> Self {
        self.codec_type = codec_type;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = Some(timeout);
        self
    }

    /// Fills in what a caller may leave out of a supplied option set.
    ///
    /// The magic number is always the protocol's own; an empty codec string
    /// falls back to the default codec.
    pub fn normalized(mut self) -> Self {
        self.magic_number = MAGIC_NUMBER;
        if matches!(&self.codec_type, CodecType::Unknown(s) if s.is_empty()) {
            self.codec_type = CodecType::default();
        }
        self
    }

    /// Connect timeout, treating zero as "no limit".
    pub fn effective_connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.filter(|d| !d.is_zero())
    }

    /// Handle timeout, treating zero as "no limit".
    pub fn effective_handle_timeout(&self) -> Option<Duration> {
        self.handle_timeout.filter(|d| !d.is_zero())
    }
}
