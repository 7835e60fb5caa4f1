use std::time::Duration;

use thiserror::Error;

/// Every failure the minirpc client, server and transport can report.
///
/// The variants fall into a few families so callers can decide on a retry
/// policy without string matching:
///
/// - handshake: [`InvalidMagic`](Self::InvalidMagic), [`InvalidCodec`](Self::InvalidCodec)
/// - framing/decoding: [`Io`](Self::Io), [`MessageTooLarge`](Self::MessageTooLarge),
///   [`Json`](Self::Json), [`Postcard`](Self::Postcard), [`Decode`](Self::Decode)
/// - dispatch: [`IllFormedMethod`](Self::IllFormedMethod), [`ServiceNotFound`](Self::ServiceNotFound),
///   [`MethodNotFound`](Self::MethodNotFound), [`HandleTimeout`](Self::HandleTimeout),
///   [`Server`](Self::Server)
/// - availability: [`Shutdown`](Self::Shutdown)
/// - timeout/cancellation: [`ConnectTimeout`](Self::ConnectTimeout), [`Canceled`](Self::Canceled)
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("connection is shut down")]
    Shutdown,

    #[error("{0}")]
    Server(String),

    #[error("rpc client: call canceled: {0}")]
    Canceled(String),

    #[error("rpc client: connect timeout: expect within {0:?}")]
    ConnectTimeout(Duration),

    #[error("rpc server: request handle timeout: expect within {0:?}")]
    HandleTimeout(Duration),

    #[error("invalid magic number {0:#x}")]
    InvalidMagic(u32),

    #[error("invalid codec type {0}")]
    InvalidCodec(String),

    #[error("rpc server: service/method request ill-formed: {0}")]
    IllFormedMethod(String),

    #[error("rpc server: can't find service {0}")]
    ServiceNotFound(String),

    #[error("rpc server: can't find method {0}")]
    MethodNotFound(String),

    #[error("rpc server: {0} is not a valid service or method name")]
    InvalidService(String),

    #[error("rpc: service already defined: {0}")]
    DuplicateService(String),

    #[error("rpc client: wrong format '{0}', expect protocol@addr")]
    InvalidAddress(String),

    #[error("rpc client: unsupported network '{0}'")]
    UnsupportedNetwork(String),

    #[error("unexpected HTTP response: {0}")]
    UnexpectedHttpResponse(String),

    #[error("Message too large: {0} bytes (max {1} bytes)")]
    MessageTooLarge(usize, usize),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Postcard(#[from] postcard::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// True for the dial timeout and the server-side handle timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::ConnectTimeout(_) | RpcError::HandleTimeout(_))
    }

    /// True when the caller stopped waiting for the call.
    pub fn is_canceled(&self) -> bool {
        matches!(self, RpcError::Canceled(_))
    }

    /// True when the error string came back in a response header.
    pub fn is_server_error(&self) -> bool {
        matches!(self, RpcError::Server(_))
    }

    /// True when the stream ended cleanly rather than failing mid-frame.
    pub fn is_eof(&self) -> bool {
        match self {
            RpcError::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
