//! HTTP CONNECT tunneling, client side.
//!
//! A server reachable over HTTP accepts `CONNECT <rpc path> HTTP/1.0` and
//! answers `HTTP/1.0 200 Connected to minirpc`. From then on the socket
//! carries the ordinary handshake and framed protocol.
//!
//! The server side lives in `minirpc-server` (hyper upgrade); this module
//! only holds the shared constants and the raw client exchange, which runs
//! directly on the socket so no bytes past the response head are consumed.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, RpcError};

/// Path the HTTP front-end tunnels RPC connections on.
pub const DEFAULT_RPC_PATH: &str = "/_minirpc_";

/// Path of the debug page listing services and call counts.
pub const DEFAULT_DEBUG_PATH: &str = "/debug/minirpc";

/// Reason phrase of a successful CONNECT.
pub const CONNECTED: &str = "Connected to minirpc";

/// Upper bound on the response head the client accepts.
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Status line of a parsed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: String,
    pub code: u16,
    pub reason: String,
}

impl StatusLine {
    /// Parses `HTTP/1.x <code> <reason>`.
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        let code = parts.next().and_then(|c| c.parse::<u16>().ok());

        match code {
            Some(code) if version.starts_with("HTTP/") => Ok(StatusLine {
                version: version.to_string(),
                code,
                reason: parts.next().unwrap_or_default().to_string(),
            }),
            _ => Err(RpcError::UnexpectedHttpResponse(line.to_string())),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.code == 200 && self.reason == CONNECTED
    }
}

/// Sends the CONNECT request for `path`.
pub async fn write_connect<W>(writer: &mut W, path: &str) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let request = format!("CONNECT {} HTTP/1.0\r\n\r\n", path);
    writer.write_all(request.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the response head up to the blank line and returns its status line.
///
/// Reads one byte at a time: the server starts the framed protocol right
/// after the head, so nothing beyond it may be buffered here.
pub async fn read_response_head<R>(reader: &mut R) -> Result<StatusLine>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut head = Vec::with_capacity(128);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(RpcError::UnexpectedHttpResponse(
                "response head too large".to_string(),
            ));
        }
        reader.read_exact(&mut byte).await?;
        head.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&head);
    let status = head.lines().next().unwrap_or_default();
    StatusLine::parse(status)
}

/// Runs the client half of the tunnel setup.
pub async fn connect_tunnel<S>(stream: &mut S, path: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    write_connect(stream, path).await?;

    let status = read_response_head(stream).await?;
    if !status.is_connected() {
        return Err(RpcError::UnexpectedHttpResponse(format!(
            "{} {} {}",
            status.version, status.code, status.reason
        )));
    }
    Ok(())
}
