//! Dial layer: turn an address into a connected [`Client`].

use std::future::Future;
use std::io;

use tokio::net::TcpStream;

use minirpc_common::protocol::error::{Result, RpcError};
use minirpc_common::protocol::Options;
use minirpc_common::transport::{connect_tunnel, Connection, DEFAULT_RPC_PATH};

use crate::client::Client;

/// Connects to an RPC server on `network` (`tcp`, `tcp4`, `tcp6` or `unix`).
///
/// `options` defaults to [`Options::default`]; supplied options always get
/// the protocol magic number. Connect and handshake together are bounded by
/// the connect timeout, if one is set.
pub async fn dial(network: &str, address: &str, options: Option<Options>) -> Result<Client> {
    dial_timeout(options, |options| async move {
        let conn = open(network, address).await?;
        Client::new(conn, options).await
    })
    .await
}

/// Connects through an HTTP CONNECT tunnel on the server's RPC path.
pub async fn dial_http(network: &str, address: &str, options: Option<Options>) -> Result<Client> {
    dial_timeout(options, |options| async move {
        let mut conn = open(network, address).await?;
        connect_tunnel(&mut conn, DEFAULT_RPC_PATH).await?;
        Client::new(conn, options).await
    })
    .await
}

/// Connects to `scheme@endpoint`, e.g. `tcp@127.0.0.1:9999`,
/// `unix@/tmp/minirpc.sock` or `http@127.0.0.1:9999`.
pub async fn xdial(rpc_addr: &str, options: Option<Options>) -> Result<Client> {
    let (protocol, address) = parse_rpc_addr(rpc_addr)?;

    match protocol {
        "http" => dial_http("tcp", address, options).await,
        network => dial(network, address, options).await,
    }
}

/// Splits `scheme@endpoint`; exactly one `@` is allowed.
pub fn parse_rpc_addr(rpc_addr: &str) -> Result<(&str, &str)> {
    match rpc_addr.split_once('@') {
        Some((protocol, address)) if !address.contains('@') => Ok((protocol, address)),
        _ => Err(RpcError::InvalidAddress(rpc_addr.to_string())),
    }
}

/// Runs `connect` under the connect timeout of the resolved options.
///
/// On expiry the connect future is dropped, which closes any socket it opened.
async fn dial_timeout<F, Fut>(options: Option<Options>, connect: F) -> Result<Client>
where
    F: FnOnce(Options) -> Fut,
    Fut: Future<Output = Result<Client>>,
{
    let options = options.map(Options::normalized).unwrap_or_default();

    match options.effective_connect_timeout() {
        None => connect(options).await,
        Some(limit) => tokio::time::timeout(limit, connect(options))
            .await
            .map_err(|_| RpcError::ConnectTimeout(limit))?,
    }
}

async fn open(network: &str, address: &str) -> Result<Box<dyn Connection>> {
    match network {
        "tcp" | "tcp4" | "tcp6" => Ok(Box::new(connect_tcp(network, address).await?)),
        #[cfg(unix)]
        "unix" => Ok(Box::new(tokio::net::UnixStream::connect(address).await?)),
        other => Err(RpcError::UnsupportedNetwork(other.to_string())),
    }
}

async fn connect_tcp(network: &str, address: &str) -> io::Result<TcpStream> {
    let candidates = tokio::net::lookup_host(address).await?.filter(|addr| match network {
        "tcp4" => addr.is_ipv4(),
        "tcp6" => addr.is_ipv6(),
        _ => true,
    });

    let mut last_err = None;
    for addr in candidates {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {} address found for {}", network, address),
        )
    }))
}
