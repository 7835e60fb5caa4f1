//! # minirpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Serve the demo Foo service over TCP
//! minirpc serve -b 127.0.0.1:9999
//!
//! # Serve it behind the HTTP front-end (CONNECT tunnel + debug page)
//! minirpc serve -b 127.0.0.1:9999 --http
//!
//! # Serve it on a unix socket
//! minirpc serve --unix /tmp/minirpc.sock
//!
//! # Make a call (outputs raw JSON)
//! minirpc call tcp@127.0.0.1:9999 Foo.Sum --args '{"num1": 1, "num2": 2}'
//! ```
//!
//! ## Address Format
//!
//! `call` takes `scheme@endpoint` where scheme is `tcp`, `tcp4`, `tcp6`,
//! `unix` or `http`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use tokio::net::TcpListener;

use minirpc_cli::call::{call_json, parse_args};
use minirpc_cli::demo::demo_server;
use minirpc_server::{HttpServer, Server};

#[derive(FromArgs)]
/// minirpc - a small RPC framework
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start a server with the demo Foo service
struct ServeArgs {
    /// TCP address to listen on
    #[argh(option, short = 'b', default = "\"127.0.0.1:9999\".into()")]
    bind: String,

    /// serve through the HTTP front-end instead of raw TCP
    #[argh(switch)]
    http: bool,

    /// listen on this unix socket path instead of TCP
    #[argh(option)]
    unix: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// make one RPC call and print the JSON reply
struct CallArgs {
    /// server address as scheme@endpoint, e.g. tcp@127.0.0.1:9999
    #[argh(positional)]
    address: String,

    /// method to call, e.g. Foo.Sum
    #[argh(positional)]
    method: String,

    /// JSON-encoded argument
    #[argh(option, short = 'a', long = "args", default = "\"null\".into()")]
    args: String,

    /// give up after this many milliseconds (0 waits forever)
    #[argh(option, long = "timeout-ms", default = "0")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call: keep stdout clean for piping to jq and friends
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let server = demo_server()?;

    if let Some(path) = &args.unix {
        return serve_unix(server, path).await;
    }

    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Invalid bind address {}", args.bind))?;
    let addr = listener.local_addr()?;

    if args.http {
        HttpServer::new(server).run(listener).await?;
    } else {
        tracing::info!("rpc server: listening on {}", addr);
        server.accept(listener).await?;
    }
    Ok(())
}

#[cfg(unix)]
async fn serve_unix(server: Arc<Server>, path: &str) -> Result<()> {
    let listener = tokio::net::UnixListener::bind(path)
        .with_context(|| format!("Invalid unix socket path {}", path))?;
    tracing::info!("rpc server: listening on unix socket {}", path);
    server.accept(listener).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn serve_unix(_server: Arc<Server>, _path: &str) -> Result<()> {
    anyhow::bail!("unix sockets are not supported on this platform")
}

async fn run_call(args: CallArgs) -> Result<()> {
    let value = parse_args(&args.args)?;
    let timeout = (args.timeout_ms > 0).then(|| Duration::from_millis(args.timeout_ms));

    let reply = call_json(&args.address, &args.method, &value, timeout).await?;

    println!("{}", serde_json::to_string(&reply)?);
    Ok(())
}
