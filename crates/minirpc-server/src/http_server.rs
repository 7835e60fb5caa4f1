//! HTTP front-end for the minirpc server
//!
//! Lets RPC connections arrive through an HTTP server. The front-end:
//! - Accepts `CONNECT <rpc path>` and upgrades the connection, answering
//!   `HTTP/1.0 200 Connected to minirpc`, then serves the raw socket with
//!   the ordinary handshake and framed protocol
//! - Rejects any other method on the RPC path with `405`
//! - Serves a JSON debug page listing services and call counts
//!
//! # Example
//!
//! ```no_run
//! use minirpc_server::http_server::HttpServer;
//! use minirpc_server::Server;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Arc::new(Server::new());
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:9999").await.unwrap();
//!     HttpServer::new(server).run(listener).await.unwrap();
//! }
//! ```

use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::ext::ReasonPhrase;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, Version};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;

use minirpc_common::protocol::error::Result;
use minirpc_common::transport::{CONNECTED, DEFAULT_DEBUG_PATH, DEFAULT_RPC_PATH};
use minirpc_metrics::{MetricsSnapshot, ServerInfo};

use crate::server::Server;

type HttpResponse = Response<Full<Bytes>>;

/// Paths the HTTP front-end answers on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub rpc_path: String,
    pub debug_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            debug_path: DEFAULT_DEBUG_PATH.to_string(),
        }
    }
}

/// Body of the debug page.
#[derive(Debug, Serialize)]
pub struct DebugPage {
    pub server: ServerInfo,
    pub services: Vec<ServiceDebug>,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ServiceDebug {
    pub name: String,
    pub methods: Vec<MethodDebug>,
}

#[derive(Debug, Serialize)]
pub struct MethodDebug {
    pub name: String,
    pub calls: u64,
}

impl DebugPage {
    pub fn collect(server: &Server) -> Self {
        let services = server
            .services()
            .iter()
            .map(|service| ServiceDebug {
                name: service.name().to_string(),
                methods: service
                    .methods()
                    .iter()
                    .map(|method| MethodDebug {
                        name: method.name().to_string(),
                        calls: method.num_calls(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            server: server.metrics().info(),
            services,
            metrics: server.metrics().snapshot(),
        }
    }
}

/// HTTP server wrapping an RPC [`Server`].
pub struct HttpServer {
    server: Arc<Server>,
    config: Arc<ServerConfig>,
}

impl HttpServer {
    pub fn new(server: Arc<Server>) -> Self {
        Self::with_config(server, ServerConfig::default())
    }

    pub fn with_config(server: Arc<Server>, config: ServerConfig) -> Self {
        Self {
            server,
            config: Arc::new(config),
        }
    }

    /// Accepts HTTP connections until the listener fails.
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            "rpc server: HTTP front-end on {} (rpc path {}, debug path {})",
            listener.local_addr()?,
            self.config.rpc_path,
            self.config.debug_path
        );

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("rpc server: accept error: {}", e);
                    return Err(e.into());
                }
            };

            let io = TokioIo::new(stream);
            let server = self.server.clone();
            let config = self.config.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    Self::handle_request(server.clone(), config.clone(), req)
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    tracing::debug!("rpc server: HTTP connection from {} ended: {}", peer, err);
                }
            });
        }
    }

    async fn handle_request(
        server: Arc<Server>,
        config: Arc<ServerConfig>,
        req: Request<Incoming>,
    ) -> std::result::Result<HttpResponse, Infallible> {
        let path = req.uri().path();

        if path == config.rpc_path {
            if req.method() != Method::CONNECT {
                return Ok(text_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "405 must CONNECT\n",
                ));
            }
            return Ok(Self::connect(server, req));
        }

        if path == config.debug_path && req.method() == Method::GET {
            return Ok(debug_response(&server));
        }

        Ok(text_response(StatusCode::NOT_FOUND, "404 page not found\n"))
    }

    /// Answers the CONNECT and hands the upgraded socket to the RPC server.
    fn connect(server: Arc<Server>, req: Request<Incoming>) -> HttpResponse {
        tokio::task::spawn(async move {
            match hyper::upgrade::on(req).await {
                Ok(upgraded) => server.serve_conn(TokioIo::new(upgraded)).await,
                Err(e) => tracing::warn!("rpc hijacking: {}", e),
            }
        });

        let mut response = Response::new(Full::new(Bytes::new()));
        *response.version_mut() = Version::HTTP_10;
        response
            .extensions_mut()
            .insert(ReasonPhrase::from_static(CONNECTED.as_bytes()));
        response
    }
}

fn debug_response(server: &Server) -> HttpResponse {
    match serde_json::to_vec_pretty(&DebugPage::collect(server)) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => text_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("{}\n", e)),
    }
}

fn text_response(status: StatusCode, body: &str) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
