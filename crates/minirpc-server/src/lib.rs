//! minirpc Server
//!
//! This crate provides the service registry, the per-connection dispatch
//! engine and the HTTP CONNECT front-end.
//!
//! - [`Service`] / [`MethodType`]: typed handlers registered by name
//! - [`Server`]: reads requests in order, runs them concurrently, writes replies under a lock
//! - [`http_server::HttpServer`]: tunnels RPC connections through HTTP and serves the debug page

pub mod http_server;
pub mod server;
pub mod service;

pub use http_server::{HttpServer, ServerConfig};
pub use server::{Listener, Server};
pub use service::{Argument, MethodType, Reply, Service, ServiceBuilder};
