//! minirpc Common Types and Transport
//!
//! This crate provides the protocol definitions and the connection codec
//! shared by the minirpc client and server.
//!
//! # Overview
//!
//! minirpc lets a caller invoke `"Service.Method"` on a remote process over a
//! TCP connection, a Unix socket or an HTTP CONNECT tunnel. Many calls share
//! one connection; each carries a sequence number so responses can arrive in
//! any order.
//!
//! - **Protocol Layer**: [`Options`], [`Header`], [`CodecType`] and [`RpcError`]
//! - **Transport Layer**: framing, codecs, handshake and HTTP tunneling
//!
//! # Components
//!
//! - [`protocol`] - Handshake options, frame header, error type
//! - [`transport`] - Framing, codecs and connection I/O
//!
//! # Example
//!
//! ```
//! use minirpc_common::{split_service_method, CodecType, Header, Options};
//!
//! let opts = Options::default().with_codec(CodecType::Json);
//! let header = Header::request("Foo.Sum", 1);
//! assert_eq!(split_service_method(&header.service_method), Some(("Foo", "Sum")));
//! # let _ = opts;
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
