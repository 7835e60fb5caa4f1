//! minirpc client
//!
//! A [`Client`] multiplexes many concurrent calls over one connection and
//! matches responses to callers by sequence number. The dial functions open
//! the connection, perform the handshake and start the client.

pub mod call;
pub mod client;
pub mod dial;

pub use call::{Call, PendingCall, DEFAULT_DONE_CAPACITY};
pub use client::Client;
pub use dial::{dial, dial_http, parse_rpc_addr, xdial};
