//! minirpc Transport Layer
//!
//! Everything that touches the byte stream of a connection.
//!
//! # Wire Format
//!
//! ```text
//! [Options frame, JSON] [Header frame][Body frame] [Header frame][Body frame] ...
//! ```
//!
//! Every frame is `[4-byte length prefix as u32 big-endian] + [payload]`,
//! capped at 100 MB. Headers and bodies use the codec negotiated by the
//! handshake (postcard by default, JSON on request).
//!
//! # Components
//!
//! - **[`frame`]**: length-prefixed frames
//! - **[`BodyCodec`]**: payload encoding for the negotiated codec type
//! - **[`handshake`]**: options exchange at connection start
//! - **[`Codec`]** / **[`CodecReader`]** / **[`CodecWriter`]**: header/body I/O on a live connection
//! - **[`http`]**: HTTP CONNECT tunneling (client side) and shared paths

pub mod codec;
pub mod frame;
pub mod handshake;
pub mod http;
pub mod stream;

pub use codec::{Body, BodyCodec, JsonCodec, PostcardCodec};
pub use frame::{read_frame, write_frame, MAX_FRAME_SIZE};
pub use handshake::{read_options, write_options};
pub use http::{connect_tunnel, CONNECTED, DEFAULT_DEBUG_PATH, DEFAULT_RPC_PATH};
pub use stream::{Codec, CodecCloser, CodecReader, CodecWriter, Connection};
