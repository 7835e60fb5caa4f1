use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::{Result, RpcError};
use crate::protocol::CodecType;

/// Payload codec selected by the handshake.
///
/// Encodes and decodes the payload of a single frame. Framing itself is
/// handled by [`crate::transport::frame`]; this enum only decides how the
/// bytes inside a frame are interpreted.
///
/// # Example
///
/// ```
/// use minirpc_common::transport::BodyCodec;
/// use minirpc_common::protocol::CodecType;
///
/// let codec = BodyCodec::for_type(&CodecType::Json).unwrap();
/// let bytes = codec.encode(&(2, 3)).unwrap();
/// let pair: (i32, i32) = codec.decode(&bytes).unwrap();
/// assert_eq!(pair, (2, 3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyCodec {
    /// Structured text
    Json(JsonCodec),
    /// Compact binary
    Postcard(PostcardCodec),
}

impl BodyCodec {
    /// Resolves a negotiated codec type, failing for types this build lacks.
    pub fn for_type(codec_type: &CodecType) -> Result<Self> {
        match codec_type {
            CodecType::Json => Ok(BodyCodec::Json(JsonCodec)),
            CodecType::Binary => Ok(BodyCodec::Postcard(PostcardCodec)),
            CodecType::Unknown(other) => Err(RpcError::InvalidCodec(other.clone())),
        }
    }

    pub fn codec_type(&self) -> CodecType {
        match self {
            BodyCodec::Json(_) => CodecType::Json,
            BodyCodec::Postcard(_) => CodecType::Binary,
        }
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            BodyCodec::Json(_) => JsonCodec::encode(value),
            BodyCodec::Postcard(_) => PostcardCodec::encode(value),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            BodyCodec::Json(_) => JsonCodec::decode(data),
            BodyCodec::Postcard(_) => PostcardCodec::decode(data),
        }
    }
}

/// JSON payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Postcard payloads. Not self-describing: both ends must agree on the type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostcardCodec;

impl PostcardCodec {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(postcard::to_stdvec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(postcard::from_bytes(data)?)
    }
}

/// A value that can be written as a frame body.
///
/// Object safe so the server can hold replies of any type behind
/// `Box<dyn Body>`; every `Serialize` type implements it.
pub trait Body: Send + Sync {
    fn encode_with(&self, codec: &BodyCodec) -> Result<Vec<u8>>;
}

impl<T: Serialize + Send + Sync> Body for T {
    fn encode_with(&self, codec: &BodyCodec) -> Result<Vec<u8>> {
        codec.encode(self)
    }
}
