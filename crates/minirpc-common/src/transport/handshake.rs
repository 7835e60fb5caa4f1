//! Connection handshake.
//!
//! The client opens every connection by sending its [`Options`] as a JSON
//! frame. JSON is used regardless of the codec being negotiated, since the
//! codec choice is itself part of the message.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, RpcError};
use crate::protocol::{Options, MAGIC_NUMBER};
use crate::transport::codec::{BodyCodec, JsonCodec};
use crate::transport::frame::{read_frame, write_frame};

/// Sends the options and flushes. Client side.
pub async fn write_options<W>(writer: &mut W, options: &Options) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let payload = JsonCodec::encode(options)?;
    write_frame(writer, &payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the options and validates them. Server side.
///
/// Returns the decoded options together with the resolved body codec.
///
/// # Errors
///
/// - `Json`/`Io` if the options frame cannot be read or decoded
/// - `InvalidMagic` if the magic number does not match exactly
/// - `InvalidCodec` if the requested codec is not supported
pub async fn read_options<R>(reader: &mut R) -> Result<(Options, BodyCodec)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let payload = read_frame(reader).await?;
    let options: Options = JsonCodec::decode(&payload)?;

    if options.magic_number != MAGIC_NUMBER {
        return Err(RpcError::InvalidMagic(options.magic_number));
    }
    let codec = BodyCodec::for_type(&options.codec_type)?;

    Ok((options, codec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CodecType;
    use std::time::Duration;

    #[tokio::test]
    async fn test_handshake_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let sent = Options::default()
            .with_codec(CodecType::Json)
            .with_handle_timeout(Duration::from_millis(250));

        write_options(&mut client, &sent).await.unwrap();
        let (received, codec) = read_options(&mut server).await.unwrap();

        assert_eq!(received, sent);
        assert_eq!(codec.codec_type(), CodecType::Json);
    }

    #[tokio::test]
    async fn test_wrong_magic_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let mut sent = Options::default();
        sent.magic_number = 0x1234;

        write_options(&mut client, &sent).await.unwrap();
        match read_options(&mut server).await {
            Err(RpcError::InvalidMagic(magic)) => assert_eq!(magic, 0x1234),
            other => panic!("expected InvalidMagic, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_codec_rejected_by_name() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let sent = Options::default().with_codec(CodecType::from("application/gob"));

        write_options(&mut client, &sent).await.unwrap();
        let err = read_options(&mut server).await.unwrap_err();
        assert!(err.to_string().contains("application/gob"));
    }

    #[tokio::test]
    async fn test_garbage_options_rejected() {
        let mut input: &[u8] = &[0, 0, 0, 3, b'a', b'b', b'c'];
        assert!(matches!(read_options(&mut input).await, Err(RpcError::Json(_))));
    }
}
