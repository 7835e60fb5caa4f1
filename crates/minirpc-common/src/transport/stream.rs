//! Header/body codec over a byte-stream connection.
//!
//! A [`Codec`] owns one connection after the handshake. It is split into a
//! [`CodecReader`], owned by the single task that reads frames, and a
//! [`CodecWriter`], shared behind the connection's write lock. Both halves
//! observe the same close signal, so closing either side (or a
//! [`CodecCloser`] handle) also stops the reader.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf};
use tokio::sync::watch;

use crate::protocol::error::{Result, RpcError};
use crate::protocol::{CodecType, Header};
use crate::transport::codec::{Body, BodyCodec};
use crate::transport::frame::{read_frame, write_frame};

/// Any bidirectional byte stream the codec can run on.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

type BoxedConnection = Box<dyn Connection>;

/// Frame codec for one connection.
///
/// # Example
///
/// ```no_run
/// use minirpc_common::protocol::{CodecType, Header};
/// use minirpc_common::transport::Codec;
///
/// # async fn demo(stream: tokio::net::TcpStream) -> minirpc_common::Result<()> {
/// let (mut reader, mut writer) = Codec::new(stream, &CodecType::Json)?.split();
///
/// writer.write(&Header::request("Foo.Sum", 1), &(2, 3)).await?;
///
/// let mut header = Header::default();
/// reader.read_header(&mut header).await?;
/// let reply: i64 = reader.read_body().await?;
/// # Ok(())
/// # }
/// ```
pub struct Codec {
    reader: CodecReader,
    writer: CodecWriter,
}

impl Codec {
    /// Wraps a connection, failing if the codec type is not supported.
    pub fn new<C: Connection>(conn: C, codec_type: &CodecType) -> Result<Self> {
        let body = BodyCodec::for_type(codec_type)?;
        Ok(Self::with_body_codec(conn, body))
    }

    pub fn with_body_codec<C: Connection>(conn: C, body: BodyCodec) -> Self {
        let conn: BoxedConnection = Box::new(conn);
        let (read, write) = tokio::io::split(conn);
        let (closed_tx, closed_rx) = watch::channel(false);

        Codec {
            reader: CodecReader {
                inner: BufReader::new(read),
                codec: body,
                closed: closed_rx,
            },
            writer: CodecWriter {
                inner: BufWriter::new(write),
                codec: body,
                closed: Arc::new(closed_tx),
            },
        }
    }

    pub fn split(self) -> (CodecReader, CodecWriter) {
        (self.reader, self.writer)
    }
}

/// Read half of a [`Codec`].
///
/// Reads are stateful: call [`read_header`](Self::read_header) and then
/// exactly one body read per frame pair, from one task at a time.
pub struct CodecReader {
    inner: BufReader<ReadHalf<BoxedConnection>>,
    codec: BodyCodec,
    closed: watch::Receiver<bool>,
}

impl CodecReader {
    pub fn body_codec(&self) -> BodyCodec {
        self.codec
    }

    /// Reads and decodes the next header.
    ///
    /// Returns `RpcError::Shutdown` once the codec has been closed locally.
    pub async fn read_header(&mut self, header: &mut Header) -> Result<()> {
        let frame = self.next_frame().await?;
        *header = self.codec.decode(&frame)?;
        Ok(())
    }

    /// Reads the body frame and decodes it as `T`.
    pub async fn read_body<T: DeserializeOwned>(&mut self) -> Result<T> {
        let frame = self.next_frame().await?;
        self.codec.decode(&frame)
    }

    /// Reads the body frame without decoding it.
    ///
    /// An error here is a stream error; decoding the returned bytes can
    /// still fail separately without breaking the framing.
    pub async fn read_raw_body(&mut self) -> Result<Vec<u8>> {
        self.next_frame().await
    }

    /// Consumes the body frame and throws it away to keep the stream aligned.
    pub async fn discard_body(&mut self) -> Result<()> {
        self.next_frame().await.map(drop)
    }

    async fn next_frame(&mut self) -> Result<Vec<u8>> {
        let Self { inner, closed, .. } = self;

        if *closed.borrow() {
            return Err(RpcError::Shutdown);
        }

        tokio::select! {
            biased;
            _ = wait_closed(closed) => Err(RpcError::Shutdown),
            frame = read_frame(inner) => frame,
        }
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    if closed.wait_for(|c| *c).await.is_err() {
        // Every sender is gone; nobody can close us anymore.
        std::future::pending::<()>().await;
    }
}

/// Write half of a [`Codec`].
///
/// Callers serialize access (the client's and server's write locks), so a
/// header and its body are never interleaved with another frame pair.
pub struct CodecWriter {
    inner: BufWriter<WriteHalf<BoxedConnection>>,
    codec: BodyCodec,
    closed: Arc<watch::Sender<bool>>,
}

impl CodecWriter {
    pub fn body_codec(&self) -> BodyCodec {
        self.codec
    }

    /// Handle that closes this codec without holding the write lock.
    pub fn closer(&self) -> CodecCloser {
        CodecCloser {
            closed: self.closed.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Writes a header and its body as one flushed unit.
    ///
    /// The buffer is flushed before returning unless the codec is closed
    /// mid-write. If anything fails after the header went into the buffer,
    /// the connection is closed: a half-written frame pair cannot be
    /// recovered by the peer. A write stuck on a peer that stops reading
    /// gives up with `RpcError::Shutdown` as soon as the codec is closed.
    pub async fn write(&mut self, header: &Header, body: &dyn Body) -> Result<()> {
        if self.is_closed() {
            return Err(RpcError::Shutdown);
        }

        let mut closed = self.closed.subscribe();
        let result = tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => Err(RpcError::Shutdown),
            result = self.write_and_flush(header, body) => result,
        };

        if let Err(e) = &result {
            if !matches!(e, RpcError::Shutdown) {
                tracing::warn!("rpc codec: write failed for seq {}: {}", header.seq, e);
            }
            self.close().await;
        }
        result
    }

    async fn write_and_flush(&mut self, header: &Header, body: &dyn Body) -> Result<()> {
        let written = self.write_pair(header, body).await;
        let flushed = self.inner.flush().await.map_err(RpcError::from);
        written.and(flushed)
    }

    async fn write_pair(&mut self, header: &Header, body: &dyn Body) -> Result<()> {
        let head = self.codec.encode(header).map_err(|e| {
            tracing::warn!("rpc codec: error encoding header: {}", e);
            e
        })?;
        write_frame(&mut self.inner, &head).await?;

        let payload = body.encode_with(&self.codec).map_err(|e| {
            tracing::warn!("rpc codec: error encoding body: {}", e);
            e
        })?;
        write_frame(&mut self.inner, &payload).await
    }

    /// Closes the codec: stops the reader and shuts down the write side.
    ///
    /// Whatever is still buffered belongs to an abandoned frame and is
    /// dropped, so this never waits on a peer that stopped reading.
    pub async fn close(&mut self) {
        self.closed.send_replace(true);
        if let Err(e) = self.inner.get_mut().shutdown().await {
            tracing::debug!("rpc codec: shutdown after close: {}", e);
        }
    }
}

/// Cloneable close handle for a [`Codec`].
#[derive(Clone)]
pub struct CodecCloser {
    closed: Arc<watch::Sender<bool>>,
}

impl CodecCloser {
    /// Signals close. Returns `false` if the codec was already closed.
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}
