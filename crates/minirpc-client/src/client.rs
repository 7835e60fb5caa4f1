use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use minirpc_common::protocol::error::{Result, RpcError};
use minirpc_common::protocol::{Header, Options, Seq};
use minirpc_common::transport::{
    write_options, Body, BodyCodec, Codec, CodecCloser, CodecReader, CodecWriter, Connection,
};

use crate::call::{Call, CallSlot, Completion, Outcome, PendingCall, DEFAULT_DONE_CAPACITY};

/// minirpc client: many concurrent calls over one connection.
///
/// Calls are matched to responses by sequence number, so the server may
/// answer in any order. One background task per client reads responses.
///
/// Dropping the client closes it; share it behind an `Arc` to use it from
/// several tasks.
///
/// # Example
///
/// ```no_run
/// use minirpc_client::dial;
///
/// # async fn run() -> minirpc_common::Result<()> {
/// let client = dial("tcp", "127.0.0.1:9999", None).await?;
/// let sum: i64 = client.call("Foo.Sum", &(2, 3)).await?;
/// assert_eq!(sum, 5);
/// client.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    options: Options,
    /// Write-serialization lock; held for a whole header+body write.
    sending: tokio::sync::Mutex<Outbound>,
    /// Bookkeeping lock; never held across an await.
    state: Mutex<ClientState>,
    closer: CodecCloser,
}

struct Outbound {
    writer: CodecWriter,
    /// Reused for every request, reset before each write.
    header: Header,
}

struct ClientState {
    seq: Seq,
    pending: HashMap<Seq, Box<dyn Completion>>,
    /// Set by `close`.
    closing: bool,
    /// Set when the receive loop stopped.
    shutdown: bool,
}

impl Client {
    /// Performs the client half of the handshake on `conn` and starts the
    /// receive loop.
    ///
    /// On failure the connection is shut down and dropped.
    pub async fn new<C: Connection>(mut conn: C, options: Options) -> Result<Self> {
        let body = match BodyCodec::for_type(&options.codec_type) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("rpc client: codec error: {}", e);
                let _ = conn.shutdown().await;
                return Err(e);
            }
        };

        if let Err(e) = write_options(&mut conn, &options).await {
            tracing::warn!("rpc client: options error: {}", e);
            let _ = conn.shutdown().await;
            return Err(e);
        }

        Ok(Self::with_codec(Codec::with_body_codec(conn, body), options))
    }

    fn with_codec(codec: Codec, options: Options) -> Self {
        let (reader, writer) = codec.split();
        let closer = writer.closer();

        let inner = Arc::new(ClientInner {
            options,
            sending: tokio::sync::Mutex::new(Outbound {
                writer,
                header: Header::default(),
            }),
            state: Mutex::new(ClientState {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
            closer,
        });

        tokio::spawn(receive(inner.clone(), reader));
        Client { inner }
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// True while the client is neither closing nor shut down.
    pub fn is_available(&self) -> bool {
        !self.inner.is_stopping()
    }

    /// Closes the connection.
    ///
    /// Pending calls complete with `RpcError::Shutdown`. A second close
    /// returns `RpcError::Shutdown`.
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.inner.state();
            if state.closing {
                return Err(RpcError::Shutdown);
            }
            state.closing = true;
        }
        self.inner.closer.close();
        Ok(())
    }

    /// Starts a call and returns once the request is written (or failed).
    ///
    /// After `close` or a lost connection this returns at once with seq 0
    /// and a call that already failed with `RpcError::Shutdown`.
    ///
    /// The completion is delivered on `done`, or on a fresh channel of
    /// capacity 10 reachable through the returned [`PendingCall`] when `done`
    /// is `None`. A supplied channel needs room for the completion when it
    /// arrives; otherwise the completion is dropped.
    pub async fn go<A, R>(
        &self,
        service_method: &str,
        args: &A,
        done: Option<mpsc::Sender<Call<R>>>,
    ) -> PendingCall<R>
    where
        A: Serialize + Send + Sync,
        R: DeserializeOwned + Send + 'static,
    {
        let (done, receiver) = match done {
            Some(done) => (done, None),
            None => {
                let (tx, rx) = mpsc::channel(DEFAULT_DONE_CAPACITY);
                (tx, Some(rx))
            }
        };

        let slot = CallSlot {
            service_method: service_method.to_string(),
            done,
        };
        let seq = self.inner.send(service_method, args, Box::new(slot)).await;

        PendingCall::new(seq, service_method, receiver)
    }

    /// Calls `service_method` and waits for the reply.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + Send + Sync,
        R: DeserializeOwned + Send + 'static,
    {
        self.call_until(service_method, args, std::future::pending::<()>(), "")
            .await
    }

    /// Like [`call`](Self::call), but gives up when `cancel` resolves.
    ///
    /// A canceled call is removed from the pending table before returning
    /// `RpcError::Canceled`; its response, if one still arrives, is dropped.
    pub async fn call_with_cancel<A, R, F>(&self, service_method: &str, args: &A, cancel: F) -> Result<R>
    where
        A: Serialize + Send + Sync,
        R: DeserializeOwned + Send + 'static,
        F: Future<Output = ()>,
    {
        self.call_until(service_method, args, cancel, "canceled by caller")
            .await
    }

    /// Like [`call`](Self::call), but gives up after `timeout`.
    pub async fn call_timeout<A, R>(&self, service_method: &str, args: &A, timeout: Duration) -> Result<R>
    where
        A: Serialize + Send + Sync,
        R: DeserializeOwned + Send + 'static,
    {
        let reason = format!("deadline of {:?} exceeded", timeout);
        self.call_until(service_method, args, tokio::time::sleep(timeout), &reason)
            .await
    }

    async fn call_until<A, R, F>(&self, service_method: &str, args: &A, cancel: F, reason: &str) -> Result<R>
    where
        A: Serialize + Send + Sync,
        R: DeserializeOwned + Send + 'static,
        F: Future<Output = ()>,
    {
        let mut cancel = std::pin::pin!(cancel);
        let canceled = || RpcError::Canceled(format!("{}: {}", service_method, reason));

        // The send itself may stall on a peer that stopped reading.
        let mut pending = tokio::select! {
            pending = self.go(service_method, args, None) => pending,
            _ = &mut cancel => return Err(canceled()),
        };
        let seq = pending.seq();

        tokio::select! {
            call = pending.done() => match call {
                Some(call) => call.result,
                None => Err(RpcError::Shutdown),
            },
            _ = &mut cancel => {
                self.inner.remove_call(seq);
                Err(canceled())
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl ClientInner {
    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assigns the next sequence number and parks the call in the pending table.
    fn register(&self, call: Box<dyn Completion>) -> std::result::Result<Seq, (Box<dyn Completion>, RpcError)> {
        let mut state = self.state();
        if state.closing || state.shutdown {
            return Err((call, RpcError::Shutdown));
        }

        let seq = state.seq;
        state.seq += 1;
        state.pending.insert(seq, call);
        Ok(seq)
    }

    fn remove_call(&self, seq: Seq) -> Option<Box<dyn Completion>> {
        self.state().pending.remove(&seq)
    }

    fn is_stopping(&self) -> bool {
        let state = self.state();
        state.closing || state.shutdown
    }

    async fn send(&self, service_method: &str, args: &dyn Body, call: Box<dyn Completion>) -> Seq {
        // Fail fast instead of queueing behind a write that close is tearing down.
        if self.is_stopping() {
            call.complete(0, Outcome::Failed(RpcError::Shutdown));
            return 0;
        }

        let mut sending = self.sending.lock().await;

        let seq = match self.register(call) {
            Ok(seq) => seq,
            Err((call, e)) => {
                call.complete(0, Outcome::Failed(e));
                return 0;
            }
        };

        let Outbound { writer, header } = &mut *sending;
        header.reset(service_method, seq);

        let mut guard = InFlight {
            inner: self,
            service_method,
            seq,
            armed: true,
        };
        let written = writer.write(header, args).await;
        guard.armed = false;

        if let Err(e) = written {
            // Gone already if a response or the shutdown beat us to it.
            if let Some(call) = self.remove_call(seq) {
                call.complete(seq, Outcome::Failed(e));
            }
        }
        seq
    }

    /// Fails every pending call with the loop's terminal error.
    async fn terminate(&self, err: RpcError) {
        let mut sending = self.sending.lock().await;

        let (pending, clean) = {
            let mut state = self.state();
            state.shutdown = true;
            let clean = state.closing || err.is_eof() || matches!(err, RpcError::Shutdown);
            (std::mem::take(&mut state.pending), clean)
        };

        if !clean {
            tracing::debug!("rpc client: connection lost: {}", err);
        }
        let reason = err.to_string();
        for (seq, call) in pending {
            let e = if clean {
                RpcError::Shutdown
            } else {
                RpcError::Connection(reason.clone())
            };
            call.complete(seq, Outcome::Failed(e));
        }

        sending.writer.close().await;
    }
}

/// A request write that has started but not finished.
///
/// Dropping the send future mid-write leaves a partial frame on the wire,
/// so the connection is closed and the call is taken back.
struct InFlight<'a> {
    inner: &'a ClientInner,
    service_method: &'a str,
    seq: Seq,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        tracing::debug!("rpc client: request {} abandoned mid-write, closing connection", self.seq);
        if let Some(call) = self.inner.remove_call(self.seq) {
            let e = RpcError::Canceled(format!("{}: abandoned while sending", self.service_method));
            call.complete(self.seq, Outcome::Failed(e));
        }
        self.inner.closer.close();
    }
}

/// Receive loop: one per client, runs until the stream ends or the client closes.
async fn receive(inner: Arc<ClientInner>, mut reader: CodecReader) {
    let mut header = Header::default();

    let err = loop {
        if let Err(e) = reader.read_header(&mut header).await {
            break e;
        }

        let call = inner.remove_call(header.seq);
        let drained = match call {
            None => reader.discard_body().await,
            Some(call) if !header.is_ok() => {
                let drained = reader.discard_body().await;
                let error = std::mem::take(&mut header.error);
                call.complete(header.seq, Outcome::Failed(RpcError::Server(error)));
                drained
            }
            Some(call) => match reader.read_raw_body().await {
                Ok(body) => {
                    call.complete(header.seq, Outcome::Reply(reader.body_codec(), body));
                    Ok(())
                }
                Err(e) => {
                    let failed = RpcError::Connection(format!("reading body {}", e));
                    call.complete(header.seq, Outcome::Failed(failed));
                    Err(e)
                }
            },
        };

        if let Err(e) = drained {
            break e;
        }
    };

    inner.terminate(err).await;
}
