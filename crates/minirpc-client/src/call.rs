//! Outstanding calls and their completion.

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use minirpc_common::protocol::error::{Result, RpcError};
use minirpc_common::protocol::Seq;
use minirpc_common::transport::BodyCodec;

/// Capacity of the completion channel `go` allocates when given none.
pub const DEFAULT_DONE_CAPACITY: usize = 10;

/// A finished call, delivered once on its completion channel.
#[derive(Debug)]
pub struct Call<R> {
    /// Sequence number; `0` if the call never got registered.
    pub seq: Seq,
    pub service_method: String,
    pub result: Result<R>,
}

/// Handle returned by [`Client::go`](crate::Client::go).
pub struct PendingCall<R> {
    seq: Seq,
    service_method: String,
    done: Option<mpsc::Receiver<Call<R>>>,
}

impl<R> PendingCall<R> {
    pub(crate) fn new(seq: Seq, service_method: &str, done: Option<mpsc::Receiver<Call<R>>>) -> Self {
        Self {
            seq,
            service_method: service_method.to_string(),
            done,
        }
    }

    /// Sequence number assigned to the call, `0` if it was rejected before
    /// reaching the wire.
    pub fn seq(&self) -> Seq {
        self.seq
    }

    pub fn service_method(&self) -> &str {
        &self.service_method
    }

    /// Waits for the completion.
    ///
    /// Returns `None` if the call was started with a caller-supplied channel;
    /// the completion goes there instead.
    pub async fn done(&mut self) -> Option<Call<R>> {
        self.done.as_mut()?.recv().await
    }

    pub fn into_receiver(self) -> Option<mpsc::Receiver<Call<R>>> {
        self.done
    }
}

/// How a registered call ended.
pub(crate) enum Outcome {
    /// Raw reply body, decoded by the call into its own reply type.
    Reply(BodyCodec, Vec<u8>),
    Failed(RpcError),
}

/// Type-erased entry of the pending table.
pub(crate) trait Completion: Send {
    fn complete(self: Box<Self>, seq: Seq, outcome: Outcome);
}

pub(crate) struct CallSlot<R> {
    pub(crate) service_method: String,
    pub(crate) done: mpsc::Sender<Call<R>>,
}

impl<R> Completion for CallSlot<R>
where
    R: DeserializeOwned + Send + 'static,
{
    fn complete(self: Box<Self>, seq: Seq, outcome: Outcome) {
        let result = match outcome {
            Outcome::Reply(codec, body) => codec
                .decode(&body)
                .map_err(|e| RpcError::Decode(format!("reading body {}", e))),
            Outcome::Failed(e) => Err(e),
        };

        let call = Call {
            seq,
            service_method: self.service_method,
            result,
        };
        if self.done.try_send(call).is_err() {
            tracing::debug!(
                "rpc client: discarding Call reply for seq {} due to insufficient done channel capacity",
                seq
            );
        }
    }
}
