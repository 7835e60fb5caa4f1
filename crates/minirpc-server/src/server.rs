//! Server dispatch engine.
//!
//! One task per connection reads requests in order; each parsed request is
//! handed to its own task, and the replies go back through a per-connection
//! write lock so frames never interleave.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use minirpc_common::protocol::error::{Result, RpcError};
use minirpc_common::protocol::{split_service_method, Header, Options};
use minirpc_common::transport::{read_options, Body, Codec, CodecReader, CodecWriter, Connection};
use minirpc_metrics::{MetricsCollector, ServerMetricsCollector};

use crate::service::{Argument, MethodType, Service};

type SharedWriter = Arc<Mutex<CodecWriter>>;

/// Source of incoming connections for [`Server::accept`].
pub trait Listener: Send + 'static {
    type Io: Connection;

    /// Accepts the next connection, returning it with a printable peer address.
    fn accept(&self) -> impl Future<Output = io::Result<(Self::Io, String)>> + Send;
}

impl Listener for TcpListener {
    type Io = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, String)> {
        let (stream, peer) = TcpListener::accept(self).await?;
        Ok((stream, peer.to_string()))
    }
}

#[cfg(unix)]
impl Listener for tokio::net::UnixListener {
    type Io = tokio::net::UnixStream;

    async fn accept(&self) -> io::Result<(tokio::net::UnixStream, String)> {
        let (stream, peer) = tokio::net::UnixListener::accept(self).await?;
        let peer = peer
            .as_pathname()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "unix:unnamed".to_string());
        Ok((stream, peer))
    }
}

/// RPC server: a service registry plus the per-connection engine.
///
/// # Example
///
/// ```no_run
/// use minirpc_server::{Server, Service};
/// use std::sync::Arc;
///
/// struct Foo;
///
/// # async fn run() -> minirpc_common::Result<()> {
/// let server = Arc::new(Server::new());
/// server.register(
///     Service::builder("Foo", Foo)
///         .method("Sum", |_foo, (a, b): (i64, i64)| async move { Ok::<_, String>(a + b) })
///         .build()?,
/// )?;
///
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
/// server.accept(listener).await
/// # }
/// ```
pub struct Server {
    services: RwLock<HashMap<String, Arc<Service>>>,
    metrics: Arc<dyn MetricsCollector>,
}

/// A fully read request, ready to be dispatched.
struct Request {
    header: Header,
    argument: Argument,
    method: Arc<MethodType>,
}

/// Why reading a request failed.
enum ReadError {
    /// The stream is unusable; stop reading.
    Fatal(RpcError),
    /// Only this request is bad; answer it with the error and continue.
    Invalid(Header, RpcError),
}

impl Server {
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(ServerMetricsCollector::new()))
    }

    pub fn with_metrics(metrics: Arc<dyn MetricsCollector>) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsCollector> {
        &self.metrics
    }

    /// Publishes a service. Fails if a service with the same name exists.
    pub fn register(&self, service: Service) -> Result<()> {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        if services.contains_key(service.name()) {
            return Err(RpcError::DuplicateService(service.name().to_string()));
        }

        for method in service.methods() {
            tracing::info!("rpc server: register {}.{}", service.name(), method.name());
        }
        services.insert(service.name().to_string(), Arc::new(service));
        Ok(())
    }

    /// Registered services sorted by name.
    pub fn services(&self) -> Vec<Arc<Service>> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<_> = services.values().cloned().collect();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }

    /// Resolves `"Service.Method"`, splitting at the last dot.
    pub fn find_method(&self, service_method: &str) -> Result<Arc<MethodType>> {
        let (service_name, method_name) = split_service_method(service_method)
            .ok_or_else(|| RpcError::IllFormedMethod(service_method.to_string()))?;

        let service = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service_name)
            .cloned()
            .ok_or_else(|| RpcError::ServiceNotFound(service_name.to_string()))?;

        service
            .method(method_name)
            .ok_or_else(|| RpcError::MethodNotFound(method_name.to_string()))
    }

    /// Accepts connections until the listener fails, serving each on its own task.
    pub async fn accept<L: Listener>(self: &Arc<Self>, listener: L) -> Result<()> {
        loop {
            let (conn, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("rpc server: accept error: {}", e);
                    return Err(e.into());
                }
            };

            tracing::debug!("rpc server: connection from {}", peer);
            let server = self.clone();
            tokio::spawn(async move { server.serve_conn(conn).await });
        }
    }

    /// Serves one connection: handshake, then requests until the stream ends.
    ///
    /// A connection that fails the handshake is dropped without a reply.
    pub async fn serve_conn<C: Connection>(self: Arc<Self>, mut conn: C) {
        let (options, body_codec) = match read_options(&mut conn).await {
            Ok(negotiated) => negotiated,
            Err(e) => {
                tracing::warn!("rpc server: options error: {}", e);
                return;
            }
        };

        self.metrics.connection_opened();
        let (reader, writer) = Codec::with_body_codec(conn, body_codec).split();
        self.serve_codec(reader, writer, &options).await;
        self.metrics.connection_closed();
    }

    async fn serve_codec(self: &Arc<Self>, mut reader: CodecReader, writer: CodecWriter, options: &Options) {
        let writer: SharedWriter = Arc::new(Mutex::new(writer));
        let handle_timeout = options.effective_handle_timeout();
        let mut requests = JoinSet::new();

        loop {
            let request = match self.read_request(&mut reader).await {
                Ok(request) => request,
                Err(ReadError::Invalid(mut header, e)) => {
                    header.error = e.to_string();
                    send_response(&writer, &header, &()).await;
                    continue;
                }
                Err(ReadError::Fatal(e)) => {
                    if !e.is_eof() && !matches!(e, RpcError::Shutdown) {
                        tracing::warn!("rpc server: read request error: {}", e);
                    }
                    break;
                }
            };

            requests.spawn(handle_request(
                self.clone(),
                request,
                writer.clone(),
                handle_timeout,
            ));

            while let Some(finished) = requests.try_join_next() {
                log_join(finished);
            }
        }

        while let Some(finished) = requests.join_next().await {
            log_join(finished);
        }
        writer.lock().await.close().await;
    }

    async fn read_request(&self, reader: &mut CodecReader) -> std::result::Result<Request, ReadError> {
        let mut header = Header::default();
        reader.read_header(&mut header).await.map_err(ReadError::Fatal)?;

        let method = match self.find_method(&header.service_method) {
            Ok(method) => method,
            Err(e) => {
                reader.discard_body().await.map_err(ReadError::Fatal)?;
                return Err(ReadError::Invalid(header, e));
            }
        };

        let body = reader.read_raw_body().await.map_err(ReadError::Fatal)?;
        match method.decode_argument(&reader.body_codec(), &body) {
            Ok(argument) => Ok(Request {
                header,
                argument,
                method,
            }),
            Err(e) => {
                let e = RpcError::Decode(format!("rpc server: read body err: {}", e));
                Err(ReadError::Invalid(header, e))
            }
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

async fn handle_request(
    server: Arc<Server>,
    request: Request,
    writer: SharedWriter,
    handle_timeout: Option<Duration>,
) {
    let Request {
        mut header,
        argument,
        method,
    } = request;
    let start = Instant::now();

    let mut invocation = tokio::spawn(method.invoke(argument));

    let joined = match handle_timeout {
        None => (&mut invocation).await,
        Some(limit) => match tokio::time::timeout(limit, &mut invocation).await {
            Ok(joined) => joined,
            Err(_) => {
                server.metrics.record_call(&header.service_method, start, false);
                header.error = RpcError::HandleTimeout(limit).to_string();
                send_response(&writer, &header, &()).await;

                // The reply was already sent; wait the handler out and drop its result.
                if let Err(e) = invocation.await {
                    tracing::warn!("rpc server: {} failed after timeout: {}", header.service_method, e);
                }
                return;
            }
        },
    };

    let reply = joined.unwrap_or_else(|e| Err(format!("rpc server: {} aborted: {}", header.service_method, e)));

    server
        .metrics
        .record_call(&header.service_method, start, reply.is_ok());

    match reply {
        Ok(body) => send_response(&writer, &header, body.as_ref()).await,
        Err(msg) => {
            header.error = msg;
            send_response(&writer, &header, &()).await;
        }
    }
}

async fn send_response(writer: &SharedWriter, header: &Header, body: &dyn Body) {
    let mut writer = writer.lock().await;
    if let Err(e) = writer.write(header, body).await {
        tracing::warn!("rpc server: write response error: {}", e);
    }
}

fn log_join(finished: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = finished {
        tracing::warn!("rpc server: request task failed: {}", e);
    }
}
