//! Service registry entries.
//!
//! A [`Service`] binds method names to typed async handlers over a shared
//! receiver. Handlers are type-erased at registration time into
//! [`MethodType`]s, which the dispatch engine drives by name: decode an
//! argument from a body frame, then invoke.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use minirpc_common::protocol::error::{Result, RpcError};
use minirpc_common::transport::{Body, BodyCodec};

/// Outcome of one invocation: the reply, or the error string for the header.
pub type Reply = std::result::Result<Box<dyn Body>, String>;

type Decoder = dyn Fn(&BodyCodec, &[u8]) -> Result<Argument> + Send + Sync;
type Invoker = dyn Fn(Argument) -> BoxFuture<'static, Reply> + Send + Sync;

/// A decoded call argument, typed for the method that produced it.
pub struct Argument(Box<dyn Any + Send>);

/// One invocable method.
pub struct MethodType {
    name: String,
    num_calls: AtomicU64,
    decode: Box<Decoder>,
    invoke: Box<Invoker>,
}

impl MethodType {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of invocations started so far.
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::Relaxed)
    }

    /// Decodes a body frame into a freshly allocated argument of this
    /// method's argument type.
    pub fn decode_argument(&self, codec: &BodyCodec, body: &[u8]) -> Result<Argument> {
        (self.decode)(codec, body)
    }

    /// Starts the handler. The returned future owns everything it needs and
    /// can be spawned.
    pub fn invoke(&self, argument: Argument) -> BoxFuture<'static, Reply> {
        self.num_calls.fetch_add(1, Ordering::Relaxed);
        (self.invoke)(argument)
    }
}

impl std::fmt::Debug for MethodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodType")
            .field("name", &self.name)
            .field("num_calls", &self.num_calls())
            .finish()
    }
}

/// A named group of methods sharing one receiver.
///
/// # Example
///
/// ```
/// use minirpc_server::Service;
/// use serde::Deserialize;
///
/// struct Foo;
///
/// #[derive(Deserialize)]
/// struct Args { num1: i64, num2: i64 }
///
/// let service = Service::builder("Foo", Foo)
///     .method("Sum", |_foo, args: Args| async move {
///         Ok::<_, String>(args.num1 + args.num2)
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(service.name(), "Foo");
/// assert!(service.method("Sum").is_some());
/// ```
#[derive(Debug)]
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<MethodType>>,
}

impl Service {
    pub fn builder<S>(name: impl Into<String>, receiver: S) -> ServiceBuilder<S>
    where
        S: Send + Sync + 'static,
    {
        ServiceBuilder {
            name: name.into(),
            receiver: Arc::new(receiver),
            methods: HashMap::new(),
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<Arc<MethodType>> {
        self.methods.get(name).cloned()
    }

    /// Methods sorted by name.
    pub fn methods(&self) -> Vec<Arc<MethodType>> {
        let mut methods: Vec<_> = self.methods.values().cloned().collect();
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        methods
    }
}

/// Builder returned by [`Service::builder`].
pub struct ServiceBuilder<S> {
    name: String,
    receiver: Arc<S>,
    methods: HashMap<String, Arc<MethodType>>,
    error: Option<RpcError>,
}

impl<S> ServiceBuilder<S>
where
    S: Send + Sync + 'static,
{
    /// Registers `handler` under `name`.
    ///
    /// The handler receives the shared receiver and the decoded argument and
    /// resolves to the reply or to an error whose `Display` text is sent
    /// back in the response header.
    pub fn method<A, R, E, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + Sync + 'static,
        E: Display + 'static,
        F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        if self.error.is_some() {
            return self;
        }
        if !is_exported(name) {
            self.error = Some(RpcError::InvalidService(format!("{}.{}", self.name, name)));
            return self;
        }
        if self.methods.contains_key(name) {
            self.error = Some(RpcError::DuplicateService(format!("{}.{}", self.name, name)));
            return self;
        }

        let receiver = self.receiver.clone();
        let method_name = name.to_string();

        let decode: Box<Decoder> = Box::new(|codec: &BodyCodec, body: &[u8]| {
            let argument: A = codec.decode(body)?;
            Ok(Argument(Box::new(argument)))
        });

        let invoke: Box<Invoker> = Box::new(move |argument| {
            let argument = match argument.0.downcast::<A>() {
                Ok(argument) => *argument,
                Err(_) => {
                    let msg = format!("rpc server: argument type mismatch for {}", method_name);
                    return futures_util::future::ready(Err(msg)).boxed();
                }
            };

            let call = handler(receiver.clone(), argument);
            async move {
                match call.await {
                    Ok(reply) => Ok(Box::new(reply) as Box<dyn Body>),
                    Err(e) => Err(e.to_string()),
                }
            }
            .boxed()
        });

        self.methods.insert(
            name.to_string(),
            Arc::new(MethodType {
                name: name.to_string(),
                num_calls: AtomicU64::new(0),
                decode,
                invoke,
            }),
        );
        self
    }

    pub fn build(self) -> Result<Service> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if !is_exported(&self.name) {
            return Err(RpcError::InvalidService(self.name));
        }

        Ok(Service {
            name: self.name,
            methods: self.methods,
        })
    }
}

/// Names visible to remote callers start with an ASCII uppercase letter.
fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use minirpc_common::transport::JsonCodec;
    use serde::Deserialize;

    struct Foo {
        offset: i64,
    }

    #[derive(Deserialize)]
    struct Args {
        num1: i64,
        num2: i64,
    }

    fn foo_service() -> Service {
        Service::builder("Foo", Foo { offset: 0 })
            .method("Sum", |foo: Arc<Foo>, args: Args| async move {
                Ok::<_, String>(args.num1 + args.num2 + foo.offset)
            })
            .method("Fail", |_foo, _args: ()| async move {
                Err::<(), _>("always fails")
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_decode_and_invoke() {
        let service = foo_service();
        let sum = service.method("Sum").unwrap();
        let codec = BodyCodec::Json(JsonCodec);

        let argument = sum.decode_argument(&codec, br#"{"num1":2,"num2":3}"#).unwrap();
        let reply = sum.invoke(argument).await.unwrap();

        assert_eq!(reply.encode_with(&codec).unwrap(), b"5");
        assert_eq!(sum.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_string() {
        let service = foo_service();
        let fail = service.method("Fail").unwrap();
        let codec = BodyCodec::Json(JsonCodec);

        let argument = fail.decode_argument(&codec, b"null").unwrap();
        let err = fail.invoke(argument).await.err().unwrap();
        assert_eq!(err, "always fails");
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let service = foo_service();
        let sum = service.method("Sum").unwrap();

        let result = sum.decode_argument(&BodyCodec::Json(JsonCodec), br#""text""#);
        assert!(result.is_err());
        assert_eq!(sum.num_calls(), 0);
    }

    #[test]
    fn test_unexported_names_rejected() {
        let err = Service::builder("foo", Foo { offset: 0 }).build().unwrap_err();
        assert!(matches!(err, RpcError::InvalidService(name) if name == "foo"));

        let err = Service::builder("Foo", Foo { offset: 0 })
            .method("sum", |_foo, _args: ()| async move { Ok::<_, String>(()) })
            .build()
            .unwrap_err();
        assert!(matches!(err, RpcError::InvalidService(name) if name == "Foo.sum"));
    }

    #[test]
    fn test_duplicate_method_rejected() {
        let err = Service::builder("Foo", Foo { offset: 0 })
            .method("Sum", |_foo, _args: ()| async move { Ok::<_, String>(1) })
            .method("Sum", |_foo, _args: ()| async move { Ok::<_, String>(2) })
            .build()
            .unwrap_err();
        assert!(matches!(err, RpcError::DuplicateService(_)));
    }

    #[test]
    fn test_methods_sorted() {
        let names: Vec<_> = foo_service()
            .methods()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names, ["Fail", "Sum"]);
    }
}
