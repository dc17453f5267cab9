//! The contract between the dispatcher and business-logic methods.
//!
//! The dispatcher never knows the concrete argument or result type of a
//! method. It works with three capabilities captured in a
//! [`MethodDescriptor`] when a service is registered:
//!
//! - build an empty argument container
//! - build an empty result container
//! - invoke the method with both containers and a [`Completion`]
//!
//! The completion is the only way a result reaches the network: calling it
//! serializes the result and hands the bytes to the connection that
//! received the request. It is consumed on use, so a method can answer at
//! most once; dropping it unanswered closes the connection without a reply.

use crate::protocol::codec;
use crate::{Result, RpcError};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// A message container the dispatcher can fill from and write to bytes.
///
/// Implemented for every prost message; other encodings can implement it by
/// hand.
pub trait RpcMessage: Any + Send + fmt::Debug {
    /// Merge serialized bytes into this container.
    fn merge_bytes(&mut self, buf: &[u8]) -> std::result::Result<(), prost::DecodeError>;

    /// Serialize this container.
    fn encode_bytes(&self) -> Result<Vec<u8>>;

    /// Type name used in diagnostics.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T> RpcMessage for T
where
    T: prost::Message + Default + 'static,
{
    fn merge_bytes(&mut self, buf: &[u8]) -> std::result::Result<(), prost::DecodeError> {
        prost::Message::merge(self, buf)
    }

    fn encode_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf).map_err(|e| RpcError::Serialize {
            message: format!("{}: {}", std::any::type_name::<T>(), e),
        })?;
        Ok(buf)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Outcome of a completed call: the serialized result, or why there is none.
pub type Reply = Result<Vec<u8>>;

/// Single-use continuation handed to a method invocation.
pub struct Completion {
    tx: oneshot::Sender<Reply>,
    label: Arc<str>,
}

impl Completion {
    /// Create a completion and the receiver the connection waits on.
    pub fn channel(label: impl Into<Arc<str>>) -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx,
                label: label.into(),
            },
            rx,
        )
    }

    /// Serialize `result` and deliver it to the waiting connection.
    pub fn complete(self, result: Box<dyn RpcMessage>) {
        let reply = codec::encode_result(&*result);
        if let Err(e) = &reply {
            error!("{}: failed to serialize result: {}", self.label, e);
        }
        if self.tx.send(reply).is_err() {
            debug!("{}: connection gone before completion", self.label);
        }
    }

    /// Name of the call this completion answers.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").field("label", &self.label).finish()
    }
}

/// Typed view of a [`Completion`] given to method handlers.
pub struct Done<R> {
    inner: Completion,
    _result: PhantomData<fn(R)>,
}

impl<R: RpcMessage> Done<R> {
    fn new(inner: Completion) -> Self {
        Self {
            inner,
            _result: PhantomData,
        }
    }

    /// Answer the call with the populated result.
    pub fn complete(self, result: R) {
        self.inner.complete(Box::new(result));
    }

    pub fn label(&self) -> &str {
        self.inner.label()
    }
}

impl<R> fmt::Debug for Done<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done").field("label", &self.inner.label).finish()
    }
}

type Factory = fn() -> Box<dyn RpcMessage>;

fn new_container<M: RpcMessage + Default>() -> Box<dyn RpcMessage> {
    Box::new(M::default())
}

type Invoker =
    dyn Fn(Box<dyn RpcMessage>, Box<dyn RpcMessage>, Completion) + Send + Sync + 'static;

/// Invocable handle for one method of one registered service instance.
///
/// Clones share the same handler.
#[derive(Clone)]
pub struct MethodDescriptor {
    name: Arc<str>,
    argument_type: &'static str,
    result_type: &'static str,
    new_argument: Factory,
    new_result: Factory,
    invoke: Arc<Invoker>,
}

impl MethodDescriptor {
    /// Describe a method taking `A` and answering with `R`.
    ///
    /// The handler receives the parsed argument, an empty result container
    /// and the continuation it must complete. Services usually capture an
    /// `Arc` of themselves in the handler.
    pub fn new<A, R, F>(name: impl Into<Arc<str>>, handler: F) -> Self
    where
        A: RpcMessage + Default,
        R: RpcMessage + Default,
        F: Fn(A, R, Done<R>) + Send + Sync + 'static,
    {
        let name = name.into();
        let method = name.clone();
        let invoke = move |argument: Box<dyn RpcMessage>,
                           result: Box<dyn RpcMessage>,
                           completion: Completion| {
            let argument = match argument.into_any().downcast::<A>() {
                Ok(argument) => *argument,
                Err(_) => {
                    error!("{}: argument container has the wrong type", method);
                    return;
                }
            };
            let result = match result.into_any().downcast::<R>() {
                Ok(result) => *result,
                Err(_) => {
                    error!("{}: result container has the wrong type", method);
                    return;
                }
            };
            handler(argument, result, Done::new(completion));
        };

        Self {
            name,
            argument_type: std::any::type_name::<A>(),
            result_type: std::any::type_name::<R>(),
            new_argument: new_container::<A>,
            new_result: new_container::<R>,
            invoke: Arc::new(invoke),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn argument_type(&self) -> &'static str {
        self.argument_type
    }

    pub fn result_type(&self) -> &'static str {
        self.result_type
    }

    /// Build an empty argument container.
    pub fn new_argument(&self) -> Box<dyn RpcMessage> {
        (self.new_argument)()
    }

    /// Build an empty result container.
    pub fn new_result(&self) -> Box<dyn RpcMessage> {
        (self.new_result)()
    }

    /// Run the method.
    pub fn invoke(
        &self,
        argument: Box<dyn RpcMessage>,
        result: Box<dyn RpcMessage>,
        completion: Completion,
    ) {
        (self.invoke)(argument, result, completion)
    }

    /// Check whether two descriptors share the same handler.
    pub fn same_handler(&self, other: &MethodDescriptor) -> bool {
        Arc::ptr_eq(&self.invoke, &other.invoke)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("argument_type", &self.argument_type)
            .field("result_type", &self.result_type)
            .finish()
    }
}
