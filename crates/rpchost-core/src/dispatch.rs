//! Request dispatch.
//!
//! Turns the bytes of one request into a method invocation:
//!
//! ```text
//! RECEIVED -> HEADER_PARSED -> METHOD_RESOLVED -> ARGS_PARSED -> INVOKED -> COMPLETED
//!     \______________\_______________\________________\___________\-> FAILED
//! ```
//!
//! Every failure up to `ARGS_PARSED` is logged once here and produces no
//! response. After invocation the outcome is carried by the completion.

use crate::method::{Completion, MethodDescriptor, Reply, RpcMessage};
use crate::protocol::codec;
use crate::registry::ServiceRegistry;
use crate::{Result, RpcError};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Where a request is in the dispatch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Received,
    HeaderParsed,
    MethodResolved,
    ArgsParsed,
    Invoked,
    Completed,
    Failed,
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchStage::Received => "RECEIVED",
            DispatchStage::HeaderParsed => "HEADER_PARSED",
            DispatchStage::MethodResolved => "METHOD_RESOLVED",
            DispatchStage::ArgsParsed => "ARGS_PARSED",
            DispatchStage::Invoked => "INVOKED",
            DispatchStage::Completed => "COMPLETED",
            DispatchStage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A request that failed before its method was invoked.
#[derive(Debug)]
pub struct DispatchFailure {
    /// Last stage reached before failing.
    pub stage: DispatchStage,
    pub error: RpcError,
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request failed after {}: {}", self.stage, self.error)
    }
}

impl std::error::Error for DispatchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Resolves requests against a read-only registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Decode `buf`, resolve the method and parse its arguments.
    ///
    /// Failures are logged here; the caller must not respond to them.
    pub fn prepare(&self, peer: SocketAddr, buf: &[u8]) -> std::result::Result<PendingCall, DispatchFailure> {
        let mut stage = DispatchStage::Received;
        self.try_prepare(peer, buf, &mut stage).map_err(|error| {
            match &error {
                RpcError::ServiceNotFound { service } => {
                    error!("{} is not registered (from {})", service, peer)
                }
                RpcError::MethodNotFound { service, method } => {
                    error!("{}.{} is not registered (from {})", service, method, peer)
                }
                other => error!("dropping request from {} at {}: {}", peer, stage, other),
            }
            DispatchFailure { stage, error }
        })
    }

    fn try_prepare(&self, peer: SocketAddr, buf: &[u8], stage: &mut DispatchStage) -> Result<PendingCall> {
        let frame = codec::decode(buf)?;
        *stage = DispatchStage::HeaderParsed;

        debug!(
            "request from {}: {}.{} ({} arg bytes, {} trailing)",
            peer,
            frame.service_name(),
            frame.method_name(),
            frame.args.len(),
            frame.trailing
        );

        let entry = self.registry.resolve(frame.service_name())?;
        let method = entry.resolve_method(frame.method_name())?.clone();
        *stage = DispatchStage::MethodResolved;

        let mut argument = method.new_argument();
        argument
            .merge_bytes(frame.args)
            .map_err(|source| RpcError::ArgumentParse {
                service: entry.name().to_string(),
                method: method.name().to_string(),
                source,
            })?;
        *stage = DispatchStage::ArgsParsed;

        Ok(PendingCall {
            peer,
            service: entry.name().to_string(),
            result: method.new_result(),
            method,
            argument,
        })
    }
}

/// A fully prepared request, owned by the worker that received it.
#[derive(Debug)]
pub struct PendingCall {
    peer: SocketAddr,
    service: String,
    method: MethodDescriptor,
    argument: Box<dyn RpcMessage>,
    result: Box<dyn RpcMessage>,
}

impl PendingCall {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        self.method.name()
    }

    /// Invoke the method. The returned handle resolves once the method
    /// completes (or drops) its continuation.
    pub fn invoke(self) -> PendingReply {
        let label = format!("{}.{}", self.service, self.method.name());
        let (completion, rx) = Completion::channel(label.as_str());
        self.method.invoke(self.argument, self.result, completion);

        PendingReply {
            rx,
            service: self.service,
            method: self.method.name().to_string(),
        }
    }
}

/// The response side of an invoked call.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Reply>,
    service: String,
    method: String,
}

impl PendingReply {
    /// Wait for the completion.
    ///
    /// Returns the serialized result, the serialization error, or
    /// `CompletionDropped` if the method never answered.
    pub async fn wait(self) -> Reply {
        match self.rx.await {
            Ok(reply) => reply,
            Err(_) => Err(RpcError::CompletionDropped {
                service: self.service,
                method: self.method,
            }),
        }
    }
}
