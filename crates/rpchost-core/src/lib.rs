//! rpchost core - publish service objects over a length-prefixed TCP protocol.
//!
//! A process registers named services, each exposing a set of methods that
//! take one protobuf message and answer with another. The provider accepts
//! TCP connections, decodes one request frame per connection, invokes the
//! addressed method and writes its serialized result before closing the
//! connection.
//!
//! # Example
//!
//! ```rust,ignore
//! use rpchost_core::{MethodDescriptor, ProviderConfig, RpcProvider, Service, ServiceRegistry};
//! use std::sync::Arc;
//!
//! struct EchoService;
//!
//! impl Service for EchoService {
//!     fn name(&self) -> &str {
//!         "Echo"
//!     }
//!
//!     fn methods(self: Arc<Self>) -> Vec<MethodDescriptor> {
//!         vec![MethodDescriptor::new("Ping", |_: PingRequest, mut resp: PingResponse, done| {
//!             resp.pong = true;
//!             done.complete(resp);
//!         })]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> rpchost_core::Result<()> {
//!     let mut registry = ServiceRegistry::new();
//!     registry.register(Arc::new(EchoService))?;
//!
//!     let config = ProviderConfig::load("provider.conf")?;
//!     RpcProvider::new(config, registry).run().await
//! }
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod method;
pub mod pool;
pub mod protocol;
pub mod registry;
pub mod server;

// Re-export commonly used types
pub use client::RpcChannel;
pub use crate::config::{ConfigSource, FileConfig, ProviderConfig};
pub use dispatch::{DispatchFailure, DispatchStage, Dispatcher, PendingCall};
pub use error::{Result, RpcError};
pub use method::{Completion, Done, MethodDescriptor, RpcMessage};
pub use pool::TaskPool;
pub use protocol::{Frame, RpcHeader};
pub use registry::{Service, ServiceEntry, ServiceRegistry};
pub use server::{ProviderHandle, RpcProvider};
