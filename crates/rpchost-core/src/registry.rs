//! Service registry.
//!
//! Maps service names to their method tables. The registry is filled before
//! the provider starts; `RpcProvider` takes it by value and only ever shares
//! it behind an `Arc`, so after startup it is read-only and lookups from
//! every worker run without locking.

use crate::method::MethodDescriptor;
use crate::{Result, RpcError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// A business-logic object that can be published through the provider.
///
/// # Example
///
/// ```rust,ignore
/// struct EchoService;
///
/// impl Service for EchoService {
///     fn name(&self) -> &str {
///         "Echo"
///     }
///
///     fn methods(self: Arc<Self>) -> Vec<MethodDescriptor> {
///         vec![MethodDescriptor::new("Ping", |_: PingRequest, mut resp: PingResponse, done| {
///             resp.pong = true;
///             done.complete(resp);
///         })]
///     }
/// }
/// ```
pub trait Service: Send + Sync + 'static {
    /// Name clients use to address this service.
    fn name(&self) -> &str;

    /// Every method this service exposes.
    fn methods(self: Arc<Self>) -> Vec<MethodDescriptor>;
}

/// A registered service instance and its method table.
pub struct ServiceEntry {
    name: String,
    methods: HashMap<String, MethodDescriptor>,
    instance: Arc<dyn Service>,
}

impl ServiceEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The service object backing this entry.
    pub fn instance(&self) -> &Arc<dyn Service> {
        &self.instance
    }

    /// Look up a method by name.
    pub fn resolve_method(&self, method_name: &str) -> Result<&MethodDescriptor> {
        self.methods
            .get(method_name)
            .ok_or_else(|| RpcError::MethodNotFound {
                service: self.name.clone(),
                method: method_name.to_string(),
            })
    }

    /// Method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEntry")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// Registry of published services.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, ServiceEntry>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a service.
    ///
    /// Fails with `DuplicateService` if a service of the same name is
    /// already registered and with `DuplicateMethod` if the service lists
    /// a method name twice. On failure the registry is left unchanged.
    pub fn register<S: Service>(&mut self, service: Arc<S>) -> Result<()> {
        let name = service.name().to_string();
        if self.services.contains_key(&name) {
            return Err(RpcError::DuplicateService { name });
        }

        info!("service_name: {}", name);

        let mut methods = HashMap::new();
        for method in service.clone().methods() {
            let method_name = method.name().to_string();
            if methods.contains_key(&method_name) {
                return Err(RpcError::DuplicateMethod {
                    service: name,
                    method: method_name,
                });
            }
            info!(
                "method_name: {} ({} -> {})",
                method_name,
                method.argument_type(),
                method.result_type()
            );
            methods.insert(method_name, method);
        }

        let instance: Arc<dyn Service> = service;
        self.services.insert(
            name.clone(),
            ServiceEntry {
                name,
                methods,
                instance,
            },
        );
        Ok(())
    }

    /// Look up a service by name.
    pub fn resolve(&self, service_name: &str) -> Result<&ServiceEntry> {
        self.services
            .get(service_name)
            .ok_or_else(|| RpcError::ServiceNotFound {
                service: service_name.to_string(),
            })
    }

    /// Look up a method of a service.
    pub fn resolve_method(&self, service_name: &str, method_name: &str) -> Result<&MethodDescriptor> {
        self.resolve(service_name)?.resolve_method(method_name)
    }

    /// Registered service names, sorted.
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
