//! Services published by the provider binary.

pub mod echo;
pub mod user;

use rpchost_core::{Result, ServiceRegistry};
use std::sync::Arc;

/// Threads backing the account service's blocking work.
const USER_POOL_THREADS: usize = 2;
const USER_POOL_CAPACITY: usize = 256;

/// Build the registry with every service this binary publishes.
pub fn build_registry() -> Result<ServiceRegistry> {
    let mut registry = ServiceRegistry::new();
    registry.register(Arc::new(echo::EchoService))?;
    registry.register(Arc::new(user::UserService::new(
        USER_POOL_THREADS,
        USER_POOL_CAPACITY,
    )?))?;
    Ok(registry)
}
