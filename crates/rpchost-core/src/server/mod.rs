//! TCP provider.
//!
//! Binds the configured address, accepts connections and hands each one to
//! a worker loop. The service registry is frozen when the provider is
//! created; nothing can be registered once sockets are being accepted.
//!
//! # Thread Safety
//!
//! The accept loop runs on the caller's tokio runtime. Connections are
//! served on dedicated worker threads (see `worker`), which share the
//! registry through an `Arc` without locking.

pub mod connection;
mod worker;

pub use connection::{serve_connection, ConnectionOutcome, ConnectionSettings};

use crate::config::ProviderConfig;
use crate::dispatch::Dispatcher;
use crate::registry::ServiceRegistry;
use crate::{Result, RpcError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use worker::WorkerSet;

/// Handle to a running provider. Dropping shuts it down.
pub struct ProviderHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ProviderHandle {
    /// Get the address the provider is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and stop the worker loops.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the accept loop and the workers to finish after `shutdown`.
    pub async fn stopped(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                error!("accept loop failed: {}", e);
            }
        }
    }
}

impl Drop for ProviderHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Publishes the services of a registry over TCP.
pub struct RpcProvider {
    config: ProviderConfig,
    registry: Arc<ServiceRegistry>,
}

impl RpcProvider {
    /// Create a provider. The registry is read-only from here on.
    pub fn new(config: ProviderConfig, registry: ServiceRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Bind the listen address and start serving in the background.
    ///
    /// Returns once the socket is bound; the handle reports the actual
    /// address (useful when the configured port is 0).
    pub async fn start(self) -> Result<ProviderHandle> {
        self.config.validate()?;
        let addr = self.config.listen_addr()?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::io_with_context(e, format!("bind {}", addr)))?;
        let local_addr = listener.local_addr()?;

        let settings = ConnectionSettings {
            read_buffer_size: self.config.read_buffer_size,
            idle_timeout: self.config.idle_timeout,
        };
        let workers = WorkerSet::spawn(
            self.config.worker_threads,
            Dispatcher::new(self.registry.clone()),
            settings,
        )?;

        info!(
            "RpcProvider start service at ip: {} port: {} ({} workers, {} services)",
            local_addr.ip(),
            local_addr.port(),
            workers.len(),
            self.registry.len()
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task_handle = tokio::spawn(accept_loop(listener, workers, shutdown_rx));

        Ok(ProviderHandle {
            addr: local_addr,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
        })
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let mut handle = self.start().await?;

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");

        handle.shutdown();
        handle.stopped().await;
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    mut workers: WorkerSet,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("RpcProvider shutting down");
                break;
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => match workers.assign(stream, peer) {
                        Ok(index) => debug!("connection from {} assigned to worker {}", peer, index),
                        Err(e) => error!("dropping connection from {}: {}", peer, e),
                    },
                    Err(e) => {
                        error!("accept error: {}", e);
                    }
                }
            }
        }
    }

    drop(listener);
    workers.shutdown().await;
}
