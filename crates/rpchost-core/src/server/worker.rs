//! Worker loops.
//!
//! Each worker is an OS thread running its own single-threaded tokio
//! runtime. The accept loop hands every accepted socket to exactly one
//! worker, round-robin, and the connection is served on that thread until it
//! closes. Tasks spawned on a current-thread runtime never migrate, so a
//! connection and all of its request state stay on one worker.

use super::connection::{serve_connection, ConnectionOutcome, ConnectionSettings};
use crate::dispatch::Dispatcher;
use crate::{Result, RpcError};
use std::net::SocketAddr;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, error};

struct Assignment {
    stream: std::net::TcpStream,
    peer: SocketAddr,
}

/// The set of running worker loops.
pub(crate) struct WorkerSet {
    senders: Vec<mpsc::UnboundedSender<Assignment>>,
    threads: Vec<JoinHandle<()>>,
    next: usize,
}

impl WorkerSet {
    /// Start `count` worker threads.
    pub(crate) fn spawn(
        count: usize,
        dispatcher: Dispatcher,
        settings: ConnectionSettings,
    ) -> Result<Self> {
        let mut senders = Vec::with_capacity(count);
        let mut threads = Vec::with_capacity(count);

        for index in 0..count {
            let (tx, rx) = mpsc::unbounded_channel();
            let dispatcher = dispatcher.clone();
            let thread = std::thread::Builder::new()
                .name(format!("rpc-worker-{}", index))
                .spawn(move || run_worker(index, rx, dispatcher, settings))
                .map_err(|e| RpcError::io_with_context(e, "spawn worker thread"))?;
            senders.push(tx);
            threads.push(thread);
        }

        debug!("started {} worker loops", count);
        Ok(Self {
            senders,
            threads,
            next: 0,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }

    /// Hand a connection to the next worker.
    pub(crate) fn assign(&mut self, stream: tokio::net::TcpStream, peer: SocketAddr) -> Result<usize> {
        let stream = stream.into_std()?;
        let index = self.next;
        self.next = (self.next + 1) % self.senders.len();

        self.senders[index]
            .send(Assignment { stream, peer })
            .map_err(|_| RpcError::Io {
                message: format!("worker {} has stopped", index),
                source: None,
            })?;
        Ok(index)
    }

    /// Stop accepting work and wait for every worker thread to exit.
    ///
    /// Connections still in flight are dropped with their worker's runtime.
    pub(crate) async fn shutdown(mut self) {
        self.senders.clear();
        let threads = std::mem::take(&mut self.threads);
        let joined = tokio::task::spawn_blocking(move || {
            for thread in threads {
                if thread.join().is_err() {
                    error!("worker thread panicked");
                }
            }
        })
        .await;
        if let Err(e) = joined {
            error!("failed to join worker threads: {}", e);
        }
    }
}

fn run_worker(
    index: usize,
    mut rx: mpsc::UnboundedReceiver<Assignment>,
    dispatcher: Dispatcher,
    settings: ConnectionSettings,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("worker {} failed to build its runtime: {}", index, e);
            return;
        }
    };

    runtime.block_on(async move {
        while let Some(Assignment { stream, peer }) = rx.recv().await {
            let stream = match tokio::net::TcpStream::from_std(stream) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("worker {} could not adopt connection from {}: {}", index, peer, e);
                    continue;
                }
            };

            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                debug!("worker {} serving {}", index, peer);
                match serve_connection(stream, peer, &dispatcher, &settings).await {
                    Ok(ConnectionOutcome::Responded { bytes }) => {
                        debug!("replied {} bytes to {}", bytes, peer)
                    }
                    Ok(outcome) => debug!("connection {} closed: {:?}", peer, outcome),
                    Err(e) => debug!("connection {} ended: {}", peer, e),
                }
            });
        }
    });

    debug!("worker {} stopped", index);
}
