//! Bounded pool for blocking business logic.
//!
//! Worker loops serve many connections on one thread each, so a method that
//! blocks stalls every connection on its worker. Such methods can move their
//! work, together with the `Done` continuation, into a [`TaskPool`] and
//! return immediately:
//!
//! ```rust,ignore
//! MethodDescriptor::new("Register", move |req: RegisterRequest, resp, done| {
//!     let store = store.clone();
//!     if let Err(e) = pool.execute(move || store.register(req, resp, done)) {
//!         tracing::error!("Register rejected: {}", e);
//!     }
//! })
//! ```
//!
//! If the pool rejects the job, the continuation is dropped with it and the
//! connection closes without a reply.

use crate::{Result, RpcError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of OS threads draining a bounded job queue.
pub struct TaskPool {
    name: String,
    capacity: usize,
    tx: Option<flume::Sender<Job>>,
    threads: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Start `threads` workers sharing a queue of at most `capacity` jobs.
    pub fn new(name: impl Into<String>, threads: usize, capacity: usize) -> Result<Self> {
        let name = name.into();
        if threads == 0 {
            return Err(RpcError::Config {
                message: format!("task pool {} needs at least one thread", name),
            });
        }

        let (tx, rx) = flume::bounded::<Job>(capacity);
        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let rx = rx.clone();
            let pool = name.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("task pool {}: job panicked", pool);
                        }
                    }
                })
                .map_err(|e| RpcError::io_with_context(e, format!("spawn {} thread", name)))?;
            handles.push(handle);
        }

        debug!("task pool {} started ({} threads, capacity {})", name, threads, capacity);
        Ok(Self {
            name,
            capacity,
            tx: Some(tx),
            threads: handles,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Jobs waiting to run.
    pub fn queued(&self) -> usize {
        self.tx.as_ref().map_or(0, |tx| tx.len())
    }

    /// Queue a job without blocking.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let tx = self.tx.as_ref().ok_or_else(|| RpcError::PoolClosed {
            pool: self.name.clone(),
        })?;

        tx.try_send(Box::new(job)).map_err(|e| match e {
            flume::TrySendError::Full(_) => RpcError::PoolSaturated {
                pool: self.name.clone(),
                capacity: self.capacity,
            },
            flume::TrySendError::Disconnected(_) => RpcError::PoolClosed {
                pool: self.name.clone(),
            },
        })
    }

    /// Stop taking jobs, finish the queued ones and join the threads.
    pub fn shutdown(&mut self) {
        if self.tx.take().is_none() {
            return;
        }
        let current = std::thread::current().id();
        for handle in self.threads.drain(..) {
            // A job holding the last reference to the pool drops it on a pool thread.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("task pool {}: thread panicked", self.name);
            }
        }
        debug!("task pool {} stopped", self.name);
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("name", &self.name)
            .field("threads", &self.threads.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    #[test]
    fn test_jobs_run() {
        let pool = TaskPool::new("test", 2, 16).unwrap();
        let (tx, rx) = mpsc::channel();

        for i in 0..10 {
            let tx = tx.clone();
            pool.execute(move || tx.send(i).unwrap()).unwrap();
        }

        let mut seen: Vec<i32> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_full_queue_is_saturated() {
        let pool = TaskPool::new("tiny", 1, 1).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // Occupy the only thread, then fill the only queue slot.
        pool.execute(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pool.execute(|| {}).unwrap();

        let err = pool.execute(|| {}).unwrap_err();
        assert!(matches!(err, RpcError::PoolSaturated { capacity: 1, .. }));

        release_tx.send(()).unwrap();
    }

    #[test]
    fn test_execute_after_shutdown() {
        let mut pool = TaskPool::new("closed", 1, 4).unwrap();
        pool.shutdown();

        let err = pool.execute(|| {}).unwrap_err();
        assert!(matches!(err, RpcError::PoolClosed { .. }));
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = TaskPool::new("panicky", 1, 4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        pool.execute(|| panic!("boom")).unwrap();
        let c = counter.clone();
        pool.execute(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let err = TaskPool::new("empty", 0, 4).unwrap_err();
        assert!(err.is_fatal());
    }
}
