//! Fixed-size worker pool over rayon

use super::Signal;
use crate::{Error, Result};
use rayon::{Scope, ThreadPoolBuilder};
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, error};

/// A fixed number of worker threads.
///
/// Jobs run in no particular order on no particular worker. A panicking job
/// is logged and does not take its worker down; reporting the failure to
/// whoever waits on the job is the job's own business. Dropping the pool
/// waits for every submitted job to finish.
pub struct ThreadPool {
    pool: rayon::ThreadPool,
    /// Submitted jobs not yet finished
    pending: Arc<Signal>,
}

/// Lowers the pending count when a job ends, even by panicking
struct PendingGuard(Arc<Signal>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.signal_decrement();
    }
}

impl ThreadPool {
    /// Spawn `size` workers
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("thread pool needs at least one worker".into()));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|id| format!("catree-worker-{id}"))
            .panic_handler(|panic| error!(reason = panic_message(&*panic), "job panicked"))
            .build()
            .map_err(|error| Error::Config(format!("Could not start thread pool: {error}")))?;

        debug!(workers = size, "started thread pool");
        Ok(ThreadPool {
            pool,
            pending: Arc::new(Signal::new(0)),
        })
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Enqueue a job for any idle worker
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.signal_increment();
        let guard = PendingGuard(self.pending.clone());
        self.pool.spawn(move || {
            let _guard = guard;
            job();
        });
    }

    /// Run `op` with a scope whose spawned jobs may borrow from the caller.
    /// Returns once every job spawned in the scope has finished.
    ///
    /// Safe to call from a worker: the waiting thread runs queued jobs
    /// itself, so nested fan-out never starves on a small pool. A panic in a
    /// scoped job resumes on the caller.
    pub fn scope<'scope, OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce(&Scope<'scope>) -> R + Send,
        R: Send,
    {
        self.pool.scope(op)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // The last handle can be dropped by a job running on a worker
        if self.pool.current_thread_index().is_some() {
            return;
        }
        self.pending.wait_for_level(0);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown"
    }
}
