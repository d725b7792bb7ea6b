//! Executors for service invocation.
//!
//! The invoke phase either calls the service on the thread driving the
//! chain ([`InlineExecutor`]) or hands the call to a worker and suspends the
//! chain ([`TokioExecutor`]). The worker resumes the chain when the call
//! returns. An executor that cannot take a job hands it back, and the
//! invoke phase fails the exchange instead of suspending.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::trace;

/// A unit of work submitted to an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs.
pub trait Executor: Send + Sync {
    /// Submits a job.
    ///
    /// # Errors
    ///
    /// Returns the job unrun if the executor no longer accepts work.
    fn execute(&self, job: Job) -> Result<(), Job>;

    /// Returns `true` if [`Executor::execute`] runs the job before
    /// returning. The invoke phase does not suspend for inline executors.
    fn is_inline(&self) -> bool {
        false
    }

    /// Returns a name for logs.
    fn name(&self) -> &'static str;
}

/// Runs each job on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) -> Result<(), Job> {
        job();
        Ok(())
    }

    fn is_inline(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

/// Runs each job on the blocking pool of a tokio runtime.
///
/// Chains are driven synchronously, so jobs go through `spawn_blocking`
/// rather than onto the async worker threads.
#[derive(Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Creates an executor on the runtime behind `handle`.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates an executor on the current runtime, if called inside one.
    #[must_use]
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, job: Job) -> Result<(), Job> {
        trace!("Submitting job to blocking pool");
        let slot = Arc::new(Mutex::new(Some(job)));
        let pending = Arc::clone(&slot);
        let handle = self.handle.spawn_blocking(move || {
            let job = pending.lock().take();
            if let Some(job) = job {
                job();
            }
        });

        // A runtime that has shut down finishes the task without running it.
        if handle.is_finished() {
            if let Some(job) = slot.lock().take() {
                trace!("Blocking pool rejected job");
                return Err(job);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tokio"
    }
}

impl fmt::Debug for TokioExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioExecutor")
            .field("runtime", &self.handle.runtime_flavor())
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
    fn test_inline_runs_immediately() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let submitted = InlineExecutor.execute(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(submitted.is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(InlineExecutor.is_inline());
    }

    #[test]
    fn test_tokio_runs_on_blocking_pool() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let executor = TokioExecutor::new(runtime.handle().clone());
        assert!(!executor.is_inline());

        let (tx, rx) = mpsc::channel();
        let submitted = executor.execute(Box::new(move || {
            tx.send(std::thread::current().id()).unwrap();
        }));
        assert!(submitted.is_ok());

        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, std::thread::current().id());
    }

    #[test]
    fn test_tokio_hands_back_job_after_shutdown() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let executor = TokioExecutor::new(runtime.handle().clone());
        runtime.shutdown_timeout(Duration::from_millis(100));

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let job = executor
            .execute(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap_err();
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        job();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_current_outside_runtime() {
        assert!(TokioExecutor::current().is_none());
    }
}
