//! Bounded worker pool with submit / await-all semantics

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use crossbeam::channel::{self, Receiver, Sender};
use tracing::debug;

use crate::error::{Result, ThumbError};

type JobResult<T> = (usize, std::result::Result<T, String>);

/// Fixed-size pool of worker threads.
///
/// Jobs run to completion on one worker. A job that panics is reported as an
/// `Err` carrying the panic message; the other jobs are unaffected.
pub struct WorkerPool<T: Send + 'static> {
    pool: rayon::ThreadPool,
    sender: Sender<JobResult<T>>,
    receiver: Receiver<JobResult<T>>,
    submitted: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(ThumbError::pool("Worker count must be greater than 0"));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("thumbsizer-worker-{}", i))
            .build()
            .map_err(|e| ThumbError::pool(format!("Failed to start worker pool: {}", e)))?;

        debug!("Started worker pool with {} threads", workers);

        let (sender, receiver) = channel::unbounded();
        Ok(Self {
            pool,
            sender,
            receiver,
            submitted: 0,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queue a job and return its ticket (the submission index)
    pub fn submit<F>(&mut self, job: F) -> usize
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let ticket = self.submitted;
        self.submitted += 1;

        let sender = self.sender.clone();
        self.pool.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(job)).map_err(panic_message);
            // The receiver lives until await_all has seen every ticket
            let _ = sender.send((ticket, result));
        });

        ticket
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Block until every submitted job has finished.
    ///
    /// Results come back indexed by ticket, whatever order the jobs finished in.
    pub fn await_all(self) -> Vec<std::result::Result<T, String>> {
        let Self {
            pool,
            sender,
            receiver,
            submitted,
        } = self;
        drop(sender);

        let mut results: Vec<JobResult<T>> = receiver.iter().take(submitted).collect();
        drop(pool);

        results.sort_by_key(|(ticket, _)| *ticket);
        results.into_iter().map(|(_, result)| result).collect()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
