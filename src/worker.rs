//! Fixed-size worker pool over a bounded job queue

use crate::config::WorkerPoolConfiguration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// A unit of work run by a [`WorkerPool`]
pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct WorkerState {
    active: AtomicUsize,
    executed: AtomicUsize,
    panicked: AtomicUsize,
    finished: Mutex<()>,
    all_finished: Condvar,
}

impl WorkerState {
    /// Called once per worker on exit, and for workers that failed to spawn.
    fn worker_exited(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _guard = self.finished.lock();
            self.all_finished.notify_all();
            debug!("all workers finished");
        }
    }

    fn wait_all_finished(&self) {
        let mut guard = self.finished.lock();
        while self.active.load(Ordering::SeqCst) > 0 {
            self.all_finished.wait(&mut guard);
        }
    }
}

/// `W` worker threads draining a job queue of capacity `W`
///
/// Shutdown is two-step: producers call [`close`](Self::close), a supervisor
/// calls [`stop`](Self::stop) to wait for the workers to drain the queue and
/// exit. Jobs cannot be cancelled once queued.
///
/// # Examples
///
/// ```
/// use wirepool::WorkerPool;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let pool = WorkerPool::new(4);
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..10 {
///     let counter = Arc::clone(&counter);
///     pool.submit(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     });
/// }
///
/// pool.close();
/// pool.stop();
/// assert_eq!(counter.load(Ordering::SeqCst), 10);
/// ```
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    closed: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    state: Arc<WorkerState>,
    size: usize,
}

impl WorkerPool {
    /// Start `workers` threads. A pool needs at least one worker.
    pub fn new(workers: usize) -> Self {
        Self::with_config(WorkerPoolConfiguration::new(workers))
    }

    pub fn with_config(config: WorkerPoolConfiguration) -> Self {
        let size = config.workers.max(1);
        let (tx, rx) = channel::bounded::<Job>(size);
        let state = Arc::new(WorkerState::default());

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let rx = rx.clone();
            let state_ref = Arc::clone(&state);
            state.active.fetch_add(1, Ordering::SeqCst);

            let spawned = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, id))
                .spawn(move || worker_loop(rx, state_ref));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    state.worker_exited();
                    error!(worker = id, error = %err, "failed to spawn worker");
                }
            }
        }

        Self {
            sender: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
            workers: Mutex::new(workers),
            state,
            size,
        }
    }

    /// Queue a job, blocking while the queue is full.
    ///
    /// Returns `false` without running the job if the pool is closed.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            warn!("worker pool is closed, job rejected");
            return false;
        }

        let sender = self.sender.lock().clone();
        match sender {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => {
                warn!("worker pool is closed, job rejected");
                false
            }
        }
    }

    /// Stop accepting jobs and let the workers drain the queue. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sender.lock().take();
        debug!(workers = self.size, "worker pool closed");
    }

    /// Wait for every worker to finish. Blocks until someone calls
    /// [`close`](Self::close).
    ///
    /// Any number of callers may wait at once; each returns only after the
    /// last worker has exited.
    pub fn stop(&self) {
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if handle.join().is_err() {
                error!("worker thread exited abnormally");
            }
        }
        self.state.wait_all_finished();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Workers that have not yet returned
    pub fn active_workers(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Jobs run to completion or to a caught panic
    pub fn executed(&self) -> usize {
        self.state.executed.load(Ordering::SeqCst)
    }

    /// Jobs that panicked
    pub fn panicked(&self) -> usize {
        self.state.panicked.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(jobs: Receiver<Job>, state: Arc<WorkerState>) {
    for job in jobs.iter() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            state.panicked.fetch_add(1, Ordering::SeqCst);
            error!("job panicked, worker continues");
        }
        state.executed.fetch_add(1, Ordering::SeqCst);
    }

    state.worker_exited();
}
