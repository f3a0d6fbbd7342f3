//! Fixed-length buffer recycler with age-based expiry

use crate::config::RecyclerConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::eviction::Stamped;

use crossbeam::channel::{self, Receiver, Select, Sender};
use std::collections::VecDeque;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Recycler for large fixed-length byte buffers
///
/// A coordinator thread owns a queue of deposited buffers and trades them with
/// callers over two zero-capacity channels. The most recently deposited buffer
/// is handed out first. Buffers that sit in the queue longer than the max age
/// (one minute by default) are released once the coordinator has been idle for
/// a tick, so a long-running process does not pin its peak-traffic memory.
///
/// Dropping the pool disconnects the channels and joins the coordinator.
///
/// # Examples
///
/// ```
/// use wirepool::RecyclerBufferPool;
///
/// let pool = RecyclerBufferPool::new(4096);
/// let buf = pool.get();
/// assert_eq!(buf.len(), 4096);
/// pool.put(buf);
/// ```
pub struct RecyclerBufferPool {
    deliveries: Option<Receiver<Vec<u8>>>,
    deposits: Option<Sender<Vec<u8>>>,
    coordinator: Option<JoinHandle<()>>,
    buffer_len: usize,
}

impl RecyclerBufferPool {
    /// Create a recycler handing out buffers of `length` bytes
    pub fn new(length: usize) -> Self {
        Self::with_config(RecyclerConfiguration::new(length))
    }

    pub fn with_config(config: RecyclerConfiguration) -> Self {
        let (deliver_tx, deliver_rx) = channel::bounded(0);
        let (deposit_tx, deposit_rx) = channel::bounded(0);
        let buffer_len = config.buffer_len;

        let spawned = thread::Builder::new()
            .name("wirepool-recycler".to_string())
            .spawn(move || Coordinator::new(config).run(deliver_tx, deposit_rx));

        let coordinator = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                error!(error = %err, "failed to spawn recycler, buffers will not be reused");
                None
            }
        };

        Self {
            deliveries: Some(deliver_rx),
            deposits: Some(deposit_tx),
            coordinator,
            buffer_len,
        }
    }

    /// Receive a buffer from the coordinator
    pub fn get(&self) -> Vec<u8> {
        let delivered = self.deliveries.as_ref().and_then(|rx| rx.recv().ok());
        delivered.unwrap_or_else(|| vec![0u8; self.buffer_len])
    }

    /// Hand a buffer back to the coordinator
    pub fn put(&self, buf: Vec<u8>) {
        if let Some(tx) = &self.deposits {
            // A send error means the coordinator is gone; the buffer is just freed.
            let _ = tx.send(buf);
        }
    }

    /// Length of every buffer this pool hands out
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Stop the coordinator and release every queued buffer
    pub fn close(mut self) -> PoolResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> PoolResult<()> {
        self.deliveries.take();
        self.deposits.take();
        match self.coordinator.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| PoolError::ThreadPanicked("wirepool-recycler".to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for RecyclerBufferPool {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!(error = %err, "recycler did not shut down cleanly");
        }
    }
}

struct Coordinator {
    config: RecyclerConfiguration,
    queue: VecDeque<Stamped<Vec<u8>>>,
}

impl Coordinator {
    fn new(config: RecyclerConfiguration) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
        }
    }

    fn run(mut self, deliveries: Sender<Vec<u8>>, deposits: Receiver<Vec<u8>>) {
        loop {
            if self.queue.is_empty() {
                self.queue
                    .push_front(Stamped::now(vec![0u8; self.config.buffer_len]));
            }

            let mut select = Select::new();
            let deposit = select.recv(&deposits);
            let deliver = select.send(&deliveries);

            let oper = match select.select_timeout(self.config.idle_tick) {
                Ok(oper) => oper,
                Err(_) => {
                    self.expire();
                    continue;
                }
            };

            match oper.index() {
                i if i == deposit => match oper.recv(&deposits) {
                    Ok(buf) => self.deposit(buf),
                    Err(_) => break,
                },
                i if i == deliver => {
                    let Some(front) = self.queue.pop_front() else {
                        continue;
                    };
                    if oper.send(&deliveries, front.value).is_err() {
                        break;
                    }
                }
                _ => unreachable!("select only registers two operations"),
            }
        }
        debug!(queued = self.queue.len(), "recycler stopped");
    }

    fn deposit(&mut self, mut buf: Vec<u8>) {
        let len = self.config.buffer_len;
        if buf.capacity() < len {
            debug!(capacity = buf.capacity(), expected = len, "dropping undersized buffer");
            return;
        }
        buf.resize(len, 0);
        self.queue.push_front(Stamped::now(buf));
    }

    fn expire(&mut self) {
        let before = self.queue.len();
        let max_age = self.config.max_age;
        self.queue.retain(|record| !record.is_older_than(max_age));
        let expired = before - self.queue.len();
        if expired > 0 {
            debug!(expired, remaining = self.queue.len(), "released aged buffers");
        }
    }
}
