//! Error types for pools, wire builders and the key/value store

use std::io;
use thiserror::Error;

/// Lifecycle errors for pools with background threads.
///
/// `get`/`put` never fail; this only surfaces from `close`.
#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Background thread '{0}' panicked")]
    ThreadPanicked(String),
}

pub type PoolResult<T> = Result<T, PoolError>;

/// Errors produced while assembling bytes for the wire.
#[derive(Error, Debug)]
pub enum WireError {
    /// A caller-supplied body stream or reader failed. The cause is kept as-is.
    #[error("producer failed: {0}")]
    Producer(#[source] io::Error),
}

impl WireError {
    /// The underlying I/O error
    pub fn io_error(&self) -> &io::Error {
        match self {
            WireError::Producer(err) => err,
        }
    }
}

pub type WireResult<T> = Result<T, WireError>;

/// Errors from a [`KeyValueStore`](crate::KeyValueStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Key not found")]
    NotFound,

    #[error("Store is closed")]
    Closed,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_producer_keeps_cause() {
        let err = WireError::Producer(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(err.io_error().kind(), io::ErrorKind::ConnectionReset);
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "producer failed: reset");
    }

    #[test]
    fn test_display() {
        let err = PoolError::ThreadPanicked("pool-sweeper".to_string());
        assert_eq!(err.to_string(), "Background thread 'pool-sweeper' panicked");
        assert_eq!(StoreError::Closed.to_string(), "Store is closed");
    }
}
