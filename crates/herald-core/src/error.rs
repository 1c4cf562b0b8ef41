/// Low-level storage errors (RocksDB, serialization).
/// This is the error type for the `Storage` trait: storage operations can only
/// fail with infrastructure errors, never domain errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether the caller may reasonably retry the operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::Unavailable(err.into_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

// --- Per-command error types ---
//
// Each scheduler command has its own error enum so callers can match
// exhaustively on exactly the failures that command can produce.

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("message id must not be empty")]
    InvalidId,

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error("message not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("provide at least one filter: 'prefix' or 'contains'")]
    InvalidSelector,
}

/// Failure to invoke a callback. Logged by the delivery workers and never
/// surfaced to a caller.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("callback timed out")]
    Timeout,

    #[error("callback returned status {0}")]
    Status(u16),

    #[error("callback transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeliveryError::Timeout
        } else if let Some(status) = err.status() {
            DeliveryError::Status(status.as_u16())
        } else {
            DeliveryError::Transport(err.to_string())
        }
    }
}

/// Errors from the broker infrastructure (channel, thread lifecycle).
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to spawn {0} thread")]
    SchedulerSpawn(String),

    #[error("scheduler command channel full")]
    ChannelFull,

    #[error("scheduler command channel disconnected")]
    ChannelDisconnected,

    #[error("scheduler thread panicked")]
    SchedulerPanicked,
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
