use crate::error::StorageResult;
use crate::message::Message;

/// One record returned by a scan. Decoding happens per record so a single
/// malformed value does not fail the whole page.
#[derive(Debug)]
pub struct ScanEntry {
    pub id: String,
    pub message: StorageResult<Message>,
}

/// A page of a cursor-based scan.
#[derive(Debug, Default)]
pub struct ScanPage {
    pub entries: Vec<ScanEntry>,
    /// Id to pass as `after` to fetch the next page. `None` once the scan
    /// is exhausted.
    pub next_cursor: Option<String>,
}

/// Storage trait for message persistence. Implementations must be thread-safe.
///
/// Each message is independent: per-key atomicity is all the scheduler needs.
pub trait Storage: Send + Sync {
    /// Store a message under its id, overwriting any previous record.
    fn put_message(&self, message: &Message) -> StorageResult<()>;

    /// Retrieve a message by id.
    fn get_message(&self, id: &str) -> StorageResult<Option<Message>>;

    /// Delete a message by id. Deleting an absent id is not an error.
    fn delete_message(&self, id: &str) -> StorageResult<()>;

    /// List up to `limit` messages whose ids start with `prefix`, in
    /// lexicographic id order, starting strictly after `after` when given.
    fn scan_messages(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StorageResult<ScanPage>;

    /// Cheap reachability check. Returns the backend's estimate of the
    /// number of stored messages.
    fn approximate_count(&self) -> StorageResult<u64>;

    /// Flush the write-ahead log so acknowledged writes survive a crash.
    fn flush(&self) -> StorageResult<()>;
}
