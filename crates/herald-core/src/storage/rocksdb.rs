use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options,
};

use crate::error::{StorageError, StorageResult};
use crate::message::Message;
use crate::storage::traits::{ScanEntry, ScanPage, Storage};

const CF_MESSAGES: &str = "messages";

/// All column family names (excluding `default` which RocksDB creates automatically).
const COLUMN_FAMILIES: &[&str] = &[CF_MESSAGES];

type DB = DBWithThreadMode<MultiThreaded>;

/// RocksDB-backed storage implementation. Messages live in the `messages`
/// column family keyed by their raw id bytes, valued with their JSON record.
pub struct RocksDbStorage {
    db: DB,
}

impl RocksDbStorage {
    /// Open or create a RocksDB database at the given path with all column families.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;
        Ok(Self { db })
    }

    fn messages_cf(&self) -> StorageResult<Arc<BoundColumnFamily<'_>>> {
        self.db.cf_handle(CF_MESSAGES).ok_or_else(|| {
            StorageError::Unavailable(format!("column family not found: {CF_MESSAGES}"))
        })
    }

    /// Write an arbitrary value under `key`, bypassing serialization.
    #[cfg(test)]
    pub(crate) fn put_raw(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let cf = self.messages_cf()?;
        self.db.put_cf(&cf, key.as_bytes(), value)?;
        Ok(())
    }
}

impl Storage for RocksDbStorage {
    fn put_message(&self, message: &Message) -> StorageResult<()> {
        let cf = self.messages_cf()?;
        let value = serde_json::to_vec(message)?;
        self.db.put_cf(&cf, message.id.as_bytes(), &value)?;
        Ok(())
    }

    fn get_message(&self, id: &str) -> StorageResult<Option<Message>> {
        let cf = self.messages_cf()?;
        match self.db.get_cf(&cf, id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn delete_message(&self, id: &str) -> StorageResult<()> {
        let cf = self.messages_cf()?;
        self.db.delete_cf(&cf, id.as_bytes())?;
        Ok(())
    }

    fn scan_messages(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StorageResult<ScanPage> {
        let cf = self.messages_cf()?;
        let start = after.unwrap_or(prefix);
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(start.as_bytes(), Direction::Forward),
        );

        let mut page = ScanPage::default();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            if after.is_some_and(|a| key.as_ref() == a.as_bytes()) {
                continue;
            }
            if page.entries.len() == limit {
                page.next_cursor = page.entries.last().map(|e| e.id.clone());
                break;
            }
            page.entries.push(ScanEntry {
                id: String::from_utf8_lossy(&key).into_owned(),
                message: serde_json::from_slice::<Message>(&value).map_err(StorageError::from),
            });
        }
        Ok(page)
    }

    fn approximate_count(&self) -> StorageResult<u64> {
        let cf = self.messages_cf()?;
        Ok(self
            .db
            .property_int_value_cf(&cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0))
    }

    fn flush(&self) -> StorageResult<()> {
        self.db.flush_wal(true)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn test_storage() -> (RocksDbStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = RocksDbStorage::open(dir.path()).unwrap();
        (storage, dir)
    }

    fn test_message(id: &str) -> Message {
        let mut payload = crate::message::Payload::new();
        payload.insert("n".to_string(), serde_json::json!(1));
        Message {
            id: id.to_string(),
            fire_at: (Utc::now() + Duration::minutes(5)).fixed_offset(),
            payload,
            callback_url: "http://cb/x".to_string(),
            revision: Message::new_revision(),
        }
    }

    fn ids(page: &ScanPage) -> Vec<&str> {
        page.entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn open_creates_all_column_families() {
        let (storage, _dir) = test_storage();
        for cf_name in COLUMN_FAMILIES {
            assert!(
                storage.db.cf_handle(cf_name).is_some(),
                "column family '{cf_name}' should exist"
            );
        }
    }

    #[test]
    fn message_put_get_delete() {
        let (storage, _dir) = test_storage();
        let msg = test_message("order-1");

        storage.put_message(&msg).unwrap();
        let retrieved = storage.get_message("order-1").unwrap().unwrap();
        assert_eq!(retrieved, msg);

        storage.delete_message("order-1").unwrap();
        assert!(storage.get_message("order-1").unwrap().is_none());
    }

    #[test]
    fn put_overwrites_existing_id() {
        let (storage, _dir) = test_storage();
        let first = test_message("order-1");
        let mut second = test_message("order-1");
        second.callback_url = "http://cb/y".to_string();

        storage.put_message(&first).unwrap();
        storage.put_message(&second).unwrap();

        let retrieved = storage.get_message("order-1").unwrap().unwrap();
        assert_eq!(retrieved.callback_url, "http://cb/y");
        assert_eq!(retrieved.revision, second.revision);
    }

    #[test]
    fn delete_nonexistent_is_ok() {
        let (storage, _dir) = test_storage();
        storage.delete_message("ghost").unwrap();
    }

    #[test]
    fn scan_by_prefix() {
        let (storage, _dir) = test_storage();
        for id in ["order-1", "order-2", "invoice-1", "orders"] {
            storage.put_message(&test_message(id)).unwrap();
        }

        let page = storage.scan_messages("order-", None, 100).unwrap();
        assert_eq!(ids(&page), vec!["order-1", "order-2"]);
        assert!(page.next_cursor.is_none());

        let all = storage.scan_messages("", None, 100).unwrap();
        assert_eq!(all.entries.len(), 4);
    }

    #[test]
    fn scan_pages_with_cursor() {
        let (storage, _dir) = test_storage();
        for i in 0..5 {
            storage.put_message(&test_message(&format!("m-{i}"))).unwrap();
        }

        let first = storage.scan_messages("m-", None, 2).unwrap();
        assert_eq!(ids(&first), vec!["m-0", "m-1"]);
        assert_eq!(first.next_cursor.as_deref(), Some("m-1"));

        let second = storage
            .scan_messages("m-", first.next_cursor.as_deref(), 2)
            .unwrap();
        assert_eq!(ids(&second), vec!["m-2", "m-3"]);

        let third = storage
            .scan_messages("m-", second.next_cursor.as_deref(), 2)
            .unwrap();
        assert_eq!(ids(&third), vec!["m-4"]);
        assert!(third.next_cursor.is_none());
    }

    #[test]
    fn scan_isolates_malformed_records() {
        let (storage, _dir) = test_storage();
        storage.put_message(&test_message("a")).unwrap();
        storage.put_raw("b", b"{not json").unwrap();
        storage.put_message(&test_message("c")).unwrap();

        let page = storage.scan_messages("", None, 10).unwrap();
        assert_eq!(ids(&page), vec!["a", "b", "c"]);
        assert!(page.entries[0].message.is_ok());
        assert!(matches!(
            page.entries[1].message,
            Err(StorageError::Serialization(_))
        ));
        assert!(page.entries[2].message.is_ok());

        assert!(storage.get_message("b").is_err());
    }

    #[test]
    fn approximate_count_reports_reachable_store() {
        let (storage, _dir) = test_storage();
        storage.put_message(&test_message("a")).unwrap();
        storage.approximate_count().unwrap();
        storage.flush().unwrap();
    }

    #[test]
    fn reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let msg = test_message("persistent");

        {
            let storage = RocksDbStorage::open(dir.path()).unwrap();
            storage.put_message(&msg).unwrap();
            storage.flush().unwrap();
        }

        {
            let storage = RocksDbStorage::open(dir.path()).unwrap();
            let retrieved = storage.get_message("persistent").unwrap().unwrap();
            assert_eq!(retrieved, msg);
        }
    }
}
