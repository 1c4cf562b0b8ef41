mod rocksdb;
mod traits;

pub use self::rocksdb::RocksDbStorage;
pub use traits::{ScanEntry, ScanPage, Storage};
