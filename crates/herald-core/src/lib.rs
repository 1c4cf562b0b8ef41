pub mod broker;
pub mod error;
pub mod message;
pub mod selector;
pub mod storage;
pub mod telemetry;

pub use broker::{Broker, BrokerConfig, Deliverer, SchedulerCommand, WebhookDeliverer};
pub use error::{StorageError, StorageResult};
pub use message::{Message, ScheduleRequest};
pub use selector::Selector;
pub use storage::{RocksDbStorage, Storage};
