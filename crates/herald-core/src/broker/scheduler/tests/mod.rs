use super::*;
use crate::broker::command::{CreateOutcome, StoreHealth};
use crate::error::{CancelError, CreateError, StorageError, StorageResult};
use crate::message::ScheduleRequest;
use crate::selector::Selector;
use crate::storage::{RocksDbStorage, ScanPage};
use std::sync::atomic::{AtomicBool, Ordering};

mod common;
use common::*;
