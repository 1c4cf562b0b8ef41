use super::*;

pub(super) fn test_config(poll_interval_ms: u64) -> SchedulerConfig {
    SchedulerConfig {
        command_channel_capacity: 256,
        poll_interval_ms,
        recovery_batch_size: 2,
    }
}

pub(super) fn test_setup() -> (
    crossbeam_channel::Sender<SchedulerCommand>,
    Scheduler,
    crossbeam_channel::Receiver<DeliveryJob>,
    tempfile::TempDir,
) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(RocksDbStorage::open(dir.path()).unwrap());
    let (tx, scheduler, jobs) = test_setup_with_storage(storage, &test_config(10));
    (tx, scheduler, jobs, dir)
}

/// Helper: create a scheduler sharing an existing storage (for restart tests).
pub(super) fn test_setup_with_storage(
    storage: Arc<dyn Storage>,
    config: &SchedulerConfig,
) -> (
    crossbeam_channel::Sender<SchedulerCommand>,
    Scheduler,
    crossbeam_channel::Receiver<DeliveryJob>,
) {
    let (tx, rx) = crossbeam_channel::bounded(config.command_channel_capacity);
    let (job_tx, job_rx) = crossbeam_channel::unbounded();
    let scheduler = Scheduler::new(storage, rx, job_tx, config);
    (tx, scheduler, job_rx)
}

/// Helper: a scheduler over storage that can be switched off.
pub(super) fn flaky_setup() -> (
    Scheduler,
    crossbeam_channel::Receiver<DeliveryJob>,
    Arc<FlakyStorage>,
    tempfile::TempDir,
) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FlakyStorage::open(dir.path()));
    let (_tx, scheduler, jobs) = test_setup_with_storage(storage.clone(), &test_config(10));
    (scheduler, jobs, storage, dir)
}

/// Helper: a scheduler plus direct access to its RocksDB store, for writing
/// records the API would never produce.
pub(super) fn raw_setup() -> (
    Scheduler,
    crossbeam_channel::Receiver<DeliveryJob>,
    Arc<RocksDbStorage>,
    tempfile::TempDir,
) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(RocksDbStorage::open(dir.path()).unwrap());
    let (_tx, scheduler, jobs) = test_setup_with_storage(storage.clone(), &test_config(10));
    (scheduler, jobs, storage, dir)
}

/// RFC 3339 timestamp `offset_ms` from now.
pub(super) fn in_ms(offset_ms: i64) -> String {
    (Utc::now() + chrono::Duration::milliseconds(offset_ms)).to_rfc3339()
}

pub(super) fn request(id: &str, schedule_to: &str) -> ScheduleRequest {
    ScheduleRequest {
        id: id.to_string(),
        schedule_to: schedule_to.to_string(),
        callback_url: format!("http://callback.test/{id}"),
        payload: serde_json::json!({"id": id}).as_object().cloned().unwrap(),
    }
}

/// Helper: process a create and return its reply channel.
pub(super) fn send_create(
    scheduler: &mut Scheduler,
    id: &str,
    schedule_to: &str,
) -> tokio::sync::oneshot::Receiver<Result<CreateOutcome, CreateError>> {
    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
    scheduler.handle_command(SchedulerCommand::Create {
        request: request(id, schedule_to),
        reply: reply_tx,
    });
    reply_rx
}

/// Helper: process a create whose reply is expected immediately.
pub(super) fn create(
    scheduler: &mut Scheduler,
    id: &str,
    schedule_to: &str,
) -> Result<CreateOutcome, CreateError> {
    send_create(scheduler, id, schedule_to)
        .try_recv()
        .expect("create should reply without waiting for delivery")
}

pub(super) fn cancel(scheduler: &mut Scheduler, id: &str) -> Result<bool, CancelError> {
    let (reply_tx, mut reply_rx) = tokio::sync::oneshot::channel();
    scheduler.handle_command(SchedulerCommand::Cancel {
        id: id.to_string(),
        reply: reply_tx,
    });
    reply_rx.try_recv().unwrap()
}

/// Helper: report a job back to the scheduler as a worker would.
pub(super) fn finish(scheduler: &mut Scheduler, job: DeliveryJob, delivered: bool) {
    scheduler.handle_command(SchedulerCommand::DeliveryFinished {
        id: job.message.id,
        revision: job.message.revision,
        delivered,
        reply: job.reply,
    });
}

/// Storage wrapper that fails every call with `Unavailable` while `down` is set.
pub(super) struct FlakyStorage {
    inner: RocksDbStorage,
    down: AtomicBool,
}

impl FlakyStorage {
    pub(super) fn open(path: &std::path::Path) -> Self {
        Self {
            inner: RocksDbStorage::open(path).unwrap(),
            down: AtomicBool::new(false),
        }
    }

    pub(super) fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

impl Storage for FlakyStorage {
    fn put_message(&self, message: &Message) -> StorageResult<()> {
        self.check()?;
        self.inner.put_message(message)
    }

    fn get_message(&self, id: &str) -> StorageResult<Option<Message>> {
        self.check()?;
        self.inner.get_message(id)
    }

    fn delete_message(&self, id: &str) -> StorageResult<()> {
        self.check()?;
        self.inner.delete_message(id)
    }

    fn scan_messages(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StorageResult<ScanPage> {
        self.check()?;
        self.inner.scan_messages(prefix, after, limit)
    }

    fn approximate_count(&self) -> StorageResult<u64> {
        self.check()?;
        self.inner.approximate_count()
    }

    fn flush(&self) -> StorageResult<()> {
        self.check()?;
        self.inner.flush()
    }
}
