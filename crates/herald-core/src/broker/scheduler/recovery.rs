use super::*;

impl Scheduler {
    /// Rebuild the schedule index from storage. Called at startup before
    /// the first command is served.
    ///
    /// Every readable record is scheduled as if freshly created, so records
    /// whose fire time passed while the process was down fire immediately.
    /// Malformed records are skipped and left in place. A storage error
    /// ends recovery with whatever was restored so far.
    pub(super) fn recover(&mut self) {
        self.index.clear();
        self.in_flight.clear();

        let mut restored = 0u64;
        let mut overdue = 0u64;
        let mut skipped = 0u64;
        let mut cursor: Option<String> = None;

        loop {
            let page = match self
                .storage
                .scan_messages("", cursor.as_deref(), self.recovery_batch_size)
            {
                Ok(page) => page,
                Err(e) => {
                    error!(error = %e, restored, "failed to scan messages during recovery, continuing with partial index");
                    break;
                }
            };

            for entry in page.entries {
                let message = match entry.message {
                    Ok(message) if message.id == entry.id => message,
                    Ok(message) => {
                        warn!(key = %entry.id, id = %message.id, "stored id does not match key, skipping");
                        skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(id = %entry.id, error = %e, "skipping malformed message during recovery");
                        skipped += 1;
                        continue;
                    }
                };

                if message.fire_at <= Utc::now() {
                    overdue += 1;
                } else {
                    restored += 1;
                }
                self.schedule_or_fire(message, None);
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        self.metrics.record_recovered(restored + overdue);
        info!(restored, overdue, skipped, "recovery: schedule index rebuilt");
    }
}
