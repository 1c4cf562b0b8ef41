use super::*;

use crate::broker::command::{HealthReport, PendingMessage, SearchHit, StoreHealth};
use crate::error::{CancelError, GetError, SearchError, StorageError, StorageResult};
use crate::message::ScheduleRequest;
use crate::selector::Selector;
use crate::storage::ScanEntry;

impl Scheduler {
    /// Validate, persist, then (re)schedule. The store write comes first so a
    /// failed write leaves any previous timer untouched.
    pub(super) fn handle_create(&mut self, request: ScheduleRequest, reply: CreateReply) {
        let message = match request.into_message() {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "rejected create");
                let _ = reply.send(Err(e));
                return;
            }
        };

        if let Err(e) = self.storage.put_message(&message) {
            warn!(id = %message.id, error = %e, "failed to persist message");
            let _ = reply.send(Err(e.into()));
            return;
        }
        self.metrics.record_create();

        if let Some(previous) = self.index.remove(&message.id) {
            debug!(id = %message.id, previous = %previous.fire_at, "superseding pending message");
        }
        info!(id = %message.id, fire_at = %message.fire_at, "message scheduled");
        self.schedule_or_fire(message, Some(reply));
    }

    /// Remove the stored record and the pending timer.
    ///
    /// Reports `true` only when something that would still have fired was
    /// removed. A message already handed to a delivery worker is left for the
    /// worker's cleanup and reported as not removed.
    pub(super) fn handle_cancel(&mut self, id: &str) -> Result<bool, CancelError> {
        let stored = match self.storage.get_message(id) {
            Ok(Some(message)) => {
                if self.in_flight.get(id) == Some(&message.revision) {
                    debug!(%id, "cancel of message already being delivered, nothing to remove");
                    return Ok(false);
                }
                true
            }
            Ok(None) => false,
            // A malformed record can still be deleted.
            Err(StorageError::Serialization(e)) => {
                warn!(%id, error = %e, "cancelling malformed record");
                true
            }
            Err(e) => return Err(e.into()),
        };

        if stored {
            self.storage.delete_message(id)?;
        }
        let scheduled = self.index.remove(id).is_some();

        let removed = stored || scheduled;
        if removed {
            info!(%id, "message cancelled");
        }
        Ok(removed)
    }

    /// Cancel every stored message whose id matches the selector. Returns the
    /// ids actually removed.
    pub(super) fn handle_bulk_cancel(
        &mut self,
        selector: &Selector,
    ) -> Result<Vec<String>, CancelError> {
        let matched: Vec<String> = self
            .scan_matching(selector)?
            .into_iter()
            .map(|entry| entry.id)
            .collect();

        let mut removed = Vec::with_capacity(matched.len());
        for id in matched {
            if self.handle_cancel(&id)? {
                removed.push(id);
            }
        }
        Ok(removed)
    }

    pub(super) fn handle_get(&self, id: &str) -> Result<Message, GetError> {
        self.storage
            .get_message(id)?
            .ok_or_else(|| GetError::NotFound(id.to_string()))
    }

    /// Stored messages matching the selector, with their pending fire time.
    /// Malformed records are skipped.
    pub(super) fn handle_search(&self, selector: &Selector) -> Result<Vec<SearchHit>, SearchError> {
        let hits = self
            .scan_matching(selector)?
            .into_iter()
            .filter_map(|entry| match entry.message {
                Ok(message) => {
                    let next_run = self
                        .index
                        .get(&message.id)
                        .filter(|scheduled| scheduled.handle == message.revision)
                        .map(|scheduled| scheduled.fire_at);
                    Some(SearchHit { message, next_run })
                }
                Err(e) => {
                    warn!(id = %entry.id, error = %e, "skipping malformed record in search");
                    None
                }
            })
            .collect();
        Ok(hits)
    }

    pub(super) fn handle_list_pending(&self) -> Vec<PendingMessage> {
        self.index
            .entries()
            .into_iter()
            .map(|(id, scheduled)| PendingMessage {
                id,
                next_run: scheduled.fire_at,
            })
            .collect()
    }

    pub(super) fn handle_health_check(&self) -> HealthReport {
        let store = match self.storage.approximate_count() {
            Ok(approximate_messages) => StoreHealth::Connected {
                approximate_messages,
            },
            Err(e) => {
                warn!(error = %e, "health check: store unreachable");
                StoreHealth::Disconnected {
                    error: e.to_string(),
                }
            }
        };
        HealthReport {
            store,
            pending: self.index.len(),
        }
    }

    /// Page through the store collecting every entry whose id matches.
    fn scan_matching(&self, selector: &Selector) -> StorageResult<Vec<ScanEntry>> {
        let mut matched = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.storage.scan_messages(
                selector.scan_prefix(),
                cursor.as_deref(),
                self.recovery_batch_size,
            )?;
            matched.extend(
                page.entries
                    .into_iter()
                    .filter(|entry| selector.matches(&entry.id)),
            );
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(matched)
    }
}
