use super::*;

use crate::error::StorageError;

impl Scheduler {
    /// Hand every due entry to the delivery workers.
    ///
    /// Entries leave the index when handed off, so a cancel arriving after
    /// this point finds nothing to remove. On a store outage the current and
    /// remaining entries go back into the index unchanged and are retried on
    /// the next tick.
    ///
    /// Returns the number of messages dispatched.
    pub(super) fn dispatch_due(&mut self) -> usize {
        self.dispatch_stalled = false;
        let mut due = self.index.pop_due(Utc::now()).into_iter();
        let mut dispatched = 0;

        while let Some((id, scheduled)) = due.next() {
            match self.storage.get_message(&id) {
                Ok(Some(message)) if message.revision == scheduled.handle => {
                    debug!(%id, fire_at = %scheduled.fire_at, "message due");
                    self.hand_off(message, None);
                    dispatched += 1;
                }
                Ok(Some(message)) => {
                    warn!(%id, "timer does not match stored revision, rescheduling from store");
                    self.schedule_or_fire(message, None);
                }
                Ok(None) => {
                    warn!(%id, "due message missing from store, dropping timer");
                }
                Err(StorageError::Serialization(e)) => {
                    error!(%id, error = %e, "due message is malformed, dropping timer");
                }
                Err(e) => {
                    warn!(%id, error = %e, "store unavailable, retrying due messages next tick");
                    self.index.insert(&id, scheduled.fire_at, scheduled.handle);
                    for (id, scheduled) in due.by_ref() {
                        self.index.insert(&id, scheduled.fire_at, scheduled.handle);
                    }
                    self.dispatch_stalled = true;
                    break;
                }
            }
        }

        dispatched
    }

    /// Cleanup after a callback attempt, successful or not.
    ///
    /// Deletes the stored record only if it is still the revision that was
    /// fired: a create that superseded the message mid-delivery keeps its
    /// record and timer.
    pub(super) fn handle_delivery_finished(
        &mut self,
        id: &str,
        revision: Uuid,
        delivered: bool,
        reply: Option<CreateReply>,
    ) {
        self.metrics.record_delivery(delivered);
        if self.in_flight.get(id) == Some(&revision) {
            self.in_flight.remove(id);
        }
        self.index.remove_if_handle(id, revision);

        match self.storage.get_message(id) {
            Ok(Some(stored)) if stored.revision == revision => {
                if let Err(e) = self.storage.delete_message(id) {
                    warn!(%id, error = %e, "failed to delete fired message, it will fire again after restart");
                }
            }
            Ok(Some(_)) => {
                debug!(%id, "message superseded during delivery, keeping newer record");
            }
            Ok(None) => {
                debug!(%id, "fired message already removed");
            }
            Err(e) => {
                warn!(%id, error = %e, "failed to read fired message for cleanup, it may fire again after restart");
            }
        }

        if let Some(reply) = reply {
            let _ = reply.send(Ok(CreateOutcome::Fired { delivered }));
        }
    }
}
