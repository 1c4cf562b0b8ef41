use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::command::{CreateOutcome, CreateReply, SchedulerCommand};
use crate::broker::config::SchedulerConfig;
use crate::broker::delivery::DeliveryJob;
use crate::broker::metrics::Metrics;
use crate::broker::schedule::ScheduleIndex;
use crate::message::Message;
use crate::storage::Storage;

mod dispatch;
mod handlers;
mod recovery;

/// Single-threaded scheduler core. Owns the schedule index and processes
/// commands from request handlers and delivery workers via a crossbeam
/// channel. Running everything here is what makes index reads and writes
/// mutually exclusive.
pub struct Scheduler {
    storage: Arc<dyn Storage>,
    inbound: Receiver<SchedulerCommand>,
    dispatch: Sender<DeliveryJob>,
    poll_interval: Duration,
    recovery_batch_size: usize,
    running: bool,
    index: ScheduleIndex,
    /// Revisions handed to the delivery workers whose cleanup has not run yet.
    in_flight: HashMap<String, Uuid>,
    /// Set when the last dispatch tick hit a storage error. The loop then
    /// waits a full poll interval instead of spinning on the same deadline.
    dispatch_stalled: bool,
    metrics: Metrics,
}

impl Scheduler {
    pub fn new(
        storage: Arc<dyn Storage>,
        inbound: Receiver<SchedulerCommand>,
        dispatch: Sender<DeliveryJob>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            storage,
            inbound,
            dispatch,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            recovery_batch_size: config.recovery_batch_size.max(1),
            running: true,
            index: ScheduleIndex::new(),
            in_flight: HashMap::new(),
            dispatch_stalled: false,
            metrics: Metrics::new(),
        }
    }

    /// Run the scheduler event loop. This blocks the current thread until
    /// a `Shutdown` command is received or the inbound channel is disconnected.
    pub fn run(&mut self) {
        info!("scheduler started");
        self.recover();

        while self.running {
            // Phase 1: Drain all buffered commands (non-blocking)
            let mut drained = 0;
            while let Ok(cmd) = self.inbound.try_recv() {
                self.handle_command(cmd);
                drained += 1;
                if !self.running {
                    break;
                }
            }

            if !self.running {
                break;
            }

            // Phase 2: Hand every due entry to the delivery workers.
            self.dispatch_due();
            self.record_gauges();

            // Phase 3: Park until next command, next deadline or poll interval
            if drained == 0 {
                match self.inbound.recv_timeout(self.park_timeout()) {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                        info!("inbound channel disconnected, shutting down");
                        self.running = false;
                    }
                }
            }
        }

        // Flush the WAL to ensure all writes are durable before exit
        if let Err(e) = self.storage.flush() {
            warn!(error = %e, "failed to flush WAL during shutdown");
        }

        info!(pending = self.index.len(), "scheduler stopped");
    }

    fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::Create { request, reply } => {
                debug!(id = %request.id, "create command received");
                self.handle_create(request, reply);
            }
            SchedulerCommand::Cancel { id, reply } => {
                debug!(%id, "cancel command received");
                let result = self.handle_cancel(&id);
                if let Ok(true) = result {
                    self.metrics.record_cancel(1);
                }
                let _ = reply.send(result);
            }
            SchedulerCommand::BulkCancel { selector, reply } => {
                debug!(?selector, "bulk cancel command received");
                let result = self.handle_bulk_cancel(&selector);
                if let Ok(ref removed) = result {
                    info!(?selector, removed = removed.len(), "bulk cancel completed");
                    self.metrics.record_cancel(removed.len() as u64);
                }
                let _ = reply.send(result);
            }
            SchedulerCommand::Get { id, reply } => {
                let _ = reply.send(self.handle_get(&id));
            }
            SchedulerCommand::Search { selector, reply } => {
                let _ = reply.send(self.handle_search(&selector));
            }
            SchedulerCommand::ListPending { reply } => {
                let _ = reply.send(self.handle_list_pending());
            }
            SchedulerCommand::HealthCheck { reply } => {
                let _ = reply.send(self.handle_health_check());
            }
            SchedulerCommand::DeliveryFinished {
                id,
                revision,
                delivered,
                reply,
            } => {
                self.handle_delivery_finished(&id, revision, delivered, reply);
            }
            SchedulerCommand::Shutdown => {
                info!("shutdown command received");
                self.running = false;
            }
        }
    }

    /// Shared by create and recovery: fire a past-due message right away,
    /// otherwise (re)insert its timer. The message must already be stored.
    fn schedule_or_fire(&mut self, message: Message, reply: Option<CreateReply>) {
        if message.fire_at <= Utc::now() {
            self.index.remove(&message.id);
            debug!(id = %message.id, fire_at = %message.fire_at, "fire time already passed, dispatching now");
            self.hand_off(message, reply);
            return;
        }

        let fire_at = message.fire_at;
        if let Some(previous) = self
            .index
            .insert(&message.id, fire_at, message.revision)
        {
            debug!(id = %message.id, previous = %previous.fire_at, "replaced pending timer");
        }
        if let Some(reply) = reply {
            let _ = reply.send(Ok(CreateOutcome::Scheduled { fire_at }));
        }
    }

    /// Pass a message to the delivery workers. The caller has already taken
    /// it out of the index.
    fn hand_off(&mut self, message: Message, reply: Option<CreateReply>) {
        let id = message.id.clone();
        self.in_flight.insert(id.clone(), message.revision);
        if self.dispatch.send(DeliveryJob { message, reply }).is_err() {
            self.in_flight.remove(&id);
            error!(%id, "delivery workers are gone, message stays stored until next start");
            return;
        }
        self.metrics.record_dispatch();
    }

    /// How long to park: the poll interval, shortened to the next deadline.
    fn park_timeout(&self) -> Duration {
        if self.dispatch_stalled {
            return self.poll_interval;
        }
        match self.index.next_deadline() {
            Some(deadline) => (deadline - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(self.poll_interval),
            None => self.poll_interval,
        }
    }

    fn record_gauges(&self) {
        self.metrics.set_pending(self.index.len() as u64);
    }
}

#[cfg(test)]
mod tests;
