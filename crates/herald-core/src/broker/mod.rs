pub mod command;
pub mod config;
pub mod delivery;
pub mod metrics;
pub mod schedule;
mod scheduler;

use std::sync::Arc;
use std::thread;

use tracing::{info, warn};

use crate::error::{BrokerError, BrokerResult};
use crate::storage::Storage;

pub use command::{
    CreateOutcome, HealthReport, PendingMessage, SchedulerCommand, SearchHit, StoreHealth,
};
pub use config::BrokerConfig;
pub use delivery::{Deliverer, WebhookDeliverer};

use scheduler::Scheduler;

/// The broker owns the scheduler thread, the delivery workers and the
/// inbound command channel. Request handlers send commands through
/// `send_command()`, and the single-threaded scheduler processes them
/// sequentially. Workers report finished deliveries on the same channel.
pub struct Broker {
    command_tx: crossbeam_channel::Sender<SchedulerCommand>,
    scheduler_thread: Option<thread::JoinHandle<()>>,
    delivery_threads: Vec<thread::JoinHandle<()>>,
}

impl Broker {
    /// Create a new broker, spawning the scheduler and the delivery workers
    /// on dedicated OS threads. The scheduler rebuilds its index from
    /// storage before serving the first command.
    #[tracing::instrument(skip_all, fields(workers = config.delivery.workers))]
    pub fn new(
        config: BrokerConfig,
        storage: Arc<dyn Storage>,
        deliverer: Arc<dyn Deliverer>,
    ) -> BrokerResult<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<SchedulerCommand>(
            config.scheduler.command_channel_capacity,
        );
        let (job_tx, job_rx) = crossbeam_channel::unbounded();

        let delivery_threads =
            delivery::spawn_workers(config.delivery.workers, deliverer, job_rx, tx.clone())?;

        let scheduler_config = config.scheduler.clone();
        let handle = thread::Builder::new()
            .name("herald-scheduler".to_string())
            .spawn(move || {
                let mut scheduler = Scheduler::new(storage, rx, job_tx, &scheduler_config);
                scheduler.run();
            })
            .map_err(|e| BrokerError::SchedulerSpawn(format!("scheduler: {e}")))?;

        info!("broker started");

        Ok(Self {
            command_tx: tx,
            scheduler_thread: Some(handle),
            delivery_threads,
        })
    }

    /// Send a command to the scheduler. Returns an error if the channel is full
    /// or disconnected.
    #[tracing::instrument(skip_all)]
    pub fn send_command(&self, cmd: SchedulerCommand) -> BrokerResult<()> {
        self.command_tx.try_send(cmd).map_err(|e| match e {
            crossbeam_channel::TrySendError::Full(_) => BrokerError::ChannelFull,
            crossbeam_channel::TrySendError::Disconnected(_) => BrokerError::ChannelDisconnected,
        })
    }

    /// Initiate graceful shutdown: stop the scheduler, then wait for the
    /// delivery workers to finish their in-flight callbacks.
    ///
    /// Cleanup of deliveries still running when the scheduler stops is lost;
    /// those messages stay stored and fire again on the next start.
    #[tracing::instrument(skip_all)]
    pub fn shutdown(mut self) -> BrokerResult<()> {
        info!("initiating broker shutdown");
        self.stop()?;
        info!("broker shutdown complete");
        Ok(())
    }

    fn stop(&mut self) -> BrokerResult<()> {
        // Send shutdown command (ignore error if channel already closed)
        let _ = self.command_tx.send(SchedulerCommand::Shutdown);

        // Wait for the scheduler thread to finish
        if let Some(handle) = self.scheduler_thread.take() {
            handle.join().map_err(|_| BrokerError::SchedulerPanicked)?;
        }

        // The scheduler dropped the job sender on exit, so workers drain and stop.
        for handle in self.delivery_threads.drain(..) {
            if handle.join().is_err() {
                warn!("delivery worker panicked");
            }
        }
        Ok(())
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        // If shutdown wasn't called explicitly, attempt to stop the scheduler
        if self.scheduler_thread.is_some() {
            let _ = self.stop();
        }
    }
}
