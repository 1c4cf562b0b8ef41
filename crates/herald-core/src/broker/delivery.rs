use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::broker::command::{CreateReply, SchedulerCommand};
use crate::broker::config::DeliveryConfig;
use crate::error::{BrokerError, BrokerResult, DeliveryError};
use crate::message::Message;

/// A due message handed off by the scheduler.
pub struct DeliveryJob {
    pub message: Message,
    /// Present when the message fired synchronously from a create; answered
    /// by the scheduler once cleanup is done.
    pub reply: Option<CreateReply>,
}

/// Invokes a message's callback. Implementations must be thread-safe and
/// must bound how long a single invocation can take.
pub trait Deliverer: Send + Sync {
    fn deliver(&self, message: &Message) -> Result<(), DeliveryError>;
}

/// POSTs the payload as JSON to the message's callback URL.
pub struct WebhookDeliverer {
    client: reqwest::blocking::Client,
}

impl WebhookDeliverer {
    /// Build the HTTP client. Must not be called from inside an async
    /// runtime: the blocking client runs its own.
    pub fn new(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { client })
    }
}

impl Deliverer for WebhookDeliverer {
    fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        self.client
            .post(&message.callback_url)
            .json(&message.payload)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

/// Spawn the delivery worker threads.
///
/// Each worker invokes the callback, then reports back through the scheduler
/// command channel so cleanup runs serialized with every other mutation.
/// Workers exit when the job channel disconnects (scheduler stopped).
pub(crate) fn spawn_workers(
    count: usize,
    deliverer: Arc<dyn Deliverer>,
    jobs: Receiver<DeliveryJob>,
    commands: Sender<SchedulerCommand>,
) -> BrokerResult<Vec<thread::JoinHandle<()>>> {
    (0..count.max(1))
        .map(|i| {
            let deliverer = Arc::clone(&deliverer);
            let jobs = jobs.clone();
            let commands = commands.clone();
            thread::Builder::new()
                .name(format!("herald-delivery-{i}"))
                .spawn(move || run_worker(deliverer.as_ref(), &jobs, &commands))
                .map_err(|e| BrokerError::SchedulerSpawn(format!("delivery worker: {e}")))
        })
        .collect()
}

fn run_worker(
    deliverer: &dyn Deliverer,
    jobs: &Receiver<DeliveryJob>,
    commands: &Sender<SchedulerCommand>,
) {
    while let Ok(job) = jobs.recv() {
        let finished = execute(deliverer, job);
        if let Err(crossbeam_channel::SendError(cmd)) = commands.send(finished) {
            if let SchedulerCommand::DeliveryFinished { id, .. } = cmd {
                warn!(%id, "scheduler stopped before delivery cleanup, record kept for next start");
            }
        }
    }
    debug!("delivery worker stopped");
}

/// Invoke the callback and build the cleanup command. Failures are logged
/// and never retried.
pub(crate) fn execute(deliverer: &dyn Deliverer, job: DeliveryJob) -> SchedulerCommand {
    let DeliveryJob { message, reply } = job;
    let delivered = match deliverer.deliver(&message) {
        Ok(()) => {
            info!(id = %message.id, url = %message.callback_url, "callback delivered");
            true
        }
        Err(e) => {
            warn!(id = %message.id, url = %message.callback_url, error = %e, "callback failed, message discarded");
            false
        }
    };
    SchedulerCommand::DeliveryFinished {
        id: message.id,
        revision: message.revision,
        delivered,
        reply,
    }
}
