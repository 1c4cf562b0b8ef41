use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

use crate::error::{CancelError, CreateError, GetError, SearchError};
use crate::message::{Message, ScheduleRequest};
use crate::selector::Selector;

/// Reply channel of a create. Held by a delivery job when the message is
/// fired synchronously, so the caller hears back only after cleanup.
pub type CreateReply = tokio::sync::oneshot::Sender<Result<CreateOutcome, CreateError>>;

/// What happened to an accepted create.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// Pending in the schedule index.
    Scheduled { fire_at: DateTime<FixedOffset> },
    /// The fire time had already passed: the callback was invoked and the
    /// message cleaned up before replying.
    Fired { delivered: bool },
}

/// A stored message together with its pending fire time, if still scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub message: Message,
    pub next_run: Option<DateTime<FixedOffset>>,
}

/// A schedule index entry as seen by callers.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub id: String,
    pub next_run: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreHealth {
    Connected { approximate_messages: u64 },
    Disconnected { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub store: StoreHealth,
    pub pending: usize,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        matches!(self.store, StoreHealth::Connected { .. })
    }
}

/// Commands sent to the single-threaded scheduler core.
///
/// Request handlers and delivery workers run on other threads; every read or
/// write of the schedule index happens while the scheduler processes one of
/// these. Each variant that expects a response includes a
/// `tokio::sync::oneshot::Sender` for the reply.
pub enum SchedulerCommand {
    Create {
        request: ScheduleRequest,
        reply: CreateReply,
    },
    Cancel {
        id: String,
        reply: tokio::sync::oneshot::Sender<Result<bool, CancelError>>,
    },
    BulkCancel {
        selector: Selector,
        reply: tokio::sync::oneshot::Sender<Result<Vec<String>, CancelError>>,
    },
    Get {
        id: String,
        reply: tokio::sync::oneshot::Sender<Result<Message, GetError>>,
    },
    Search {
        selector: Selector,
        reply: tokio::sync::oneshot::Sender<Result<Vec<SearchHit>, SearchError>>,
    },
    ListPending {
        reply: tokio::sync::oneshot::Sender<Vec<PendingMessage>>,
    },
    HealthCheck {
        reply: tokio::sync::oneshot::Sender<HealthReport>,
    },
    /// Sent by a delivery worker once the callback returned, failed or timed
    /// out. Triggers cleanup of exactly the fired revision.
    DeliveryFinished {
        id: String,
        revision: Uuid,
        delivered: bool,
        reply: Option<CreateReply>,
    },
    Shutdown,
}
