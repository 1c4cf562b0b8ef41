use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{middleware, Json, Router};
use chrono::{DateTime, FixedOffset};
use herald_core::broker::{CreateOutcome, HealthReport, StoreHealth};
use herald_core::message::Payload;
use herald_core::{Broker, Message, ScheduleRequest, SchedulerCommand, Selector};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::info;

use crate::auth::{self, ApiToken};
use crate::error::{ApiError, IntoApiError};

/// Shared state of every route.
#[derive(Clone)]
pub struct AppState {
    broker: Arc<Broker>,
}

impl AppState {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }
}

/// Build the HTTP router. Every route except `/health` sits behind the
/// bearer-token check when a token is given.
pub fn router(state: AppState, api_token: Option<ApiToken>) -> Router {
    let mut messages = Router::new()
        .route("/messages", post(create_message).get(list_pending))
        .route("/messages/search", get(search_messages))
        .route("/messages/bulk", delete(bulk_cancel))
        .route("/messages/{id}", get(get_message).delete(cancel_message));

    if let Some(token) = api_token {
        messages = messages.route_layer(middleware::from_fn_with_state(
            token,
            auth::require_bearer,
        ));
    }

    Router::new()
        .route("/health", get(health))
        .merge(messages)
        .with_state(state)
}

/// Send a command to the scheduler and wait for its reply.
async fn call<T>(
    broker: &Broker,
    make: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
) -> Result<T, ApiError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    broker
        .send_command(make(reply_tx))
        .map_err(IntoApiError::into_api_error)?;
    reply_rx
        .await
        .map_err(|_| ApiError::Internal("scheduler reply channel dropped".to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
    pub id: String,
    pub schedule_to: String,
    pub payload: Payload,
    pub webhook_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub status: &'static str,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered: Option<bool>,
}

/// POST /messages
async fn create_message(
    State(state): State<AppState>,
    body: Result<Json<CreateBody>, JsonRejection>,
) -> Result<Json<CreateResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let message_id = body.id.clone();
    let request = ScheduleRequest {
        id: body.id,
        schedule_to: body.schedule_to,
        callback_url: body.webhook_url,
        payload: body.payload,
    };

    let outcome = call(&state.broker, |reply| SchedulerCommand::Create { request, reply })
        .await?
        .map_err(IntoApiError::into_api_error)?;

    let response = match outcome {
        CreateOutcome::Scheduled { .. } => CreateResponse {
            status: "scheduled",
            message_id,
            delivered: None,
        },
        CreateOutcome::Fired { delivered } => CreateResponse {
            status: "fired",
            message_id,
            delivered: Some(delivered),
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub status: &'static str,
    pub message_id: String,
    pub removed: bool,
}

/// DELETE /messages/{id}. Idempotent: unknown ids are reported as deleted.
async fn cancel_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let removed = call(&state.broker, |reply| SchedulerCommand::Cancel {
        id: id.clone(),
        reply,
    })
    .await?
    .map_err(IntoApiError::into_api_error)?;

    Ok(Json(CancelResponse {
        status: "deleted",
        message_id: id,
        removed,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingJob {
    pub message_id: String,
    pub next_run: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub scheduled_jobs: Vec<PendingJob>,
    pub count: usize,
}

/// GET /messages
async fn list_pending(State(state): State<AppState>) -> Result<Json<ListResponse>, ApiError> {
    let pending = call(&state.broker, |reply| SchedulerCommand::ListPending { reply }).await?;

    let scheduled_jobs: Vec<PendingJob> = pending
        .into_iter()
        .map(|p| PendingJob {
            message_id: p.id,
            next_run: p.next_run.to_rfc3339(),
        })
        .collect();
    Ok(Json(ListResponse {
        count: scheduled_jobs.len(),
        scheduled_jobs,
    }))
}

/// Id filters shared by search and bulk cancel.
#[derive(Debug, Default, Deserialize)]
pub struct Filters {
    pub prefix: Option<String>,
    pub contains: Option<String>,
}

impl Filters {
    fn is_empty(&self) -> bool {
        self.prefix.as_deref().unwrap_or("").is_empty()
            && self.contains.as_deref().unwrap_or("").is_empty()
    }

    fn into_selector(self) -> Result<Selector, ApiError> {
        Selector::from_filters(self.prefix, self.contains).map_err(IntoApiError::into_api_error)
    }
}

/// A stored record as exposed over HTTP.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub schedule_to: String,
    pub payload: Payload,
    pub webhook_url: String,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            schedule_to: message.fire_at.to_rfc3339(),
            payload: message.payload,
            webhook_url: message.callback_url,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchItem {
    #[serde(flatten)]
    pub message: MessageView,
    pub next_run: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub count: usize,
    pub messages: Vec<SearchItem>,
}

/// GET /messages/search?prefix=&contains=
async fn search_messages(
    State(state): State<AppState>,
    Query(filters): Query<Filters>,
) -> Result<Json<SearchResponse>, ApiError> {
    let selector = filters.into_selector()?;
    let hits = call(&state.broker, |reply| SchedulerCommand::Search { selector, reply })
        .await?
        .map_err(IntoApiError::into_api_error)?;

    let messages: Vec<SearchItem> = hits
        .into_iter()
        .map(|hit| SearchItem {
            message: hit.message.into(),
            next_run: hit.next_run.as_ref().map(DateTime::<FixedOffset>::to_rfc3339),
        })
        .collect();
    Ok(Json(SearchResponse {
        count: messages.len(),
        messages,
    }))
}

/// GET /messages/{id}
async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageView>, ApiError> {
    let message = call(&state.broker, |reply| SchedulerCommand::Get { id, reply })
        .await?
        .map_err(IntoApiError::into_api_error)?;
    Ok(Json(message.into()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCancelResponse {
    pub deleted: usize,
    pub message_ids: Vec<String>,
}

/// DELETE /messages/bulk?prefix=&contains=
///
/// Filters may also come as a JSON body. Query parameters win when both
/// are present.
async fn bulk_cancel(
    State(state): State<AppState>,
    Query(query): Query<Filters>,
    body: Bytes,
) -> Result<Json<BulkCancelResponse>, ApiError> {
    let filters = if !query.is_empty() || body.is_empty() {
        query
    } else {
        serde_json::from_slice::<Filters>(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid filter body: {e}")))?
    };
    let selector = filters.into_selector()?;

    let message_ids = call(&state.broker, |reply| SchedulerCommand::BulkCancel {
        selector,
        reply,
    })
    .await?
    .map_err(IntoApiError::into_api_error)?;

    info!(deleted = message_ids.len(), "bulk cancel via HTTP");
    Ok(Json(BulkCancelResponse {
        deleted: message_ids.len(),
        message_ids,
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub pending: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    /// A scheduler that cannot answer (busy or stopped) is reported in the
    /// body like an unreachable store.
    fn from_report(report: Result<HealthReport, ApiError>) -> Self {
        match report {
            Ok(HealthReport {
                store: StoreHealth::Connected { .. },
                pending,
            }) => HealthResponse {
                status: "healthy",
                store: "connected",
                pending,
                error: None,
            },
            Ok(HealthReport {
                store: StoreHealth::Disconnected { error },
                pending,
            }) => HealthResponse {
                status: "unhealthy",
                store: "disconnected",
                pending,
                error: Some(error),
            },
            Err(e) => HealthResponse {
                status: "unhealthy",
                store: "unknown",
                pending: 0,
                error: Some(e.detail().to_string()),
            },
        }
    }
}

/// GET /health. Always 200; the body says whether the store is reachable.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = call(&state.broker, |reply| SchedulerCommand::HealthCheck { reply }).await;
    Json(HealthResponse::from_report(report))
}
