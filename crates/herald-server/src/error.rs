use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use herald_core::error::{
    BrokerError, CancelError, CreateError, GetError, SearchError, SelectorError,
};
use herald_core::StorageError;

/// Error returned by every route. Rendered as `{"detail": msg}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::NotFound(msg)
            | ApiError::Unavailable(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), detail = self.detail(), "request failed");
        }
        let body = serde_json::json!({ "detail": self.detail() });
        (status, Json(body)).into_response()
    }
}

pub trait IntoApiError {
    fn into_api_error(self) -> ApiError;
}

impl IntoApiError for StorageError {
    fn into_api_error(self) -> ApiError {
        match self {
            StorageError::Unavailable(_) => ApiError::Unavailable(self.to_string()),
            StorageError::Serialization(_) => ApiError::Internal(self.to_string()),
        }
    }
}

impl IntoApiError for CreateError {
    fn into_api_error(self) -> ApiError {
        match self {
            CreateError::InvalidId | CreateError::InvalidTimestamp(_) => {
                ApiError::BadRequest(self.to_string())
            }
            CreateError::Storage(e) => e.into_api_error(),
        }
    }
}

impl IntoApiError for CancelError {
    fn into_api_error(self) -> ApiError {
        match self {
            CancelError::Storage(e) => e.into_api_error(),
        }
    }
}

impl IntoApiError for GetError {
    fn into_api_error(self) -> ApiError {
        match self {
            GetError::NotFound(id) => {
                ApiError::NotFound(format!("message with id '{id}' not found"))
            }
            GetError::Storage(e) => e.into_api_error(),
        }
    }
}

impl IntoApiError for SearchError {
    fn into_api_error(self) -> ApiError {
        match self {
            SearchError::Storage(e) => e.into_api_error(),
        }
    }
}

impl IntoApiError for SelectorError {
    fn into_api_error(self) -> ApiError {
        ApiError::BadRequest(self.to_string())
    }
}

impl IntoApiError for BrokerError {
    fn into_api_error(self) -> ApiError {
        match self {
            BrokerError::ChannelFull => ApiError::Unavailable("scheduler overloaded".to_string()),
            BrokerError::ChannelDisconnected => {
                ApiError::Unavailable("scheduler unavailable".to_string())
            }
            BrokerError::SchedulerSpawn(msg) => ApiError::Internal(msg),
            BrokerError::SchedulerPanicked => ApiError::Internal("scheduler panicked".to_string()),
        }
    }
}
