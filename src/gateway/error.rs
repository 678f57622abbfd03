//! API error type.
//!
//! Every handler failure leaves through [`ApiError`], which pairs a status
//! code with a JSON [`ErrorResponse`]. Broker errors map as follows:
//!
//! | error | status | code |
//! |---|---|---|
//! | `Disabled` | 503 | `broker_disabled` |
//! | `PublishTimeout` | 504 | `broker_timeout` |
//! | `Connection`, `PublishRejected`, `NotConnected`, `Subscription` | 502 | `broker_unavailable` |
//! | `InvalidOptions` | 500 | `internal` |
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::gateway::model::ErrorResponse;
use crate::utils::BrokerError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn internal(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        match &err {
            BrokerError::Disabled => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "broker_disabled", err.to_string())
            }
            BrokerError::PublishTimeout { .. } => {
                ApiError::new(StatusCode::GATEWAY_TIMEOUT, "broker_timeout", err.to_string())
            }
            BrokerError::Connection { .. }
            | BrokerError::PublishRejected { .. }
            | BrokerError::NotConnected
            | BrokerError::Subscription { .. } => {
                ApiError::new(StatusCode::BAD_GATEWAY, "broker_unavailable", err.to_string())
            }
            // Internal details stay in the caller's log.
            BrokerError::InvalidOptions(_) => ApiError::internal("internal error"),
        }
    }
}
