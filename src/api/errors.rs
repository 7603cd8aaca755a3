//! API Error Handling
//!
//! Structured error responses with status codes and request tracking.

use crate::errors::{GameError, WheelhouseError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use super::middleware::RequestId;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// INVALID_PHASE, NO_BETS, INSUFFICIENT_BALANCE, NOT_FOUND,
    /// VALIDATION_ERROR or INTERNAL_ERROR
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    Game(GameError),
    InternalError(String),
}

impl ApiError {
    pub fn game(request_id: &RequestId, error: GameError) -> Self {
        Self {
            kind: ApiErrorKind::Game(error),
            request_id: request_id.0.clone(),
        }
    }

    pub fn bad_request(request_id: &RequestId, message: impl Into<String>) -> Self {
        Self::game(request_id, GameError::Validation(message.into()))
    }

    pub fn internal(request_id: &RequestId, error: WheelhouseError) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(error.to_string()),
            request_id: request_id.0.clone(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.kind {
            ApiErrorKind::Game(e) => match e {
                GameError::InvalidPhase { .. } | GameError::NoBets => StatusCode::CONFLICT,
                GameError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
                GameError::NotFound(_) => StatusCode::NOT_FOUND,
                GameError::Validation(_) => StatusCode::BAD_REQUEST,
            },
            ApiErrorKind::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::Game(e) => write!(f, "[{}] {}: {}", self.request_id, e.code(), e),
            ApiErrorKind::InternalError(msg) => write!(f, "[{}] Internal Error: {}", self.request_id, msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message, details) = match self.kind {
            ApiErrorKind::Game(e) => {
                let details = match &e {
                    GameError::InvalidPhase { expected, actual } => {
                        Some(json!({ "expected": expected, "actual": actual }))
                    }
                    GameError::InsufficientBalance { required, available } => {
                        Some(json!({ "required": required, "available": available }))
                    }
                    _ => None,
                };
                (e.code(), e.to_string(), details)
            }
            ApiErrorKind::InternalError(msg) => {
                tracing::error!(request_id = %self.request_id, error = %msg, "request failed");
                ("INTERNAL_ERROR", msg, None)
            }
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        });

        (status, body).into_response()
    }
}
