use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;

use crate::payments::PaymentError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// A collaborator (chain or database) failed; `reason` is its message.
    #[error("{error}: {reason}")]
    Upstream { error: &'static str, reason: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn upstream(error: &'static str, reason: impl std::fmt::Display) -> Self {
        ApiError::Upstream {
            error,
            reason: reason.to_string(),
        }
    }

    /// Maps a payment-core failure, labelling chain and database errors with `failure`.
    pub fn from_payment(err: PaymentError, failure: &'static str) -> Self {
        match err {
            PaymentError::UserNotFound(_) => ApiError::not_found("User not found"),
            PaymentError::PostNotFound(_) => ApiError::not_found("Post not found"),
            PaymentError::TransactionNotFound(_) => ApiError::not_found("Transaction not found"),
            PaymentError::AlreadyRefunded(_) => ApiError::bad_request("Transaction already refunded"),
            err @ PaymentError::RefundInProgress(_) => ApiError::Conflict(err.to_string()),
            err @ (PaymentError::NotRefundable { .. }
            | PaymentError::InvalidAmount(_)
            | PaymentError::PostOwnerMismatch { .. }) => {
                ApiError::BadRequest(err.to_string())
            }
            PaymentError::Chain(e) => ApiError::upstream(failure, e),
            PaymentError::Database(e) => ApiError::upstream(failure, format!("{:#}", e)),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Upstream { error, reason } => json!({ "error": error, "reason": reason }),
            other => json!({ "error": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
