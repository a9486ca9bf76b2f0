use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ledger::LedgerError;
use matching_engine::DeskError;
use persistence::StoreError;
use serde_json::json;
use thiserror::Error;

/// Central error type for the Gateway application
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<DeskError> for AppError {
    fn from(err: DeskError) -> Self {
        let message = err.to_string();
        match err {
            DeskError::InvalidQuantity(_) | DeskError::InvalidPrice(_) => AppError::BadRequest(message),
            DeskError::OrderNotFound(_) => AppError::NotFound(message),
            DeskError::NotOwner(_) => AppError::Forbidden(message),
            DeskError::AlreadyTerminal { .. } => AppError::Conflict(message),
            DeskError::InsufficientFunds { .. } => AppError::Unprocessable(message),
            DeskError::Ledger(err) => err.into(),
            DeskError::Store(err) => err.into(),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::FundsNotFound { .. } => AppError::NotFound(err.to_string()),
            LedgerError::Store(err) => err.into(),
            LedgerError::WrongUser { .. } => AppError::InternalError(anyhow::Error::new(err)),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Backend(msg) => AppError::ServiceUnavailable(format!("Record store: {msg}")),
            other => AppError::InternalError(anyhow::Error::new(other)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN"),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, "CONFLICT"),
            AppError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg, "UNPROCESSABLE")
            }
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                msg,
                "SERVICE_UNAVAILABLE",
            ),
            AppError::InternalError(err) => {
                tracing::error!(error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_ERROR",
                )
            }
        };

        let body = Json(json!({
            "error": code,
            "message": error_message
        }));

        (status, body).into_response()
    }
}
