use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("Chat transport error")]
    Transport(#[from] TransportError),

    #[error("Payment schedule error")]
    Schedule(#[from] ScheduleError),

    #[error("Authentication failed")]
    Auth(#[from] AuthError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Database lock poisoned")]
    Poisoned,

    #[error("Storage operation timed out: {operation}")]
    Timeout { operation: &'static str },
}

/// Chat transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request to chat API failed")]
    Request(#[source] reqwest::Error),

    #[error("Chat API rejected request (status {status}): {description}")]
    Api { status: u16, description: String },

    #[error("Invalid response from chat API")]
    InvalidResponse(#[source] reqwest::Error),
}

/// Amortization input errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Principal must be positive")]
    NonPositivePrincipal,

    #[error("Annual rate must not be negative")]
    NegativeRate,

    #[error("Term must be at least one month")]
    EmptyTerm,

    #[error("Arithmetic overflow while computing schedule")]
    Overflow,
}

/// Token and init-data errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Malformed token")]
    MalformedToken,

    #[error("Token signature mismatch")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Malformed init data")]
    MalformedInitData,

    #[error("Init data is missing field: {field}")]
    MissingField { field: &'static str },

    #[error("Init data hash mismatch")]
    HashMismatch,

    #[error("Init data is stale")]
    StaleInitData,

    #[error("Invalid user payload in init data")]
    InvalidUser(#[source] serde_json::Error),
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InvalidRequest {
            message: message.into(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::InvalidRequest { .. } | ServiceError::Schedule(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Unauthorized { .. } | ServiceError::Auth(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Database(DatabaseError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Transport(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NotFound { .. } => "not_found",
            ServiceError::Database(DatabaseError::Timeout { .. }) => "storage_timeout",
            ServiceError::Database(_) => "database_error",
            ServiceError::Transport(_) => "transport_error",
            ServiceError::Schedule(_) => "invalid_schedule",
            ServiceError::Auth(_) => "auth_failed",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Unauthorized { .. } => "unauthorized",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        // Storage and internal details stay in the logs
        let message = if status.is_server_error() {
            tracing::error!(error = %format_error_chain(&self), "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let response = ErrorResponse {
            message,
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error with its full `source()` chain, for log lines.
pub fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let err = ServiceError::NotFound {
            entity: "Credit",
            id: 7,
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Credit not found: 7");

        let err = ServiceError::from(DatabaseError::Timeout {
            operation: "list_todos",
        });
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.error_code(), "storage_timeout");

        let err = ServiceError::from(AuthError::Expired);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_error_chain() {
        let err = ServiceError::from(DatabaseError::Migration {
            message: "no such table".to_string(),
        });
        assert_eq!(
            format_error_chain(&err),
            "Database error: Migration failed: no such table"
        );
    }
}
