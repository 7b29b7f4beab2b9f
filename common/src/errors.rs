use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Failures reported by an upstream weather source.
///
/// These are always returned as values; a refresh pass logs them and moves on
/// to the next city.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Upstream error: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("Rate limited by upstream")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Invalid coordinates: ({latitude}, {longitude})")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
}

impl FetchError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Transport failures and 5xx responses are worth another attempt.
    /// Quota exhaustion and client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Upstream {
                status: Some(status),
                ..
            } => *status >= 500,
            FetchError::Upstream { status: None, .. } => false,
            FetchError::RateLimited { .. } => false,
            FetchError::InvalidCoordinates { .. } => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {}", err))
        } else if err.is_decode() {
            Self::upstream(None, format!("malformed payload: {}", err))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::upstream(None, format!("malformed payload: {}", err))
    }
}

/// Structured error type for the service and its HTTP surface
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Authorization error: {0}")]
    AuthorizationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::DatabaseError(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::AuthError(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::AuthorizationError(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Fetch(FetchError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Fetch(FetchError::InvalidCoordinates { .. }) => StatusCode::BAD_REQUEST,
            AppError::Fetch(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DatabaseError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::AuthorizationError(_) => StatusCode::FORBIDDEN,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::ConfigError(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text shown to API consumers. Upstream and database details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Fetch(_) | AppError::DatabaseError(_) => {
                "Weather data is temporarily unavailable".to_string()
            }
            AppError::ConfigError(_) | AppError::InternalError(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = Json(ErrorResponse {
            error: self.public_message(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(FetchError::network("connection reset").is_retryable());
        assert!(FetchError::upstream(Some(503), "unavailable").is_retryable());
        assert!(!FetchError::upstream(Some(400), "bad request").is_retryable());
        assert!(!FetchError::upstream(None, "malformed payload").is_retryable());
        assert!(
            !FetchError::RateLimited {
                retry_after_secs: Some(30)
            }
            .is_retryable()
        );
    }

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            AppError::not_found("city 7").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::auth("missing token").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::authorization("not admin").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(FetchError::RateLimited {
                retry_after_secs: None
            })
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::database("pool timed out").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn database_details_are_not_exposed() {
        let err = AppError::database("relation \"city_readings\" does not exist");
        assert_eq!(
            err.public_message(),
            "Weather data is temporarily unavailable"
        );

        let err = AppError::not_found("No reading for city 2");
        assert_eq!(err.public_message(), "Not found: No reading for city 2");
    }

    #[test]
    fn malformed_json_maps_to_upstream_error() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = FetchError::from(parse_err);
        assert!(matches!(err, FetchError::Upstream { status: None, .. }));
    }
}
