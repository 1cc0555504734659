use std::fmt::Display;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
#[cfg_attr(test, derive(PartialEq))]
#[error(transparent)]
// As long as the struct member is private, we force people to use the `new` method and log the error.
// We arc `ErrorDetails` to keep the error cheap to clone and small on the stack.
pub struct Error(Arc<ErrorDetails>);

impl Error {
    pub fn new(details: ErrorDetails) -> Self {
        details.log();
        Error(Arc::new(details))
    }

    pub fn status_code(&self) -> StatusCode {
        self.0.status_code()
    }

    pub fn get_details(&self) -> &ErrorDetails {
        &self.0
    }

    pub fn log(&self) {
        self.0.log();
    }
}

impl From<ErrorDetails> for Error {
    fn from(details: ErrorDetails) -> Self {
        Error::new(details)
    }
}

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq))]
pub enum ErrorDetails {
    ApiKeyMissing {
        provider_name: String,
    },
    AppState {
        message: String,
    },
    Config {
        message: String,
    },
    InferenceClient {
        status_code: Option<StatusCode>,
        message: String,
        provider_type: String,
    },
    InferenceServer {
        message: String,
        provider_type: String,
    },
    InvalidRequest {
        message: String,
    },
    JudgeEvaluation {
        message: String,
    },
    Observability {
        message: String,
    },
    PostgresConnection {
        message: String,
    },
    PostgresMigration {
        message: String,
    },
    PostgresQuery {
        message: String,
    },
    Serialization {
        message: String,
    },
    UnexpectedResponseShape {
        message: String,
        provider_type: String,
    },
}

impl ErrorDetails {
    /// The HTTP status code the error maps to at the request boundary.
    ///
    /// Provider failures deliberately surface as 500: the request is aborted
    /// with no partial persistence, and the body carries the error message.
    fn status_code(&self) -> StatusCode {
        match self {
            ErrorDetails::ApiKeyMissing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::AppState { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InferenceClient { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InferenceServer { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::JudgeEvaluation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::Observability { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::PostgresConnection { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::PostgresMigration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::PostgresQuery { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::Serialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::UnexpectedResponseShape { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The tracing level the error is logged at when constructed.
    fn level(&self) -> tracing::Level {
        match self {
            ErrorDetails::ApiKeyMissing { .. } => tracing::Level::ERROR,
            ErrorDetails::AppState { .. } => tracing::Level::ERROR,
            ErrorDetails::Config { .. } => tracing::Level::ERROR,
            ErrorDetails::InferenceClient { .. } => tracing::Level::ERROR,
            ErrorDetails::InferenceServer { .. } => tracing::Level::ERROR,
            ErrorDetails::InvalidRequest { .. } => tracing::Level::WARN,
            // Judge failures are absorbed with a fallback score, so they only warrant a warning
            ErrorDetails::JudgeEvaluation { .. } => tracing::Level::WARN,
            ErrorDetails::Observability { .. } => tracing::Level::ERROR,
            ErrorDetails::PostgresConnection { .. } => tracing::Level::ERROR,
            ErrorDetails::PostgresMigration { .. } => tracing::Level::ERROR,
            ErrorDetails::PostgresQuery { .. } => tracing::Level::ERROR,
            ErrorDetails::Serialization { .. } => tracing::Level::ERROR,
            ErrorDetails::UnexpectedResponseShape { .. } => tracing::Level::ERROR,
        }
    }

    pub fn log(&self) {
        match self.level() {
            tracing::Level::ERROR => tracing::error!("{self}"),
            tracing::Level::WARN => tracing::warn!("{self}"),
            tracing::Level::INFO => tracing::info!("{self}"),
            tracing::Level::DEBUG => tracing::debug!("{self}"),
            tracing::Level::TRACE => tracing::trace!("{self}"),
        }
    }
}

impl Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorDetails::ApiKeyMissing { provider_name } => {
                write!(f, "API key missing for provider: {provider_name}")
            }
            ErrorDetails::AppState { message } => {
                write!(f, "Error initializing AppState: {message}")
            }
            ErrorDetails::Config { message } => {
                write!(f, "Config error: {message}")
            }
            ErrorDetails::InferenceClient {
                status_code,
                message,
                provider_type,
            } => match status_code {
                Some(status_code) => write!(
                    f,
                    "Error from {provider_type} client (status {status_code}): {message}"
                ),
                None => write!(f, "Error from {provider_type} client: {message}"),
            },
            ErrorDetails::InferenceServer {
                message,
                provider_type,
            } => {
                write!(f, "Error from {provider_type} server: {message}")
            }
            ErrorDetails::InvalidRequest { message } => {
                write!(f, "{message}")
            }
            ErrorDetails::JudgeEvaluation { message } => {
                write!(f, "Judge evaluation error: {message}")
            }
            ErrorDetails::Observability { message } => {
                write!(f, "Observability error: {message}")
            }
            ErrorDetails::PostgresConnection { message } => {
                write!(f, "Error connecting to Postgres: {message}")
            }
            ErrorDetails::PostgresMigration { message } => {
                write!(f, "Error running Postgres migration: {message}")
            }
            ErrorDetails::PostgresQuery { message } => {
                write!(f, "Error running Postgres query: {message}")
            }
            ErrorDetails::Serialization { message } => {
                write!(f, "Error serializing or deserializing: {message}")
            }
            ErrorDetails::UnexpectedResponseShape {
                message,
                provider_type,
            } => {
                write!(f, "Unexpected {provider_type} response format: {message}")
            }
        }
    }
}

impl IntoResponse for Error {
    /// Convert the error into an Axum response with a human-readable `error` body.
    fn into_response(self) -> Response {
        let body = json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorDetails::Serialization {
            message: err.to_string(),
        })
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::new(ErrorDetails::PostgresQuery {
            message: err.to_string(),
        })
    }
}
