use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::models::{FieldKey, FieldKind};

/// The three calls the plugin host exposes for this plugin's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Load,
    Save,
    Restart,
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteOp::Load => "load config",
            RemoteOp::Save => "save config",
            RemoteOp::Restart => "restart",
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("field {field} expects a {expected} value")]
    TypeMismatch { field: FieldKey, expected: FieldKind },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: FieldKey, reason: String },
    #[error("a save is already in flight")]
    SaveInFlight,
    #[error("a load is in flight")]
    LoadInFlight,
    #[error("no save handler registered for pre-install mode")]
    NoSaveHandler,
    #[error("invalid remote base url: {0}")]
    InvalidBaseUrl(String),
    #[error("{op} request failed: {message}")]
    Request { op: RemoteOp, message: String },
    #[error("{op} returned HTTP {status}: {body}")]
    Http { op: RemoteOp, status: u16, body: String },
    #[error("{op} response could not be decoded: {message}")]
    Decode { op: RemoteOp, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// The remote call that produced this error, if it came from the remote store.
    pub fn op(&self) -> Option<RemoteOp> {
        match self {
            ConfigError::Request { op, .. }
            | ConfigError::Http { op, .. }
            | ConfigError::Decode { op, .. } => Some(*op),
            _ => None,
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ConfigError::UnknownField(_) => (StatusCode::NOT_FOUND, "NoSuchField"),
            ConfigError::TypeMismatch { .. } => (StatusCode::BAD_REQUEST, "TypeMismatch"),
            ConfigError::InvalidValue { .. } => (StatusCode::BAD_REQUEST, "InvalidValue"),
            ConfigError::SaveInFlight => (StatusCode::CONFLICT, "SaveInFlight"),
            ConfigError::LoadInFlight => (StatusCode::CONFLICT, "LoadInFlight"),
            ConfigError::Request { .. } => (StatusCode::BAD_GATEWAY, "RemoteUnreachable"),
            ConfigError::Http { .. } => (StatusCode::BAD_GATEWAY, "RemoteRejected"),
            ConfigError::Decode { .. } => (StatusCode::BAD_GATEWAY, "RemoteMalformed"),
            ConfigError::InvalidBaseUrl(_)
            | ConfigError::NoSaveHandler
            | ConfigError::Io(_)
            | ConfigError::Json(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError")
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
    message: String,
}

impl IntoResponse for ConfigError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = ErrorResponse {
            error: code.to_string(),
            code: code.to_string(),
            message: self.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
