use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::readings::{PolicyError, SaveError, StoreError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

/// Failures surfaced by the inspection service, from startup through a readings run.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Policy(PolicyError),
    Readings(SaveError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Policy(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Readings(err) => readings_status(err),
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn readings_status(error: &SaveError) -> StatusCode {
    match error {
        SaveError::Validation(_) | SaveError::Deficiency(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SaveError::UnsafeOperation(_) | SaveError::Cancelled | SaveError::AlreadySaving(_) => {
            StatusCode::CONFLICT
        }
        SaveError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
        SaveError::Stage { .. } | SaveError::Store(_) => StatusCode::BAD_GATEWAY,
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Policy(err) => write!(f, "policy table error: {}", err),
            AppError::Readings(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Policy(err) => Some(err),
            AppError::Readings(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let stage = match &self {
            AppError::Readings(err) => err.failed_stage().map(|stage| stage.label()),
            _ => None,
        };

        let body = Json(json!({ "error": self.to_string(), "stage": stage }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<PolicyError> for AppError {
    fn from(value: PolicyError) -> Self {
        Self::Policy(value)
    }
}

impl From<SaveError> for AppError {
    fn from(value: SaveError) -> Self {
        Self::Readings(value)
    }
}
