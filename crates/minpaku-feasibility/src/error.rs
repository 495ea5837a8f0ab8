use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::geocode::GeocodeError;
use crate::workflows::legal::FollowupError;
use crate::workflows::ocr::OcrError;
use crate::workflows::session::{PipelineError, SessionError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Geocode(GeocodeError),
    Session(SessionError),
    InvalidInput(String),
}

impl AppError {
    /// Bad input is the caller's fault, provider failures are upstream.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Geocode(GeocodeError::InvalidCoordinate { .. }) => StatusCode::BAD_REQUEST,
            AppError::Geocode(_) => StatusCode::BAD_GATEWAY,
            AppError::Session(err) => session_status(err),
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn session_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::InvalidTransition { .. }
        | SessionError::MissingUpload
        | SessionError::MissingAddress
        | SessionError::NoResults
        | SessionError::Pipeline(PipelineError::MissingAddress)
        | SessionError::Followup(FollowupError::EmptyQuestion) => StatusCode::BAD_REQUEST,
        SessionError::Ocr(OcrError::Oracle(_)) => StatusCode::BAD_GATEWAY,
        SessionError::Ocr(_) => StatusCode::BAD_REQUEST,
        SessionError::Pipeline(PipelineError::Geocode(_)) | SessionError::Followup(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Geocode(err) => write!(f, "geocoding error: {}", err),
            AppError::Session(err) => write!(f, "feasibility error: {}", err),
            AppError::InvalidInput(message) => write!(f, "invalid input: {}", message),
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
            AppError::Geocode(err) => Some(err),
            AppError::Session(err) => Some(err),
            AppError::InvalidInput(_) => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
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

impl From<GeocodeError> for AppError {
    fn from(value: GeocodeError) -> Self {
        Self::Geocode(value)
    }
}

impl From<SessionError> for AppError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Session(SessionError::Pipeline(value))
    }
}
