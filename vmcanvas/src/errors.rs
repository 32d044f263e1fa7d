//! Error types for vmcanvas

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use openapi_server::models::EmptyEnvelope;
use thiserror::Error;
use tracing::error;

use crate::deploy::provision::ProvisionError;

/// Main error type for vmcanvas
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Key generation error: {0}")]
    KeygenError(String),

    #[error("Provisioning error: {0}")]
    ProvisionError(#[from] ProvisionError),

    #[error("Deployment already in progress for machine {0}")]
    DeploymentInProgress(String),

    #[error("Machine {0} is already deployed")]
    AlreadyDeployed(String),

    #[error("Deployment error: {0}")]
    DeployError(String),

    #[error("Selector error: {0}")]
    SelectorError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DeploymentInProgress(_) | AppError::AlreadyDeployed(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable, caller-facing message. External tool output stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg) => msg.clone(),
            AppError::NotFound(_) => "Machine not found".to_string(),
            AppError::KeygenError(_) => "SSH key generation failed".to_string(),
            AppError::ProvisionError(e) => e.public_message(),
            AppError::DeploymentInProgress(_) | AppError::AlreadyDeployed(_) => self.to_string(),
            AppError::SelectorError(_) => "Machine selection failed".to_string(),
            AppError::IoError(_) | AppError::JsonError(_) | AppError::StorageError(_) => {
                "Storage operation failed".to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(EmptyEnvelope::err(self.public_message()))).into_response()
    }
}
