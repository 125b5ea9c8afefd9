//! HTTP response types and utilities
//!
//! Every endpoint answers with the same [`ApiResponse`] envelope; errors are
//! mapped onto status codes in one place ([`handle_error`]).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{AppError, AppResult, CatalogError, FetchError, ScheduleError};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the operation was successful
    pub success: bool,
    /// Response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, String>>,
    /// Response timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            details: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            details: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn error_with_details(message: String, details: HashMap<String, String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            details: Some(details),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Convert an AppResult into an HTTP response
pub fn handle_result<T>(result: AppResult<T>) -> Response
where
    T: Serialize,
{
    match result {
        Ok(data) => ok(data),
        Err(error) => handle_error(error),
    }
}

/// Status code for an error
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Catalog(e) => match e {
            CatalogError::NotFound { .. } | CatalogError::EmptyCatalog => StatusCode::NOT_FOUND,
            CatalogError::InvalidArgument { .. } | CatalogError::MalformedRecord { .. } => {
                StatusCode::BAD_REQUEST
            }
        },
        AppError::Schedule(e) => match e {
            ScheduleError::Duplicate { .. } => StatusCode::CONFLICT,
            ScheduleError::InvalidSchedule { .. } => StatusCode::BAD_REQUEST,
            ScheduleError::NotFound { .. } => StatusCode::NOT_FOUND,
        },
        AppError::Fetch(e) => match e {
            FetchError::AlreadyInProgress { .. } => StatusCode::CONFLICT,
            FetchError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            FetchError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        },
        AppError::Parse { .. } => StatusCode::BAD_GATEWAY,
        AppError::Validation { .. } => StatusCode::BAD_REQUEST,
        AppError::Configuration { .. } | AppError::Io(_) | AppError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Convert AppError to appropriate HTTP response
pub fn handle_error(error: AppError) -> Response {
    let status = status_for(&error);
    let mut details = HashMap::new();
    let kind = match &error {
        AppError::Catalog(_) => "catalog",
        AppError::Schedule(_) => "schedule",
        AppError::Fetch(_) => "fetch",
        AppError::Parse { .. } => "parse",
        AppError::Validation { .. } => "validation",
        AppError::Configuration { .. } => "configuration",
        AppError::Io(_) => "io",
        AppError::Internal { .. } => "internal",
    };
    details.insert("kind".to_string(), kind.to_string());

    if status.is_server_error() {
        tracing::error!("Request failed: {}", error);
    } else {
        tracing::debug!("Request rejected: {}", error);
    }

    let response = ApiResponse::<()>::error_with_details(error.to_string(), details);
    (status, Json(response)).into_response()
}

/// Success response helpers
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

pub fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(message.to_string())),
    )
        .into_response()
}
