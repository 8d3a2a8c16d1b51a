//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`.
//!
//! Responses are JSON: `{"error": "<code>", "message": "<text>"}`, plus
//! `reason`, `removed_items` and `version` for checkout conflicts.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{CartError, LocationError, SyncError, ZoneAdminError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Location input or geocoding failed.
    #[error(transparent)]
    Location(#[from] LocationError),

    /// Cart operation failed.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Zone management failed.
    #[error(transparent)]
    Zone(#[from] ZoneAdminError),

    /// Zone sweep failed.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

const INTERNAL: (StatusCode, &str) = (StatusCode::INTERNAL_SERVER_ERROR, "internal_error");

fn classify_repository(e: &RepositoryError) -> (StatusCode, &'static str) {
    match e {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        RepositoryError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => INTERNAL,
    }
}

fn classify_sync(e: &SyncError) -> (StatusCode, &'static str) {
    match e {
        SyncError::ZoneNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        SyncError::Repository(e) => classify_repository(e),
        SyncError::Task(_) => INTERNAL,
    }
}

impl AppError {
    /// HTTP status and machine-readable error code.
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Database(e) => classify_repository(e),
            Self::Location(LocationError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            Self::Location(LocationError::GeocodeFailure(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "geocode_failure")
            }
            Self::Cart(e) => match e {
                CartError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                CartError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                CartError::Closed(_) => (StatusCode::CONFLICT, "cart_closed"),
                CartError::NoZone => (StatusCode::CONFLICT, "no_zone"),
                CartError::OutsideZone { .. } => (StatusCode::CONFLICT, "outside_zone"),
                CartError::InsufficientStock { .. } => (StatusCode::CONFLICT, "insufficient_stock"),
                CartError::CheckoutConflict { .. } => (StatusCode::CONFLICT, "checkout_conflict"),
                CartError::Repository(e) => classify_repository(e),
            },
            Self::Zone(e) => match e {
                ZoneAdminError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                ZoneAdminError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                ZoneAdminError::Repository(e) => classify_repository(e),
                ZoneAdminError::Sync(e) => classify_sync(e),
            },
            Self::Sync(e) => classify_sync(e),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Session(_) => INTERNAL,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            match &self {
                Self::NotFound(msg) => msg.clone(),
                other => other.to_string(),
            }
        };

        let body = match &self {
            Self::Cart(CartError::CheckoutConflict {
                reason,
                removed,
                version,
            }) => json!({
                "error": code,
                "message": message,
                "reason": reason.as_str(),
                "removed_items": removed,
                "version": version,
            }),
            _ => json!({ "error": code, "message": message }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}
