//! Mapping of outcomes and errors to HTTP responses.

use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use http::StatusCode;
use log::error;
use serde_json::json;
use tower_sessions::Session;

use crate::backend::flash;
use crate::report::ReportError;
use crate::services::{LoginError, ServiceError};

pub const PERMISSION_DENIED: &str = "Permission denied";
pub const LOGIN_ERROR: &str = "Invalid username or password";
pub const INTERNAL_ERROR: &str = "Internal server error";

pub const DASHBOARD: &str = "/dashboard";
pub const LOGIN: &str = "/login";

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn internal(err: &dyn std::error::Error) -> Response {
    error!("Request failed: {err}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            ServiceError::AccessDenied(_) => Redirect::to(DASHBOARD).into_response(),
            ServiceError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "errors": errors })),
            )
                .into_response(),
            ServiceError::NotFound { .. } => json_error(StatusCode::NOT_FOUND, self.to_string()),
            ServiceError::InUse { .. } => json_error(StatusCode::CONFLICT, self.to_string()),
            ServiceError::DBError(_) | ServiceError::Authorization(_) | ServiceError::Hash(_) => {
                internal(&self)
            }
        }
    }
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        match self {
            LoginError::InvalidCredentials => json_error(StatusCode::UNAUTHORIZED, LOGIN_ERROR),
            LoginError::Store(_) | LoginError::Hash(_) => internal(&self),
        }
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        internal(&self)
    }
}

pub fn internal_session_error(err: tower_sessions::session::Error) -> Response {
    internal(&err)
}

/// Answers a failed operation. A refusal is reported on the dashboard.
pub async fn failure(session: &Session, err: ServiceError) -> Response {
    if let ServiceError::AccessDenied(_) = err {
        flash::push(session, PERMISSION_DENIED).await;
    }
    err.into_response()
}

/// Answers a successful form: flash `message` and go back to `listing`.
pub async fn done(session: &Session, message: impl Into<String>, listing: &str) -> Response {
    flash::push(session, message).await;
    Redirect::to(listing).into_response()
}
