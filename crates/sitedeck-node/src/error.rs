//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sitedeck_core::SiteError;

pub type ApiResult<T> = Result<T, ApiError>;

/// A control plane failure rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub SiteError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SiteError::NotFound { .. } => StatusCode::NOT_FOUND,
            SiteError::AlreadyExists { .. } | SiteError::Conflict { .. } => StatusCode::CONFLICT,
            SiteError::Engine { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<SiteError> for ApiError {
    fn from(err: SiteError) -> Self {
        ApiError(err)
    }
}
