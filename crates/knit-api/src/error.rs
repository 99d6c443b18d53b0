//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("temporarily unavailable: {0}")]
  Unavailable(String),

  #[error("internal error: {0}")]
  Internal(String),
}

impl From<knit_core::Error> for ApiError {
  fn from(e: knit_core::Error) -> Self {
    use knit_core::Error as E;
    match e {
      E::MissingIdentifier => ApiError::BadRequest(e.to_string()),
      // Corruption signals need operator attention, not client detail.
      E::LinkDepthExceeded(_) | E::DanglingLink { .. } => {
        tracing::error!(error = %e, "contact graph consistency violation");
        ApiError::Internal("contact store is inconsistent".to_string())
      }
      E::Conflict | E::ConflictExhausted(_) => {
        ApiError::Unavailable(e.to_string())
      }
      E::Store(inner) => {
        tracing::error!(error = %inner, "store failure");
        ApiError::Internal(inner.to_string())
      }
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
      ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
