//! HTTP-facing error type. Game/backend failures never reach here: the round
//! controller folds them into the round state. This covers session plumbing only.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;

use crate::backend::SelectorError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error("Unknown session: {0}")]
  UnknownSession(String),
  #[error("A guess is already pending for this session")]
  GuessPending,
  #[error("Malformed request body: {0}")]
  BadRequest(String),
  #[error(transparent)]
  Backend(#[from] SelectorError),
  #[error("Internal error: {0}")]
  Internal(String),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::UnknownSession(_) => StatusCode::NOT_FOUND,
      ApiError::GuessPending => StatusCode::CONFLICT,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
  }
}
