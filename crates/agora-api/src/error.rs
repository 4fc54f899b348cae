//! API error type and [`axum::response::IntoResponse`] implementation.

use agora_core::Error;
use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::response::{JsonResponse, custom_error};

/// An error returned by a handler. Wraps the domain error and adds the
/// request-level failures a handler detects itself.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Domain(#[from] Error),

  #[error("bad request: {0}")]
  BadRequest(String),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::Domain(e) => match e {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::AccessDenied(_) => StatusCode::FORBIDDEN,
        Error::UnsupportedPermission(_) | Error::InvalidState(_) => StatusCode::BAD_REQUEST,
        Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::VersionConflict => StatusCode::CONFLICT,
        Error::PluginConnection | Error::PluginUnexpected => StatusCode::BAD_GATEWAY,
        Error::MailingFailed(_) | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    match self {
      Self::Domain(Error::Validation(errors)) => {
        (status, JsonResponse::fail_with(&errors)).into_response()
      }
      Self::Domain(ref e @ (Error::PluginConnection | Error::PluginUnexpected)) => {
        (status, custom_error(e)).into_response()
      }
      Self::Domain(ref e @ Error::Store(_)) => {
        tracing::error!(error = %e, "request failed");
        (status, Json(json!({ "error": e.to_string() }))).into_response()
      }
      other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
    }
  }
}
