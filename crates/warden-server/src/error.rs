//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler. Every variant renders as
/// `{"error": "<message>"}`; validation failures also carry `"fields"`.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("validation failed")]
  Validation(Vec<String>),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<warden_engine::Error> for ApiError {
  fn from(e: warden_engine::Error) -> Self {
    use warden_engine::Error as E;
    let message = e.to_string();
    match e {
      E::Validation(keys) => ApiError::Validation(keys),
      E::Denied { .. } => ApiError::Forbidden(message),
      E::NotFound(_) | E::UnknownType(_) | E::TypeDisabled(_) => ApiError::NotFound(message),
      E::NoPendingChangeset(_) => ApiError::Conflict(message),
      E::Store(inner) => ApiError::Store(inner),
      E::Access(inner) => ApiError::Store(Box::new(inner)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::Unauthorized => {
        let mut res =
          (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"warden\""),
        );
        return res;
      }
      ApiError::Validation(keys) => (
        StatusCode::UNPROCESSABLE_ENTITY,
        json!({ "error": self.to_string(), "fields": keys }),
      ),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, json!({ "error": m })),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, json!({ "error": m })),
      // Store detail stays in the log.
      ApiError::Store(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "internal server error" }))
      }
    };
    (status, Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn body(err: ApiError) -> (StatusCode, serde_json::Value) {
    let resp = err.into_response();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  #[tokio::test]
  async fn store_errors_hide_their_detail() {
    let inner = std::io::Error::other("no such table: instances");
    let (status, json) = body(ApiError::Store(Box::new(inner))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json, json!({ "error": "internal server error" }));
  }

  #[tokio::test]
  async fn validation_errors_list_fields() {
    let (status, json) = body(ApiError::Validation(vec!["title".into()])).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["fields"], json!(["title"]));
  }
}
