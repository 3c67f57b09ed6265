use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::generate::GenerateError;
use crate::protocol::ErrorOut;
use crate::quiz::QuizError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Generate(#[from] GenerateError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Quiz(#[from] QuizError),

  #[error("{0}")]
  BadRequest(&'static str),

  #[error("{0}")]
  NotFound(&'static str),
}

fn reply(status: StatusCode, message: impl Into<String>) -> Response {
  (status, Json(ErrorOut { error: message.into() })).into_response()
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self {
      Self::Generate(GenerateError::MissingFields) => reply(StatusCode::BAD_REQUEST, "Missing required fields."),
      Self::Generate(GenerateError::LessonNotFound(_)) => reply(StatusCode::NOT_FOUND, "Lesson not found."),
      Self::Generate(e) => {
        error!(target: "generation", error = %e, "Error generating test");
        reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate test.")
      }
      Self::Store(StoreError::ObjectNotFound(_)) => reply(StatusCode::NOT_FOUND, "File not found."),
      Self::Store(e) => {
        error!(target: "storage", error = %e, "Storage request failed");
        reply(StatusCode::INTERNAL_SERVER_ERROR, "Storage request failed.")
      }
      Self::Quiz(e) => reply(StatusCode::CONFLICT, e.to_string()),
      Self::BadRequest(msg) => reply(StatusCode::BAD_REQUEST, msg),
      Self::NotFound(msg) => reply(StatusCode::NOT_FOUND, msg),
    }
  }
}
