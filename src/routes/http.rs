//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs its parameters and basic result info.

use std::sync::Arc;
use axum::{
  body::Bytes,
  extract::{
    rejection::{JsonRejection, QueryRejection},
    Path, Query, State,
  },
  http::{header::CONTENT_TYPE, HeaderMap},
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::error::ApiError;
use crate::domain::{lesson_file_path, lesson_prefix, Lesson, NewLesson, Question, Test, UploadedFile};
use crate::generate::GenerateTestRequest;
use crate::protocol::*;
use crate::quiz::QuizResults;
use crate::state::AppState;
use crate::store::StoreError;

fn bad_body(e: JsonRejection) -> ApiError {
  warn!(target: "nurse_mentor", error = %e, "Rejected request body");
  ApiError::BadRequest("Invalid request body.")
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, backend: state.backend, model: state.model.is_some() })
}

#[instrument(level = "info", skip(state, payload))]
pub async fn http_post_generate_test(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<GenerateTestRequest>, JsonRejection>,
) -> Result<Json<GenerateTestOut>, ApiError> {
  let Json(body) = payload.map_err(bad_body)?;
  info!(target: "generation", lesson_id = ?body.lesson_id, test_type = ?body.test_type, num_questions = ?body.num_questions, question_types = ?body.question_types, "Generate test requested");

  let spec = body.validate()?;
  let out = state.generator().generate(spec).await?;
  Ok(Json(GenerateTestOut {
    message: "Test and questions generated and inserted successfully.".into(),
    test_id: out.test_id,
    dropped_blocks: out.dropped,
  }))
}

//
// Lessons
//

#[instrument(level = "info", skip(state))]
pub async fn http_list_lessons(
  State(state): State<Arc<AppState>>,
  query: Result<Query<LessonsQuery>, QueryRejection>,
) -> Result<Json<Vec<Lesson>>, ApiError> {
  let Query(q) = query.map_err(|e| {
    warn!(target: "nurse_mentor", error = %e, "Rejected lesson query");
    ApiError::BadRequest("Invalid query parameters.")
  })?;
  let lessons = state.store
    .list_lessons(q.sort.unwrap_or_default(), q.direction.unwrap_or_default())
    .await?;
  Ok(Json(lessons))
}

#[instrument(level = "info", skip(state, payload))]
pub async fn http_create_lesson(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<CreateLessonIn>, JsonRejection>,
) -> Result<Json<Lesson>, ApiError> {
  let Json(body) = payload.map_err(bad_body)?;
  if body.title.trim().is_empty() || body.created_by.trim().is_empty() {
    return Err(ApiError::BadRequest("Missing required fields."));
  }
  let id = body.id.filter(|id| !id.is_empty()).unwrap_or_else(|| Uuid::new_v4().to_string());
  let lesson = state.store
    .create_lesson(NewLesson { id, title: body.title, created_by: body.created_by })
    .await?;
  info!(target: "nurse_mentor", id = %lesson.id, "Lesson created");
  Ok(Json(lesson))
}

async fn find_lesson(state: &AppState, lesson_id: &str) -> Result<(Lesson, String), ApiError> {
  let lesson = state.store
    .get_lesson(lesson_id)
    .await?
    .ok_or(ApiError::NotFound("Lesson not found."))?;
  let owner = lesson
    .owner()
    .ok_or_else(|| StoreError::MissingOwner(lesson.id.clone()))?
    .to_string();
  Ok((lesson, owner))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_lesson(
  State(state): State<Arc<AppState>>,
  Path(lesson_id): Path<String>,
) -> Result<Json<LessonDetailOut>, ApiError> {
  let (lesson, creator) = find_lesson(&state, &lesson_id).await?;
  let files = state.bucket.list(&lesson_prefix(&creator, &lesson.id)).await?;
  Ok(Json(LessonDetailOut { lesson, files }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_files(
  State(state): State<Arc<AppState>>,
  Path(lesson_id): Path<String>,
) -> Result<Json<Vec<UploadedFile>>, ApiError> {
  let (lesson, creator) = find_lesson(&state, &lesson_id).await?;
  let files = state.bucket.list(&lesson_prefix(&creator, &lesson.id)).await?;
  Ok(Json(files))
}

fn check_file_name(name: &str) -> Result<(), ApiError> {
  if name.is_empty() || name.contains('/') || name == "." || name == ".." {
    return Err(ApiError::BadRequest("Invalid file name."));
  }
  Ok(())
}

/// Same-name uploads replace the existing object.
#[instrument(level = "info", skip(state, headers, body), fields(size = body.len()))]
pub async fn http_upload_file(
  State(state): State<Arc<AppState>>,
  Path((lesson_id, name)): Path<(String, String)>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<UploadedFile>, ApiError> {
  check_file_name(&name)?;
  let (lesson, creator) = find_lesson(&state, &lesson_id).await?;
  let content_type = headers
    .get(CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .unwrap_or("application/octet-stream");

  let size = body.len() as u64;
  state.bucket
    .upload(&lesson_file_path(&creator, &lesson.id, &name), body.to_vec(), content_type)
    .await?;
  info!(target: "storage", lesson_id = %lesson.id, %name, size, "File uploaded");
  Ok(Json(UploadedFile { name, size, created_at: Some(chrono::Utc::now()) }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_file(
  State(state): State<Arc<AppState>>,
  Path((lesson_id, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
  check_file_name(&name)?;
  let (lesson, creator) = find_lesson(&state, &lesson_id).await?;
  state.bucket.remove(&[lesson_file_path(&creator, &lesson.id, &name)]).await?;
  info!(target: "storage", lesson_id = %lesson.id, %name, "File deleted");
  Ok(axum::http::StatusCode::NO_CONTENT)
}

//
// Tests and quiz attempts
//

#[instrument(level = "info", skip(state))]
pub async fn http_list_tests(
  State(state): State<Arc<AppState>>,
  Path(lesson_id): Path<String>,
) -> Result<Json<Vec<Test>>, ApiError> {
  Ok(Json(state.store.list_tests(&lesson_id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_questions(
  State(state): State<Arc<AppState>>,
  Path(test_id): Path<String>,
) -> Result<Json<Vec<Question>>, ApiError> {
  Ok(Json(state.store.list_questions(&test_id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_start_attempt(
  State(state): State<Arc<AppState>>,
  Path(test_id): Path<String>,
) -> Result<Json<AttemptOut>, ApiError> {
  let session = state.start_attempt(&test_id).await?.ok_or(ApiError::NotFound("Test not found."))?;
  Ok(Json(to_attempt_out(&session)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_attempt(
  State(state): State<Arc<AppState>>,
  Path(attempt_id): Path<String>,
) -> Result<Json<AttemptOut>, ApiError> {
  state.with_attempt(&attempt_id, |s| to_attempt_out(s))
    .await
    .map(Json)
    .ok_or(ApiError::NotFound("Attempt not found."))
}

#[instrument(level = "info", skip(state, payload))]
pub async fn http_post_answer(
  State(state): State<Arc<AppState>>,
  Path(attempt_id): Path<String>,
  payload: Result<Json<AnswerIn>, JsonRejection>,
) -> Result<Json<AttemptOut>, ApiError> {
  let Json(body) = payload.map_err(bad_body)?;
  let out = state
    .with_attempt(&attempt_id, |s| s.answer(body.answer).map(|_| to_attempt_out(s)))
    .await
    .ok_or(ApiError::NotFound("Attempt not found."))??;
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_next(
  State(state): State<Arc<AppState>>,
  Path(attempt_id): Path<String>,
) -> Result<Json<AttemptOut>, ApiError> {
  let out = state
    .with_attempt(&attempt_id, |s| s.next().map(|_| to_attempt_out(s)))
    .await
    .ok_or(ApiError::NotFound("Attempt not found."))??;
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_results(
  State(state): State<Arc<AppState>>,
  Path(attempt_id): Path<String>,
) -> Result<Json<QuizResults>, ApiError> {
  let results = state
    .with_attempt(&attempt_id, |s| s.results())
    .await
    .ok_or(ApiError::NotFound("Attempt not found."))??;
  info!(target: "quiz", attempt = %attempt_id, score = results.score, total = results.total, "Quiz results served");
  Ok(Json(results))
}
