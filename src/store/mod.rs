//! Record store and file bucket seams.
//!
//! The service never builds its own clients: `AppState` receives one
//! `RecordStore` and one `FileBucket` at startup. Two backends exist:
//!   - `supabase`: PostgREST tables + Storage API over HTTP
//!   - `memory`: process-local maps, used without remote config and in tests

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Lesson, NewLesson, NewQuestion, NewTest, Question, Test, UploadedFile};

pub mod memory;
pub mod supabase;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error(transparent)]
  Http(#[from] reqwest::Error),

  #[error("{backend} HTTP {status}: {message}")]
  Status { backend: &'static str, status: u16, message: String },

  #[error(transparent)]
  Serde(#[from] serde_json::Error),

  #[error("Object not found: {0}")]
  ObjectNotFound(String),

  #[error("Invalid URL: {0}")]
  InvalidUrl(String),

  #[error("Insert returned no row for {0}")]
  EmptyInsert(&'static str),

  #[error("Lesson {0} has no owner")]
  MissingOwner(String),
}

/// Column the lesson list is ordered by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonSort {
  Title,
  #[default]
  CreatedAt,
}

impl LessonSort {
  pub fn column(&self) -> &'static str {
    match self {
      LessonSort::Title => "title",
      LessonSort::CreatedAt => "created_at",
    }
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
  Asc,
  #[default]
  Desc,
}

/// Lesson, test and question records.
#[async_trait]
pub trait RecordStore: Send + Sync {
  async fn get_lesson(&self, id: &str) -> Result<Option<Lesson>, StoreError>;
  async fn list_lessons(&self, sort: LessonSort, direction: SortDirection) -> Result<Vec<Lesson>, StoreError>;
  async fn create_lesson(&self, lesson: NewLesson) -> Result<Lesson, StoreError>;

  async fn insert_test(&self, test: NewTest) -> Result<Test, StoreError>;
  async fn get_test(&self, id: &str) -> Result<Option<Test>, StoreError>;
  async fn list_tests(&self, lesson_id: &str) -> Result<Vec<Test>, StoreError>;

  async fn insert_questions(&self, questions: Vec<NewQuestion>) -> Result<(), StoreError>;
  async fn list_questions(&self, test_id: &str) -> Result<Vec<Question>, StoreError>;
}

/// Blob storage addressed by slash-separated paths.
#[async_trait]
pub trait FileBucket: Send + Sync {
  /// Direct children of `prefix` (files only).
  async fn list(&self, prefix: &str) -> Result<Vec<UploadedFile>, StoreError>;
  async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError>;
  /// Writes `bytes` at `path`, replacing any object already there.
  async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError>;
  async fn remove(&self, paths: &[String]) -> Result<(), StoreError>;
}
