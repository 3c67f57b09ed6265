//! Supabase-compatible backend: PostgREST for records, Storage API for files.
//!
//! Both halves share one `reqwest::Client` and authenticate with the service
//! key. The key is never logged.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use super::{FileBucket, LessonSort, RecordStore, SortDirection, StoreError};
use crate::config::StorageSettings;
use crate::domain::{Lesson, NewLesson, NewQuestion, NewTest, Question, Test, UploadedFile};

const AGENT: &str = "nurse-mentor-backend/0.1";
// Storage list pages; lessons hold a handful of files.
const LIST_LIMIT: u32 = 1000;

#[derive(Clone)]
pub struct Supabase {
  client: reqwest::Client,
  base_url: Url,
  service_key: String,
  settings: StorageSettings,
}

impl Supabase {
  /// Construct from SUPABASE_URL + SUPABASE_SERVICE_KEY; None if either is missing.
  pub fn from_env(settings: StorageSettings) -> Option<Self> {
    let url = std::env::var("SUPABASE_URL").ok()?;
    let service_key = std::env::var("SUPABASE_SERVICE_KEY").ok()?;
    match Self::new(&url, service_key, settings) {
      Ok(s) => Some(s),
      Err(e) => {
        error!(target: "storage", error = %e, "Invalid Supabase configuration");
        None
      }
    }
  }

  pub fn new(url: &str, service_key: String, settings: StorageSettings) -> Result<Self, StoreError> {
    let base_url = Url::parse(url).map_err(|_| StoreError::InvalidUrl(url.to_string()))?;
    if base_url.cannot_be_a_base() {
      return Err(StoreError::InvalidUrl(url.to_string()));
    }
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()?;
    Ok(Self { client, base_url, service_key, settings })
  }

  pub fn base_url(&self) -> &str {
    self.base_url.as_str()
  }

  pub fn bucket(&self) -> &str {
    &self.settings.bucket
  }

  /// Base URL extended by path segments; each segment is percent-encoded.
  fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
    let mut url = self.base_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty();
      path.extend(segments);
    }
    url
  }

  fn table_url(&self, table: &str) -> Url {
    self.endpoint(["rest", "v1", table])
  }

  /// `storage/v1/object/{bucket}/{path...}`; the object path keeps its slashes.
  fn object_url(&self, path: &str) -> Url {
    let mut segments = vec!["storage", "v1", "object", self.settings.bucket.as_str()];
    segments.extend(path.split('/'));
    self.endpoint(segments)
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    self.client
      .request(method, url)
      .header(USER_AGENT, AGENT)
      .header("apikey", &self.service_key)
      .header(AUTHORIZATION, format!("Bearer {}", self.service_key))
  }

  async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>, StoreError> {
    let res = self.request(Method::GET, self.table_url(table)).query(query).send().await?;
    let res = check(res, "postgrest").await?;
    Ok(res.json().await?)
  }

  /// Insert one row and return it as stored (ids and timestamps filled in).
  async fn insert_returning<B: Serialize + ?Sized, T: DeserializeOwned>(
    &self,
    table: &str,
    what: &'static str,
    body: &B,
  ) -> Result<T, StoreError> {
    let res = self.request(Method::POST, self.table_url(table))
      .header(CONTENT_TYPE, "application/json")
      .header("Prefer", "return=representation")
      .json(body)
      .send()
      .await?;
    let res = check(res, "postgrest").await?;
    let mut rows: Vec<T> = res.json().await?;
    if rows.is_empty() {
      return Err(StoreError::EmptyInsert(what));
    }
    Ok(rows.swap_remove(0))
  }
}

/// Turn a non-2xx response into `StoreError::Status`, extracting the backend's message.
async fn check(res: Response, backend: &'static str) -> Result<Response, StoreError> {
  if res.status().is_success() {
    return Ok(res);
  }
  let status = res.status().as_u16();
  let body = res.text().await.unwrap_or_default();
  let message = extract_error_message(&body).unwrap_or(body);
  error!(target: "storage", %backend, status, %message, "Supabase request failed");
  Err(StoreError::Status { backend, status, message })
}

/// PostgREST reports `message`, Storage reports `message` or `error`.
fn extract_error_message(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EObj {
    #[serde(default)] message: Option<String>,
    #[serde(default)] error: Option<String>,
  }
  let e = serde_json::from_str::<EObj>(body).ok()?;
  e.message.or(e.error)
}

fn eq(value: &str) -> String {
  format!("eq.{}", value)
}

#[async_trait]
impl RecordStore for Supabase {
  #[instrument(level = "debug", skip(self))]
  async fn get_lesson(&self, id: &str) -> Result<Option<Lesson>, StoreError> {
    let rows: Vec<Lesson> = self
      .select(&self.settings.lessons_table, &[("select", "*".into()), ("id", eq(id))])
      .await?;
    Ok(rows.into_iter().next())
  }

  #[instrument(level = "debug", skip(self))]
  async fn list_lessons(&self, sort: LessonSort, direction: SortDirection) -> Result<Vec<Lesson>, StoreError> {
    let dir = match direction {
      SortDirection::Asc => "asc",
      SortDirection::Desc => "desc",
    };
    self
      .select(
        &self.settings.lessons_table,
        &[("select", "*".into()), ("order", format!("{}.{}", sort.column(), dir))],
      )
      .await
  }

  #[instrument(level = "debug", skip(self, lesson), fields(id = %lesson.id))]
  async fn create_lesson(&self, lesson: NewLesson) -> Result<Lesson, StoreError> {
    self.insert_returning(&self.settings.lessons_table, "lesson", &lesson).await
  }

  #[instrument(level = "debug", skip(self, test), fields(lesson_id = %test.lesson_id))]
  async fn insert_test(&self, test: NewTest) -> Result<Test, StoreError> {
    self.insert_returning(&self.settings.tests_table, "test", &test).await
  }

  #[instrument(level = "debug", skip(self))]
  async fn get_test(&self, id: &str) -> Result<Option<Test>, StoreError> {
    let rows: Vec<Test> = self
      .select(&self.settings.tests_table, &[("select", "*".into()), ("id", eq(id))])
      .await?;
    Ok(rows.into_iter().next())
  }

  #[instrument(level = "debug", skip(self))]
  async fn list_tests(&self, lesson_id: &str) -> Result<Vec<Test>, StoreError> {
    self
      .select(
        &self.settings.tests_table,
        &[("select", "*".into()), ("lesson_id", eq(lesson_id)), ("order", "created_at.desc".into())],
      )
      .await
  }

  #[instrument(level = "debug", skip(self, questions), fields(count = questions.len()))]
  async fn insert_questions(&self, questions: Vec<NewQuestion>) -> Result<(), StoreError> {
    let res = self.request(Method::POST, self.table_url(&self.settings.questions_table))
      .header(CONTENT_TYPE, "application/json")
      .header("Prefer", "return=minimal")
      .json(&questions)
      .send()
      .await?;
    check(res, "postgrest").await?;
    Ok(())
  }

  #[instrument(level = "debug", skip(self))]
  async fn list_questions(&self, test_id: &str) -> Result<Vec<Question>, StoreError> {
    self
      .select(&self.settings.questions_table, &[("select", "*".into()), ("test_id", eq(test_id))])
      .await
  }
}

// --- Storage DTOs ---

#[derive(Serialize)]
struct ListRequest<'a> {
  prefix: &'a str,
  limit: u32,
  offset: u32,
  #[serde(rename = "sortBy")]
  sort_by: SortBy,
}
#[derive(Serialize)]
struct SortBy { column: &'static str, order: &'static str }

#[derive(Deserialize)]
struct ListEntry {
  name: String,
  // folders come back with a null id
  #[serde(default)] id: Option<String>,
  #[serde(default)] created_at: Option<DateTime<Utc>>,
  #[serde(default)] metadata: Option<EntryMetadata>,
}
#[derive(Deserialize)]
struct EntryMetadata { #[serde(default)] size: Option<u64> }

#[derive(Serialize)]
struct RemoveRequest<'a> { prefixes: &'a [String] }

#[async_trait]
impl FileBucket for Supabase {
  #[instrument(level = "debug", skip(self))]
  async fn list(&self, prefix: &str) -> Result<Vec<UploadedFile>, StoreError> {
    let url = self.endpoint(["storage", "v1", "object", "list", self.settings.bucket.as_str()]);
    let body = ListRequest {
      prefix,
      limit: LIST_LIMIT,
      offset: 0,
      sort_by: SortBy { column: "name", order: "asc" },
    };
    let res = self.request(Method::POST, url).json(&body).send().await?;
    let entries: Vec<ListEntry> = check(res, "storage").await?.json().await?;
    let files: Vec<UploadedFile> = entries
      .into_iter()
      .filter(|e| e.id.is_some())
      .map(|e| UploadedFile {
        name: e.name,
        size: e.metadata.and_then(|m| m.size).unwrap_or(0),
        created_at: e.created_at,
      })
      .collect();
    debug!(target: "storage", %prefix, count = files.len(), "Listed bucket prefix");
    Ok(files)
  }

  #[instrument(level = "debug", skip(self))]
  async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
    let res = self.request(Method::GET, self.object_url(path)).send().await?;
    if res.status() == reqwest::StatusCode::NOT_FOUND {
      return Err(StoreError::ObjectNotFound(path.to_string()));
    }
    let bytes = check(res, "storage").await?.bytes().await?;
    debug!(target: "storage", %path, size = bytes.len(), "Downloaded object");
    Ok(bytes.to_vec())
  }

  #[instrument(level = "debug", skip(self, bytes), fields(size = bytes.len()))]
  async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
    let res = self.request(Method::POST, self.object_url(path))
      .header(CONTENT_TYPE, content_type)
      .header("x-upsert", "true")
      .body(bytes)
      .send()
      .await?;
    check(res, "storage").await?;
    Ok(())
  }

  #[instrument(level = "debug", skip(self))]
  async fn remove(&self, paths: &[String]) -> Result<(), StoreError> {
    let url = self.endpoint(["storage", "v1", "object", self.settings.bucket.as_str()]);
    let res = self.request(Method::DELETE, url)
      .json(&RemoveRequest { prefixes: paths })
      .send()
      .await?;
    check(res, "storage").await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client() -> Supabase {
    Supabase::new("https://proj.supabase.co", "key".into(), StorageSettings::default()).unwrap()
  }

  #[test]
  fn object_urls_encode_each_segment() {
    let s = client();
    assert_eq!(
      s.object_url("u1/l1/week 1 notes.txt").as_str(),
      "https://proj.supabase.co/storage/v1/object/nurse-mentor-lessons/u1/l1/week%201%20notes.txt"
    );
    assert_eq!(
      s.table_url("nurse_mentor_tests").as_str(),
      "https://proj.supabase.co/rest/v1/nurse_mentor_tests"
    );
  }

  #[test]
  fn error_bodies_yield_messages() {
    assert_eq!(
      extract_error_message(r#"{"code":"23503","message":"violates foreign key"}"#).as_deref(),
      Some("violates foreign key")
    );
    assert_eq!(
      extract_error_message(r#"{"statusCode":"404","error":"not_found"}"#).as_deref(),
      Some("not_found")
    );
    assert_eq!(extract_error_message("<html>"), None);
  }

  #[test]
  fn list_entries_skip_folders() {
    let entries: Vec<ListEntry> = serde_json::from_str(
      r#"[
        {"name":"sub","id":null,"created_at":null,"metadata":null},
        {"name":"notes.txt","id":"abc","created_at":"2024-05-01T12:00:00.123Z","metadata":{"size":2048}}
      ]"#,
    )
    .unwrap();
    let kept: Vec<_> = entries.into_iter().filter(|e| e.id.is_some()).collect();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].metadata.as_ref().and_then(|m| m.size), Some(2048));
  }
}
