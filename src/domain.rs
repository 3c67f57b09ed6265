//! Domain models: lessons, generated tests, their questions, and uploaded files.
//!
//! Field names follow the record store's column names, so the same structs are
//! used for store rows and for HTTP output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Test flavour requested at generation time.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
  Normal,
  NclexNextGen,
}

impl TestType {
  pub fn as_str(&self) -> &'static str {
    match self {
      TestType::Normal => "normal",
      TestType::NclexNextGen => "nclex_next_gen",
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
  MultipleChoice,
  TrueFalse,
  SelectAll,
}

impl QuestionType {
  pub fn as_str(&self) -> &'static str {
    match self {
      QuestionType::MultipleChoice => "multiple_choice",
      QuestionType::TrueFalse => "true_false",
      QuestionType::SelectAll => "select_all",
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Lesson {
  pub id: String,
  #[serde(default)] pub title: Option<String>,
  #[serde(default)] pub created_by: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl Lesson {
  /// Owner id used as the first segment of the lesson's bucket paths.
  pub fn owner(&self) -> Option<&str> {
    self.created_by.as_deref().filter(|o| !o.is_empty())
  }
}

/// Insert payload for a lesson; `created_at` is filled by the store.
#[derive(Clone, Debug, Serialize)]
pub struct NewLesson {
  pub id: String,
  pub title: String,
  pub created_by: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Test {
  pub id: String,
  pub lesson_id: String,
  pub title: String,
  pub test_type: TestType,
  pub num_questions: usize,
  #[serde(default)] pub created_by: Option<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NewTest {
  pub lesson_id: String,
  pub title: String,
  pub test_type: TestType,
  pub num_questions: usize,
  pub created_by: Option<String>,
}

/// Correct answer as emitted by the model: one option or a list of options.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CorrectAnswer {
  Single(String),
  Many(Vec<String>),
}

impl CorrectAnswer {
  /// Always-a-list form stored when normalization is on.
  pub fn normalized(self) -> Self {
    match self {
      CorrectAnswer::Single(s) => CorrectAnswer::Many(vec![s]),
      many => many,
    }
  }

  pub fn into_list(self) -> Vec<String> {
    match self {
      CorrectAnswer::Single(s) => vec![s],
      CorrectAnswer::Many(v) => v,
    }
  }

  /// Decode the stored JSON text of a `correctAnswer` column.
  /// Anything that is not JSON is taken as a bare scalar answer.
  pub fn decode(stored: &str) -> Self {
    serde_json::from_str(stored).unwrap_or_else(|_| CorrectAnswer::Single(stored.to_string()))
  }

  pub fn encode(&self) -> String {
    // Serializing a string or a list of strings cannot fail.
    serde_json::to_string(self).unwrap_or_default()
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Question {
  pub id: String,
  pub test_id: String,
  #[serde(rename = "type")]
  pub kind: QuestionType,
  pub question: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub options: Vec<String>,
  /// JSON text; see `CorrectAnswer::decode`.
  #[serde(rename = "correctAnswer", default)]
  pub correct_answer: Option<String>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub explanation: String,
}

/// Nullable columns come back as `null`; read those as the empty value.
fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

impl Question {
  pub fn correct_list(&self) -> Vec<String> {
    self.correct_answer
      .as_deref()
      .map(|s| CorrectAnswer::decode(s).into_list())
      .unwrap_or_default()
  }
}

#[derive(Clone, Debug, Serialize)]
pub struct NewQuestion {
  pub test_id: String,
  #[serde(rename = "type")]
  pub kind: QuestionType,
  pub question: String,
  pub options: Vec<String>,
  #[serde(rename = "correctAnswer")]
  pub correct_answer: String,
  pub explanation: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UploadedFile {
  pub name: String,
  pub size: u64,
  #[serde(default)] pub created_at: Option<DateTime<Utc>>,
}

/// Bucket prefix under which a lesson's files live.
pub fn lesson_prefix(created_by: &str, lesson_id: &str) -> String {
  format!("{}/{}", created_by, lesson_id)
}

pub fn lesson_file_path(created_by: &str, lesson_id: &str, name: &str) -> String {
  format!("{}/{}/{}", created_by, lesson_id, name)
}
