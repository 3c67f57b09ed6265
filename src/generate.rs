//! Test generation: lesson files -> prompt -> model -> parsed questions -> stored test.
//!
//! Flow:
//! 1) Validate the request and resolve the lesson.
//! 2) List the lesson's files and download them all concurrently.
//! 3) Fill the prompt template and make one completion request.
//! 4) Parse the output block by block (bad blocks are dropped and counted).
//! 5) Insert the test row, then its question rows. The two inserts are not a
//!    transaction: a failed second insert leaves a test without questions.

use futures::future::try_join_all;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{GenerationSettings, Prompts};
use crate::domain::{lesson_file_path, lesson_prefix, NewQuestion, NewTest, QuestionType, TestType};
use crate::openai::{CompletionModel, CompletionParams, ModelError};
use crate::parse::parse_questions;
use crate::store::{FileBucket, RecordStore, StoreError};
use crate::util::fill_template;

#[derive(Debug, Error)]
pub enum GenerateError {
  #[error("Missing required fields.")]
  MissingFields,

  #[error("Lesson not found: {0}")]
  LessonNotFound(String),

  #[error("Storage error: {0}")]
  Store(#[from] StoreError),

  #[error("Model error: {0}")]
  Model(#[from] ModelError),

  #[error("Model output contained no parseable questions ({dropped} blocks dropped)")]
  NoQuestions { dropped: usize },
}

/// Request body of `POST /api/generate-test`. Every field is optional here so
/// that absence is reported as a validation error rather than a body rejection.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTestRequest {
  #[serde(default)] pub lesson_id: Option<String>,
  #[serde(default)] pub test_title: Option<String>,
  #[serde(default)] pub test_type: Option<TestType>,
  #[serde(default)] pub num_questions: Option<u32>,
  #[serde(default)] pub question_types: Option<Vec<QuestionType>>,
}

/// A request that passed validation.
#[derive(Clone, Debug)]
pub struct TestSpec {
  pub lesson_id: String,
  pub title: String,
  pub test_type: TestType,
  pub num_questions: u32,
  pub question_types: Vec<QuestionType>,
}

impl GenerateTestRequest {
  pub fn validate(self) -> Result<TestSpec, GenerateError> {
    let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
    let lesson_id = non_empty(self.lesson_id).ok_or(GenerateError::MissingFields)?;
    let title = non_empty(self.test_title).ok_or(GenerateError::MissingFields)?;
    let test_type = self.test_type.ok_or(GenerateError::MissingFields)?;
    let num_questions = self.num_questions.filter(|n| *n > 0).ok_or(GenerateError::MissingFields)?;
    let question_types = self.question_types.filter(|t| !t.is_empty()).ok_or(GenerateError::MissingFields)?;
    Ok(TestSpec { lesson_id, title, test_type, num_questions, question_types })
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedTest {
  pub test_id: String,
  pub inserted: usize,
  pub dropped: usize,
}

/// Borrowed collaborators for one generation run.
pub struct Generator<'a> {
  pub store: &'a dyn RecordStore,
  pub bucket: &'a dyn FileBucket,
  pub model: Option<&'a dyn CompletionModel>,
  pub prompts: &'a Prompts,
  pub settings: &'a GenerationSettings,
}

impl Generator<'_> {
  #[instrument(level = "info", skip(self, spec), fields(lesson_id = %spec.lesson_id, test_type = spec.test_type.as_str(), requested = spec.num_questions))]
  pub async fn generate(&self, spec: TestSpec) -> Result<GeneratedTest, GenerateError> {
    let lesson = self.store
      .get_lesson(&spec.lesson_id)
      .await?
      .ok_or_else(|| GenerateError::LessonNotFound(spec.lesson_id.clone()))?;
    let owner = lesson.owner().ok_or_else(|| StoreError::MissingOwner(lesson.id.clone()))?;

    let content = self.lesson_content(owner, &lesson.id).await?;
    let prompt = build_prompt(self.prompts, &spec, &content);
    debug!(target: "generation", prompt_len = prompt.len(), content_len = content.len(), "Prompt built");

    let model = self.model.ok_or(ModelError::NotConfigured)?;
    let params = CompletionParams {
      model: self.settings.model.clone(),
      temperature: self.settings.temperature,
      max_tokens: self.settings.max_tokens,
    };
    let output = model.complete(&prompt, &params).await?;

    let parsed = parse_questions(&output, self.settings.normalize_correct_answer);
    if parsed.questions.is_empty() {
      return Err(GenerateError::NoQuestions { dropped: parsed.dropped });
    }
    if parsed.dropped > 0 {
      warn!(target: "generation", dropped = parsed.dropped, kept = parsed.questions.len(), "Some model blocks were dropped");
    }

    let test = self.store
      .insert_test(NewTest {
        lesson_id: lesson.id.clone(),
        title: spec.title,
        test_type: spec.test_type,
        num_questions: parsed.questions.len(),
        created_by: lesson.created_by.clone(),
      })
      .await?;
    info!(target: "generation", test_id = %test.id, "Test row inserted");

    let rows: Vec<NewQuestion> = parsed.questions
      .into_iter()
      .map(|q| NewQuestion {
        test_id: test.id.clone(),
        kind: q.kind,
        question: q.text,
        options: q.options,
        correct_answer: q.correct_answer.encode(),
        explanation: q.explanation,
      })
      .collect();
    let inserted = rows.len();
    if let Err(e) = self.store.insert_questions(rows).await {
      error!(target: "generation", test_id = %test.id, error = %e, "Question insert failed; test row left without questions");
      return Err(e.into());
    }

    info!(target: "generation", test_id = %test.id, inserted, dropped = parsed.dropped, "Test generated");
    Ok(GeneratedTest { test_id: test.id, inserted, dropped: parsed.dropped })
  }

  /// Text of every file under the lesson's prefix, joined by blank lines.
  /// All downloads are in flight at once.
  async fn lesson_content(&self, creator: &str, lesson_id: &str) -> Result<String, GenerateError> {
    let files = self.bucket.list(&lesson_prefix(creator, lesson_id)).await?;
    info!(target: "generation", count = files.len(), "Lesson files listed");

    let downloads = files.iter().map(|f| {
      let path = lesson_file_path(creator, lesson_id, &f.name);
      async move {
        let bytes = self.bucket.download(&path).await?;
        debug!(target: "generation", %path, size = bytes.len(), "File downloaded");
        Ok::<_, StoreError>(String::from_utf8_lossy(&bytes).into_owned())
      }
    });
    let contents = try_join_all(downloads).await?;
    Ok(contents.join("\n\n"))
  }
}

pub fn build_prompt(prompts: &Prompts, spec: &TestSpec, content: &str) -> String {
  let num = spec.num_questions.to_string();
  let types = spec.question_types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ");
  fill_template(
    &prompts.generation_template,
    &[
      ("num_questions", &num),
      ("test_type", spec.test_type.as_str()),
      ("question_types", &types),
      ("lesson_content", content),
    ],
  )
}
