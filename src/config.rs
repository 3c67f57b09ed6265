//! Service configuration: generation prompt, model tunables, and storage names.
//!
//! Everything has a default; a TOML file named by MENTOR_CONFIG_PATH can
//! override any section. See `AppConfig` for the schema.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub generation: GenerationSettings,
  #[serde(default)]
  pub storage: StorageSettings,
  #[serde(default)]
  pub quiz: QuizSettings,
}

/// Prompt sent to the model for test generation.
/// Placeholders: {num_questions}, {test_type}, {lesson_content}, {question_types}.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub generation_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      generation_template: r#"Generate {num_questions} questions formatted in a {test_type} test style based on the following lesson content:

{lesson_content}

Include a mix of the following question types: {question_types}.

Format each question as a JSON object with the following structure:
{
  "type": "question_type",
  "text": "Question text",
  "options": ["Option 1", "Option 2", "Option 3", "Option 4"],
  "correctAnswer": "Correct option(s)",
  "explanation": "Detailed explanation of why this is the correct answer and in particular related to the material in the lesson."
}

For true/false questions, use only two options: ["True", "False"].
For select all that apply, include all correct options in the correctAnswer field as an array.

Separate each question object with a blank line."#
        .into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
  pub model: String,
  pub temperature: f32,
  pub max_tokens: u32,
  /// Store `correctAnswer` as a list even when the model emitted a single string.
  pub normalize_correct_answer: bool,
  pub timeout_secs: u64,
}

impl Default for GenerationSettings {
  fn default() -> Self {
    Self {
      model: "gpt-4o-mini".into(),
      temperature: 0.7,
      max_tokens: 3000,
      normalize_correct_answer: true,
      timeout_secs: 120,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
  pub bucket: String,
  pub lessons_table: String,
  pub tests_table: String,
  pub questions_table: String,
}

impl Default for StorageSettings {
  fn default() -> Self {
    Self {
      bucket: "nurse-mentor-lessons".into(),
      lessons_table: "nurse_mentor_lessons".into(),
      tests_table: "nurse_mentor_tests".into(),
      questions_table: "nurse_mentor_questions".into(),
    }
  }
}

/// Limits for in-flight quiz attempts held in memory.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QuizSettings {
  /// Attempts untouched for this long are dropped.
  pub attempt_ttl_secs: u64,
  /// Oldest attempts are dropped beyond this count.
  pub max_attempts: usize,
}

impl Default for QuizSettings {
  fn default() -> Self {
    Self { attempt_ttl_secs: 6 * 60 * 60, max_attempts: 10_000 }
  }
}

/// Load `AppConfig` from MENTOR_CONFIG_PATH, falling back to defaults on any error.
/// OPENAI_MODEL overrides the configured model name.
pub fn load_config_from_env() -> AppConfig {
  let mut cfg = std::env::var("MENTOR_CONFIG_PATH")
    .ok()
    .and_then(|path| load_config_file(&path))
    .unwrap_or_default();
  if let Ok(model) = std::env::var("OPENAI_MODEL") {
    cfg.generation.model = model;
  }
  cfg
}

fn load_config_file(path: &str) -> Option<AppConfig> {
  match std::fs::read_to_string(path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "nurse_mentor", %path, "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "nurse_mentor", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "nurse_mentor", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg: AppConfig = toml::from_str(
      r#"
      [generation]
      temperature = 0.2
      normalize_correct_answer = false

      [storage]
      bucket = "lessons-dev"
      "#,
    )
    .unwrap();
    assert_eq!(cfg.generation.temperature, 0.2);
    assert!(!cfg.generation.normalize_correct_answer);
    assert_eq!(cfg.generation.max_tokens, 3000);
    assert_eq!(cfg.generation.model, "gpt-4o-mini");
    assert_eq!(cfg.storage.bucket, "lessons-dev");
    assert_eq!(cfg.storage.tests_table, "nurse_mentor_tests");
    assert!(cfg.prompts.generation_template.contains("{lesson_content}"));
  }
}
