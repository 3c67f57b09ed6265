//! Parsing of the model's free-text output into question drafts.
//!
//! The model is asked for one JSON object per question, separated by blank
//! lines. Blocks are parsed independently; a block that does not parse is
//! dropped and counted, it never fails the whole batch.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{CorrectAnswer, QuestionType};
use crate::util::trunc_for_log;

/// One question as emitted by the model.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct QuestionDraft {
  #[serde(rename = "type")]
  pub kind: QuestionType,
  pub text: String,
  #[serde(default)]
  pub options: Vec<String>,
  #[serde(rename = "correctAnswer")]
  pub correct_answer: CorrectAnswer,
  #[serde(default)]
  pub explanation: String,
}

#[derive(Debug, Default)]
pub struct ParsedQuestions {
  pub questions: Vec<QuestionDraft>,
  pub dropped: usize,
}

/// Remove markdown code-fence markers the model likes to wrap JSON in.
pub fn strip_code_fences(raw: &str) -> String {
  raw.trim()
    .replace("```json", "")
    .replace("```", "")
    .trim()
    .to_string()
}

/// Split on blank lines and parse every block; see module docs.
/// With `normalize` set, every `correctAnswer` comes out as a list.
pub fn parse_questions(raw: &str, normalize: bool) -> ParsedQuestions {
  let cleaned = strip_code_fences(raw);
  let mut out = ParsedQuestions::default();

  for block in cleaned.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
    match serde_json::from_str::<QuestionDraft>(block) {
      Ok(mut q) => {
        if normalize {
          q.correct_answer = q.correct_answer.normalized();
        }
        out.questions.push(q);
      }
      Err(e) => {
        warn!(target: "generation", error = %e, block = %trunc_for_log(block, 200), "Dropping unparseable question block");
        out.dropped += 1;
      }
    }
  }

  debug!(target: "generation", parsed = out.questions.len(), dropped = out.dropped, "Model output parsed");
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  const MC: &str = r#"{"type":"multiple_choice","text":"Normal adult HR?","options":["40","70","150","200"],"correctAnswer":"70","explanation":"60-100 bpm."}"#;
  const TF: &str = r#"{"type":"true_false","text":"Aspirin is an anticoagulant.","options":["True","False"],"correctAnswer":"False","explanation":"It is an antiplatelet."}"#;
  const SA: &str = r#"{"type":"select_all","text":"Signs of hypoglycemia?","options":["Sweating","Tremor","Bradycardia"],"correctAnswer":["Sweating","Tremor"],"explanation":"Adrenergic response."}"#;

  #[test]
  fn fenced_output_is_unwrapped() {
    let raw = format!("```json\n{}\n\n{}\n```", MC, SA);
    let parsed = parse_questions(&raw, true);
    assert_eq!(parsed.questions.len(), 2);
    assert_eq!(parsed.dropped, 0);
    assert_eq!(parsed.questions[1].kind, QuestionType::SelectAll);
  }

  #[test]
  fn invalid_blocks_are_dropped_and_counted() {
    let raw = format!(
      "{}\n\nHere is another question:\n\n{}\n\n{{\"type\": \"multiple_choice\", \"text\": \n\n{}",
      MC, TF, SA
    );
    let parsed = parse_questions(&raw, true);
    assert_eq!(parsed.questions.len(), 3);
    assert_eq!(parsed.dropped, 2);
  }

  #[test]
  fn unknown_type_or_missing_answer_is_dropped() {
    let raw = concat!(
      r#"{"type":"essay","text":"Describe sepsis.","correctAnswer":"x"}"#,
      "\n\n",
      r#"{"type":"true_false","text":"No answer here","options":["True","False"]}"#,
    );
    let parsed = parse_questions(raw, true);
    assert!(parsed.questions.is_empty());
    assert_eq!(parsed.dropped, 2);
  }

  #[test]
  fn normalization_is_switchable() {
    let on = parse_questions(MC, true);
    assert_eq!(on.questions[0].correct_answer, CorrectAnswer::Many(vec!["70".into()]));

    let off = parse_questions(MC, false);
    assert_eq!(off.questions[0].correct_answer, CorrectAnswer::Single("70".into()));
  }

  #[test]
  fn pretty_printed_objects_parse() {
    let raw = "{\n  \"type\": \"true_false\",\n  \"text\": \"Insulin lowers glucose.\",\n  \"options\": [\"True\", \"False\"],\n  \"correctAnswer\": \"True\"\n}";
    let parsed = parse_questions(raw, true);
    assert_eq!(parsed.questions.len(), 1);
    assert_eq!(parsed.questions[0].explanation, "");
  }
}
