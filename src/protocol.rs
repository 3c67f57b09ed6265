//! Public request/response structs for the HTTP API (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Lesson, Question, QuestionType, UploadedFile};
use crate::quiz::{Answer, Phase, QuizSession};
use crate::store::{LessonSort, SortDirection};

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub backend: &'static str,
    pub model: bool,
}

//
// Test generation
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTestOut {
    pub message: String,
    pub test_id: String,
    /// Model output blocks that did not parse into a question.
    pub dropped_blocks: usize,
}

//
// Lessons and files
//

#[derive(Debug, Default, Deserialize)]
pub struct LessonsQuery {
    #[serde(default)]
    pub sort: Option<LessonSort>,
    #[serde(default)]
    pub direction: Option<SortDirection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLessonIn {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub created_by: String,
}

#[derive(Serialize)]
pub struct LessonDetailOut {
    #[serde(flatten)]
    pub lesson: Lesson,
    pub files: Vec<UploadedFile>,
}

//
// Quiz attempts
//

/// A question as shown while answering: no correct answer, no explanation.
#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub question: String,
    pub options: Vec<String>,
}

impl From<&Question> for QuestionOut {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            kind: q.kind,
            question: q.question.clone(),
            options: q.options.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOut {
    pub attempt_id: String,
    pub test_id: String,
    pub phase: Phase,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<Answer>,
}

/// Convert the internal session to the public view of its current step.
pub fn to_attempt_out(s: &QuizSession) -> AttemptOut {
    let current = s.current();
    AttemptOut {
        attempt_id: s.id.clone(),
        test_id: s.test_id.clone(),
        phase: s.phase(),
        total: s.total(),
        question: current.map(QuestionOut::from),
        answer: current.and_then(|q| s.answer_for(&q.id)).cloned(),
    }
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
    pub answer: Answer,
}
