//! Quiz attempts: present questions one at a time, collect answers, score them.
//!
//! States: answering(index) -> ... -> results. The fetch of the questions is
//! the loading state and happens before `QuizSession::start`. Questions are
//! shuffled once on start and keep that order for the rest of the attempt.

use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::Question;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizError {
  #[error("Answer required before moving on")]
  AnswerRequired,

  #[error("Quiz already finished")]
  Finished,

  #[error("Quiz not finished yet")]
  NotFinished,
}

/// A user's answer: one option, or a selection for select-all questions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Answer {
  Single(String),
  Multiple(Vec<String>),
}

impl Answer {
  /// Drop repeated picks, keeping the first occurrence of each.
  pub fn dedup(self) -> Self {
    match self {
      Answer::Multiple(picks) => {
        let mut seen = HashSet::new();
        Answer::Multiple(picks.into_iter().filter(|p| seen.insert(p.clone())).collect())
      }
      single => single,
    }
  }

  pub fn is_empty(&self) -> bool {
    match self {
      Answer::Single(s) => s.is_empty(),
      Answer::Multiple(v) => v.is_empty(),
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
  Correct,
  Incorrect,
  NotAnswered,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Phase {
  Answering { index: usize },
  Results,
}

/// Grade one answer against the correct list decoded from the store.
/// Lists match as sets: order and repeated picks are ignored, but every
/// correct option must be picked and nothing else. A single answer must equal
/// the first correct entry.
pub fn grade(answer: Option<&Answer>, correct: &[String]) -> Verdict {
  let ok = match answer {
    None => return Verdict::NotAnswered,
    Some(a) if a.is_empty() => return Verdict::NotAnswered,
    Some(Answer::Multiple(picks)) => {
      let picked: HashSet<&str> = picks.iter().map(String::as_str).collect();
      let expected: HashSet<&str> = correct.iter().map(String::as_str).collect();
      picked == expected
    }
    Some(Answer::Single(s)) => correct.first() == Some(s),
  };
  if ok { Verdict::Correct } else { Verdict::Incorrect }
}

#[derive(Clone, Debug, Serialize)]
pub struct QuestionResult {
  pub question_id: String,
  pub question: String,
  pub answer: Option<Answer>,
  pub verdict: Verdict,
  pub explanation: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct QuizResults {
  pub score: usize,
  pub total: usize,
  pub questions: Vec<QuestionResult>,
}

#[derive(Clone, Debug)]
pub struct QuizSession {
  pub id: String,
  pub test_id: String,
  questions: Vec<Question>,
  answers: HashMap<String, Answer>,
  phase: Phase,
}

impl QuizSession {
  /// Shuffle once and enter the first question; an empty test goes straight to results.
  pub fn start<R: Rng + ?Sized>(id: String, test_id: String, mut questions: Vec<Question>, rng: &mut R) -> Self {
    questions.shuffle(rng);
    let phase = if questions.is_empty() { Phase::Results } else { Phase::Answering { index: 0 } };
    Self { id, test_id, questions, answers: HashMap::new(), phase }
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn total(&self) -> usize {
    self.questions.len()
  }

  pub fn questions(&self) -> &[Question] {
    &self.questions
  }

  pub fn current(&self) -> Option<&Question> {
    match self.phase {
      Phase::Answering { index } => self.questions.get(index),
      Phase::Results => None,
    }
  }

  pub fn answer_for(&self, question_id: &str) -> Option<&Answer> {
    self.answers.get(question_id)
  }

  /// Record (or replace) the answer to the current question.
  pub fn answer(&mut self, answer: Answer) -> Result<(), QuizError> {
    let id = self.current().map(|q| q.id.clone()).ok_or(QuizError::Finished)?;
    self.answers.insert(id, answer.dedup());
    Ok(())
  }

  /// Advance past the current question; on the last one this finishes the quiz.
  pub fn next(&mut self) -> Result<Phase, QuizError> {
    let Phase::Answering { index } = self.phase else {
      return Err(QuizError::Finished);
    };
    let answered = self.questions
      .get(index)
      .and_then(|q| self.answers.get(&q.id))
      .is_some_and(|a| !a.is_empty());
    if !answered {
      return Err(QuizError::AnswerRequired);
    }

    self.phase = if index + 1 < self.questions.len() {
      Phase::Answering { index: index + 1 }
    } else {
      Phase::Results
    };
    debug!(target: "quiz", attempt = %self.id, phase = ?self.phase, "Quiz advanced");
    Ok(self.phase)
  }

  pub fn score(&self) -> usize {
    self.questions
      .iter()
      .filter(|q| grade(self.answers.get(&q.id), &q.correct_list()) == Verdict::Correct)
      .count()
  }

  pub fn results(&self) -> Result<QuizResults, QuizError> {
    if self.phase != Phase::Results {
      return Err(QuizError::NotFinished);
    }
    let questions: Vec<QuestionResult> = self.questions
      .iter()
      .map(|q| {
        let answer = self.answers.get(&q.id).cloned();
        QuestionResult {
          question_id: q.id.clone(),
          question: q.question.clone(),
          verdict: grade(answer.as_ref(), &q.correct_list()),
          answer,
          explanation: q.explanation.clone(),
        }
      })
      .collect();
    let score = questions.iter().filter(|r| r.verdict == Verdict::Correct).count();
    Ok(QuizResults { score, total: questions.len(), questions })
  }
}
