//! Process-local backends. Nothing survives a restart.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{FileBucket, LessonSort, RecordStore, SortDirection, StoreError};
use crate::domain::{Lesson, NewLesson, NewQuestion, NewTest, Question, Test, UploadedFile};

#[derive(Default)]
pub struct MemoryStore {
  lessons: RwLock<HashMap<String, Lesson>>,
  tests: RwLock<HashMap<String, Test>>,
  // insertion order is kept per test
  questions: RwLock<Vec<Question>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl RecordStore for MemoryStore {
  async fn get_lesson(&self, id: &str) -> Result<Option<Lesson>, StoreError> {
    Ok(self.lessons.read().await.get(id).cloned())
  }

  async fn list_lessons(&self, sort: LessonSort, direction: SortDirection) -> Result<Vec<Lesson>, StoreError> {
    let mut out: Vec<Lesson> = self.lessons.read().await.values().cloned().collect();
    match sort {
      LessonSort::Title => out.sort_by(|a, b| a.title.cmp(&b.title)),
      LessonSort::CreatedAt => out.sort_by_key(|l| l.created_at),
    }
    if direction == SortDirection::Desc {
      out.reverse();
    }
    Ok(out)
  }

  #[instrument(level = "debug", skip(self, lesson), fields(id = %lesson.id))]
  async fn create_lesson(&self, lesson: NewLesson) -> Result<Lesson, StoreError> {
    let row = Lesson {
      id: lesson.id,
      title: Some(lesson.title),
      created_by: Some(lesson.created_by),
      created_at: Utc::now(),
    };
    self.lessons.write().await.insert(row.id.clone(), row.clone());
    Ok(row)
  }

  async fn insert_test(&self, test: NewTest) -> Result<Test, StoreError> {
    let row = Test {
      id: Uuid::new_v4().to_string(),
      lesson_id: test.lesson_id,
      title: test.title,
      test_type: test.test_type,
      num_questions: test.num_questions,
      created_by: test.created_by,
      created_at: Utc::now(),
    };
    debug!(target: "storage", id = %row.id, "memory: test inserted");
    self.tests.write().await.insert(row.id.clone(), row.clone());
    Ok(row)
  }

  async fn get_test(&self, id: &str) -> Result<Option<Test>, StoreError> {
    Ok(self.tests.read().await.get(id).cloned())
  }

  async fn list_tests(&self, lesson_id: &str) -> Result<Vec<Test>, StoreError> {
    let mut out: Vec<Test> = self.tests.read().await
      .values()
      .filter(|t| t.lesson_id == lesson_id)
      .cloned()
      .collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
  }

  async fn insert_questions(&self, questions: Vec<NewQuestion>) -> Result<(), StoreError> {
    let mut rows = self.questions.write().await;
    for q in questions {
      rows.push(Question {
        id: Uuid::new_v4().to_string(),
        test_id: q.test_id,
        kind: q.kind,
        question: q.question,
        options: q.options,
        correct_answer: Some(q.correct_answer),
        explanation: q.explanation,
      });
    }
    Ok(())
  }

  async fn list_questions(&self, test_id: &str) -> Result<Vec<Question>, StoreError> {
    Ok(self.questions.read().await.iter().filter(|q| q.test_id == test_id).cloned().collect())
  }
}

struct StoredObject {
  bytes: Vec<u8>,
  created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryBucket {
  objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryBucket {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl FileBucket for MemoryBucket {
  async fn list(&self, prefix: &str) -> Result<Vec<UploadedFile>, StoreError> {
    let dir = format!("{}/", prefix.trim_end_matches('/'));
    let objects = self.objects.read().await;
    let files = objects
      .range(dir.clone()..)
      .take_while(|(key, _)| key.starts_with(&dir))
      .filter(|(key, _)| !key[dir.len()..].contains('/'))
      .map(|(key, obj)| UploadedFile {
        name: key[dir.len()..].to_string(),
        size: obj.bytes.len() as u64,
        created_at: Some(obj.created_at),
      })
      .collect();
    Ok(files)
  }

  async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
    self.objects.read().await
      .get(path)
      .map(|o| o.bytes.clone())
      .ok_or_else(|| StoreError::ObjectNotFound(path.to_string()))
  }

  async fn upload(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), StoreError> {
    debug!(target: "storage", %path, size = bytes.len(), "memory: object stored");
    self.objects.write().await.insert(path.to_string(), StoredObject { bytes, created_at: Utc::now() });
    Ok(())
  }

  async fn remove(&self, paths: &[String]) -> Result<(), StoreError> {
    let mut objects = self.objects.write().await;
    for p in paths {
      objects.remove(p);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn bucket_lists_direct_children_only() {
    let bucket = MemoryBucket::new();
    bucket.upload("u1/l1/a.txt", b"aa".to_vec(), "text/plain").await.unwrap();
    bucket.upload("u1/l1/b.txt", b"bbb".to_vec(), "text/plain").await.unwrap();
    bucket.upload("u1/l1/sub/c.txt", b"c".to_vec(), "text/plain").await.unwrap();
    bucket.upload("u1/l10/d.txt", b"d".to_vec(), "text/plain").await.unwrap();

    let files = bucket.list("u1/l1").await.unwrap();
    let names: Vec<_> = files.iter().map(|f| (f.name.as_str(), f.size)).collect();
    assert_eq!(names, vec![("a.txt", 2), ("b.txt", 3)]);
  }

  #[tokio::test]
  async fn upload_with_same_name_overwrites() {
    let bucket = MemoryBucket::new();
    bucket.upload("u/l/notes.txt", b"first".to_vec(), "text/plain").await.unwrap();
    bucket.upload("u/l/notes.txt", b"second".to_vec(), "text/plain").await.unwrap();
    assert_eq!(bucket.list("u/l").await.unwrap().len(), 1);
    assert_eq!(bucket.download("u/l/notes.txt").await.unwrap(), b"second");

    bucket.remove(&["u/l/notes.txt".to_string()]).await.unwrap();
    assert!(matches!(bucket.download("u/l/notes.txt").await, Err(StoreError::ObjectNotFound(_))));
  }

  #[tokio::test]
  async fn lessons_sort_by_title() {
    let store = MemoryStore::new();
    for (id, title) in [("1", "Cardiology"), ("2", "Anatomy"), ("3", "Pharmacology")] {
      store
        .create_lesson(NewLesson { id: id.into(), title: title.into(), created_by: "u".into() })
        .await
        .unwrap();
    }
    let asc = store.list_lessons(LessonSort::Title, SortDirection::Asc).await.unwrap();
    let titles: Vec<_> = asc.iter().filter_map(|l| l.title.as_deref()).collect();
    assert_eq!(titles, vec!["Anatomy", "Cardiology", "Pharmacology"]);

    let desc = store.list_lessons(LessonSort::Title, SortDirection::Desc).await.unwrap();
    assert_eq!(desc[0].title.as_deref(), Some("Pharmacology"));
  }
}
