//! Application state: injected collaborators, configuration, and quiz attempts.
//!
//! This module owns:
//!   - the record store and file bucket (Supabase when configured, else in-memory)
//!   - the optional completion model (present when OPENAI_API_KEY is set)
//!   - the loaded configuration
//!   - in-flight quiz attempts (process memory only, lost on restart; idle
//!     attempts expire and the oldest are dropped past a cap)

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{load_config_from_env, AppConfig, QuizSettings};
use crate::generate::Generator;
use crate::openai::{CompletionModel, OpenAI};
use crate::quiz::QuizSession;
use crate::store::memory::{MemoryBucket, MemoryStore};
use crate::store::supabase::Supabase;
use crate::store::{FileBucket, RecordStore, StoreError};

/// A quiz attempt plus the last time a request touched it.
#[derive(Clone, Debug)]
pub struct AttemptSlot {
    pub session: QuizSession,
    pub last_seen: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub bucket: Arc<dyn FileBucket>,
    pub model: Option<Arc<dyn CompletionModel>>,
    pub config: AppConfig,
    /// "supabase" or "memory", reported by the health endpoint.
    pub backend: &'static str,
    pub attempts: Arc<RwLock<HashMap<String, AttemptSlot>>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        bucket: Arc<dyn FileBucket>,
        model: Option<Arc<dyn CompletionModel>>,
        config: AppConfig,
        backend: &'static str,
    ) -> Self {
        Self {
            store,
            bucket,
            model,
            config,
            backend,
            attempts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build state from env: load config, pick the storage backend, init OpenAI.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Self {
        let config = load_config_from_env();

        let (store, bucket, backend): (Arc<dyn RecordStore>, Arc<dyn FileBucket>, &'static str) =
            match Supabase::from_env(config.storage.clone()) {
                Some(sb) => {
                    info!(target: "nurse_mentor", base_url = %sb.base_url(), bucket = %sb.bucket(), "Supabase backend enabled.");
                    let sb = Arc::new(sb);
                    (sb.clone(), sb, "supabase")
                }
                None => {
                    warn!(target: "nurse_mentor", "SUPABASE_URL/SUPABASE_SERVICE_KEY not set. Using in-memory storage.");
                    (Arc::new(MemoryStore::new()), Arc::new(MemoryBucket::new()), "memory")
                }
            };

        let timeout = Duration::from_secs(config.generation.timeout_secs);
        let model: Option<Arc<dyn CompletionModel>> = match OpenAI::from_env(timeout) {
            Some(oa) => {
                info!(target: "nurse_mentor", base_url = %oa.base_url, model = %config.generation.model, "OpenAI enabled.");
                Some(Arc::new(oa))
            }
            None => {
                warn!(target: "nurse_mentor", "OpenAI disabled (no OPENAI_API_KEY). Test generation will fail.");
                None
            }
        };

        Self::new(store, bucket, model, config, backend)
    }

    pub fn generator(&self) -> Generator<'_> {
        Generator {
            store: self.store.as_ref(),
            bucket: self.bucket.as_ref(),
            model: self.model.as_deref(),
            prompts: &self.config.prompts,
            settings: &self.config.generation,
        }
    }

    /// Load a test's questions and open a new attempt over them.
    /// Returns None when the test does not exist.
    #[instrument(level = "info", skip(self))]
    pub async fn start_attempt(&self, test_id: &str) -> Result<Option<QuizSession>, StoreError> {
        let Some(test) = self.store.get_test(test_id).await? else {
            return Ok(None);
        };
        let questions = self.store.list_questions(&test.id).await?;
        let session = {
            let mut rng = rand::thread_rng();
            QuizSession::start(Uuid::new_v4().to_string(), test.id.clone(), questions, &mut rng)
        };
        info!(target: "quiz", attempt = %session.id, %test_id, total = session.total(), "Quiz attempt started");

        let now = Instant::now();
        let mut attempts = self.attempts.write().await;
        prune_attempts(&mut attempts, now, &self.config.quiz);
        attempts.insert(session.id.clone(), AttemptSlot { session: session.clone(), last_seen: now });
        Ok(Some(session))
    }

    /// Run `f` against an attempt under the write lock and mark it as seen.
    pub async fn with_attempt<T>(&self, id: &str, f: impl FnOnce(&mut QuizSession) -> T) -> Option<T> {
        let mut attempts = self.attempts.write().await;
        attempts.get_mut(id).map(|slot| {
            slot.last_seen = Instant::now();
            f(&mut slot.session)
        })
    }
}

/// Drop attempts idle past the TTL, then the least recently seen ones until
/// there is room for one more under `max_attempts`.
pub fn prune_attempts(attempts: &mut HashMap<String, AttemptSlot>, now: Instant, limits: &QuizSettings) {
    let ttl = Duration::from_secs(limits.attempt_ttl_secs);
    let before = attempts.len();
    attempts.retain(|_, slot| now.saturating_duration_since(slot.last_seen) < ttl);

    let room = limits.max_attempts.saturating_sub(1);
    if attempts.len() > room {
        let mut by_age: Vec<(Instant, String)> =
            attempts.iter().map(|(id, slot)| (slot.last_seen, id.clone())).collect();
        by_age.sort();
        let excess = attempts.len() - room;
        for (_, id) in by_age.into_iter().take(excess) {
            attempts.remove(&id);
        }
    }

    let evicted = before - attempts.len();
    if evicted > 0 {
        debug!(target: "quiz", evicted, held = attempts.len(), "Quiz attempts evicted");
    }
}
