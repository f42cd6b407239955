//! Per-user conversation memory.
//!
//! Each user gets a bounded history of turns plus the last successful query
//! and result summary. The [`ConversationStore`] keys memories by user id
//! and puts each one behind its own async mutex, so one user's turn holds
//! only that user's lock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use querydesk_core::config::MemoryConfig;

use crate::error::ChatError;
use crate::query::Query;
use crate::summary::ResultSummary;
use crate::types::ConversationTurn;

// =============================================================================
// ConversationMemory
// =============================================================================

/// Counters and timestamps for one user's memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub user_id: String,
    /// Turns appended since the memory was created, including evicted ones.
    pub total_turns: u64,
    pub failed_turns: u64,
    /// Turns currently held in the ring.
    pub retained_turns: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// One user's bounded turn history.
#[derive(Debug)]
pub struct ConversationMemory {
    user_id: String,
    capacity: usize,
    turns: VecDeque<ConversationTurn>,
    last_query: Option<Query>,
    last_result_summary: Option<ResultSummary>,
    total_turns: u64,
    failed_turns: u64,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl ConversationMemory {
    pub fn new(user_id: &str, capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            capacity,
            turns: VecDeque::with_capacity(capacity.min(64)),
            last_query: None,
            last_result_summary: None,
            total_turns: 0,
            failed_turns: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Record a completed turn.
    ///
    /// A failed turn is kept in the history but never replaces the last
    /// query or result summary. The oldest turn is evicted once the ring
    /// is full; with capacity 0 nothing is retained, but the last query and
    /// summary are still tracked.
    pub fn append(&mut self, turn: ConversationTurn) {
        self.total_turns += 1;
        self.last_activity = Utc::now();

        if turn.is_failed() {
            self.failed_turns += 1;
        } else {
            if let Some(ref query) = turn.query {
                self.last_query = Some(query.clone());
            }
            if let Some(ref summary) = turn.result_summary {
                self.last_result_summary = Some(summary.clone());
            }
        }

        if self.capacity == 0 {
            return;
        }
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
    }

    pub fn last_query(&self) -> Option<&Query> {
        self.last_query.as_ref()
    }

    pub fn last_result_summary(&self) -> Option<&ResultSummary> {
        self.last_result_summary.as_ref()
    }

    /// Drop the history and the last query and summary. Lifetime counters
    /// are kept.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.last_query = None;
        self.last_result_summary = None;
        self.last_activity = Utc::now();
    }

    /// Retained turns, oldest first.
    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity > timeout
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            user_id: self.user_id.clone(),
            total_turns: self.total_turns,
            failed_turns: self.failed_turns,
            retained_turns: self.turns.len(),
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }
}

// =============================================================================
// ConversationStore
// =============================================================================

type SharedMemory = Arc<AsyncMutex<ConversationMemory>>;

/// Keyed store of per-user memories.
///
/// The outer map lock is only held long enough to look up or insert an
/// entry, never across an `.await`.
pub struct ConversationStore {
    users: Mutex<HashMap<String, SharedMemory>>,
    capacity: usize,
    idle_timeout: Duration,
}

impl ConversationStore {
    pub fn new(capacity: usize, idle_timeout_minutes: u32) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            capacity,
            idle_timeout: Duration::minutes(i64::from(idle_timeout_minutes)),
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.capacity, config.idle_timeout_minutes)
    }

    fn map(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SharedMemory>>, ChatError> {
        self.users
            .lock()
            .map_err(|e| ChatError::StorageError(format!("memory lock poisoned: {}", e)))
    }

    fn existing(&self, user_id: &str) -> Result<Option<SharedMemory>, ChatError> {
        Ok(self.map()?.get(user_id).cloned())
    }

    fn get_or_create(&self, user_id: &str) -> Result<SharedMemory, ChatError> {
        if user_id.trim().is_empty() {
            return Err(ChatError::EmptyUserId);
        }
        let mut users = self.map()?;
        let entry = users.entry(user_id.to_string()).or_insert_with(|| {
            debug!(user_id = %user_id, "Creating conversation memory");
            Arc::new(AsyncMutex::new(ConversationMemory::new(
                user_id,
                self.capacity,
            )))
        });
        Ok(Arc::clone(entry))
    }

    /// Take exclusive access to a user's memory, creating it on first use.
    ///
    /// Holding the guard serializes turns for this user; other users are
    /// unaffected.
    pub async fn lock(&self, user_id: &str) -> Result<OwnedMutexGuard<ConversationMemory>, ChatError> {
        let memory = self.get_or_create(user_id)?;
        Ok(memory.lock_owned().await)
    }

    pub async fn append(&self, user_id: &str, turn: ConversationTurn) -> Result<(), ChatError> {
        self.lock(user_id).await?.append(turn);
        Ok(())
    }

    pub async fn last_query(&self, user_id: &str) -> Result<Option<Query>, ChatError> {
        match self.existing(user_id)? {
            Some(memory) => Ok(memory.lock().await.last_query().cloned()),
            None => Ok(None),
        }
    }

    pub async fn last_result_summary(
        &self,
        user_id: &str,
    ) -> Result<Option<ResultSummary>, ChatError> {
        match self.existing(user_id)? {
            Some(memory) => Ok(memory.lock().await.last_result_summary().cloned()),
            None => Ok(None),
        }
    }

    /// Drop all history for a user. Unknown users are a no-op.
    pub async fn clear(&self, user_id: &str) -> Result<(), ChatError> {
        if let Some(memory) = self.existing(user_id)? {
            memory.lock().await.clear();
        }
        Ok(())
    }

    /// Retained turns for a user, oldest first.
    pub async fn turns(&self, user_id: &str) -> Result<Vec<ConversationTurn>, ChatError> {
        match self.existing(user_id)? {
            Some(memory) => Ok(memory.lock().await.turns().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    pub async fn stats(&self, user_id: &str) -> Result<Option<MemoryStats>, ChatError> {
        match self.existing(user_id)? {
            Some(memory) => Ok(Some(memory.lock().await.stats())),
            None => Ok(None),
        }
    }

    /// Known user ids, sorted.
    pub fn users(&self) -> Result<Vec<String>, ChatError> {
        let mut ids: Vec<String> = self.map()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    pub fn len(&self) -> Result<usize, ChatError> {
        Ok(self.map()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, ChatError> {
        Ok(self.map()?.is_empty())
    }

    /// Drop users idle longer than the configured timeout.
    pub fn evict_idle(&self) -> Result<usize, ChatError> {
        self.evict_idle_at(Utc::now())
    }

    /// Like [`Self::evict_idle`], measured against `now`.
    ///
    /// Memories that are locked or referenced by an in-flight turn are
    /// skipped.
    pub fn evict_idle_at(&self, now: DateTime<Utc>) -> Result<usize, ChatError> {
        let mut users = self.map()?;
        let before = users.len();
        users.retain(|_, memory| {
            if Arc::strong_count(memory) > 1 {
                return true;
            }
            match memory.try_lock() {
                Ok(guard) => !guard.is_idle(now, self.idle_timeout),
                Err(_) => true,
            }
        });
        let evicted = before - users.len();
        if evicted > 0 {
            info!(evicted, remaining = users.len(), "Evicted idle conversations");
        }
        Ok(evicted)
    }
}
