//! Per-user conversation history.
//!
//! The [`HistoryStore`] trait is the only way the pipeline touches stored
//! turns. Ids are monotonic across the whole store, so ordering by id is
//! chronological order.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use cb_domain::error::Result;
use cb_domain::turn::{ConversationTurn, NewTurn};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Store a turn and return the id assigned to it.
    async fn append(&self, turn: NewTurn) -> Result<u64>;

    /// The most recent `n` turns, oldest first.
    async fn last_n(&self, user_id: &str, n: usize) -> Result<Vec<ConversationTurn>>;

    /// The oldest `n` turns, oldest first.
    async fn oldest_n(&self, user_id: &str, n: usize) -> Result<Vec<ConversationTurn>>;

    async fn count(&self, user_id: &str) -> Result<usize>;

    /// Remove turns by id. Unknown ids are ignored.
    async fn delete(&self, user_id: &str, ids: &[u64]) -> Result<()>;

    /// Swap `ids` for a single new turn.
    ///
    /// The new turn is stored before anything is removed, so a failure
    /// between the two halves leaves both old and new data in place.
    async fn replace(&self, user_id: &str, ids: &[u64], turn: NewTurn) -> Result<u64> {
        let id = self.append(turn).await?;
        self.delete(user_id, ids).await?;
        Ok(id)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct MemoryInner {
    next_id: u64,
    users: HashMap<String, BTreeMap<u64, ConversationTurn>>,
}

/// Volatile history store used by tests and the one-shot CLI.
#[derive(Default)]
pub struct MemoryHistoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored turn for a user, oldest first.
    pub fn snapshot(&self, user_id: &str) -> Vec<ConversationTurn> {
        self.inner
            .lock()
            .users
            .get(user_id)
            .map(|turns| turns.values().cloned().collect())
            .unwrap_or_default()
    }
}

fn push(inner: &mut MemoryInner, turn: NewTurn) -> u64 {
    inner.next_id += 1;
    let id = inner.next_id;
    inner
        .users
        .entry(turn.user_id.clone())
        .or_default()
        .insert(id, turn.into_turn(id));
    id
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, turn: NewTurn) -> Result<u64> {
        Ok(push(&mut self.inner.lock(), turn))
    }

    async fn last_n(&self, user_id: &str, n: usize) -> Result<Vec<ConversationTurn>> {
        let inner = self.inner.lock();
        let Some(turns) = inner.users.get(user_id) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<_> = turns.values().rev().take(n).cloned().collect();
        out.reverse();
        Ok(out)
    }

    async fn oldest_n(&self, user_id: &str, n: usize) -> Result<Vec<ConversationTurn>> {
        let inner = self.inner.lock();
        Ok(inner
            .users
            .get(user_id)
            .map(|turns| turns.values().take(n).cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self, user_id: &str) -> Result<usize> {
        Ok(self.inner.lock().users.get(user_id).map_or(0, BTreeMap::len))
    }

    async fn delete(&self, user_id: &str, ids: &[u64]) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(turns) = inner.users.get_mut(user_id) {
            for id in ids {
                turns.remove(id);
            }
        }
        Ok(())
    }

    async fn replace(&self, user_id: &str, ids: &[u64], turn: NewTurn) -> Result<u64> {
        let mut inner = self.inner.lock();
        let id = push(&mut inner, turn);
        if let Some(turns) = inner.users.get_mut(user_id) {
            for old in ids {
                turns.remove(old);
            }
        }
        Ok(id)
    }
}
