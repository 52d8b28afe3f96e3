//! Messages scheduled for removal (join/leave service messages).
//!
//! The queue is one record in a [`RecordStore`]; every mutation runs
//! under an internal mutex so concurrent schedules never drop entries.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use cb_domain::error::Result;
use cb_domain::trace::TraceEvent;
use cb_sessions::RecordStore;

use crate::transport::MessageRef;

const QUEUE_KEY: &str = "pending";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeletion {
    pub chat_id: i64,
    pub message_ref: MessageRef,
    pub delete_after: DateTime<Utc>,
}

pub struct DeletionQueue {
    store: Arc<dyn RecordStore<Vec<PendingDeletion>>>,
    lock: tokio::sync::Mutex<()>,
}

impl DeletionQueue {
    pub fn new(store: Arc<dyn RecordStore<Vec<PendingDeletion>>>) -> Self {
        Self { store, lock: tokio::sync::Mutex::new(()) }
    }

    pub async fn schedule(&self, chat_id: i64, message_ref: MessageRef, delay_secs: u64) -> Result<()> {
        self.schedule_at(chat_id, message_ref, delay_secs, Utc::now()).await
    }

    pub async fn schedule_at(
        &self,
        chat_id: i64,
        message_ref: MessageRef,
        delay_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let delete_after = now + Duration::seconds(delay_secs as i64);
        let _guard = self.lock.lock().await;
        let mut pending = self.load().await;
        pending.push(PendingDeletion { chat_id, message_ref, delete_after });
        self.store.put(QUEUE_KEY, pending).await?;

        TraceEvent::MessageQueuedForDeletion { chat_id, message_ref, delay_secs }.emit();
        Ok(())
    }

    /// Remove and return every entry due at `now`.
    pub async fn drain_due(&self, now: DateTime<Utc>) -> Result<Vec<PendingDeletion>> {
        let _guard = self.lock.lock().await;
        let pending = self.load().await;
        let (due, keep): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|p| p.delete_after <= now);
        if !due.is_empty() {
            self.store.put(QUEUE_KEY, keep).await?;
        }
        Ok(due)
    }

    pub async fn pending_count(&self) -> usize {
        self.load().await.len()
    }

    async fn load(&self) -> Vec<PendingDeletion> {
        match self.store.get(QUEUE_KEY).await {
            Ok(pending) => pending.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "deletion queue unreadable, starting empty");
                Vec::new()
            }
        }
    }
}
