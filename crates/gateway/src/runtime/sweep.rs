//! Housekeeping pass run on an interval by the background task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;

use crate::transport::Messenger;

use super::deletions::DeletionQueue;
use super::welcome::WelcomeManager;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub welcomes_cleared: usize,
    pub messages_deleted: usize,
    pub delete_failures: usize,
}

pub struct Sweeper {
    welcome: Arc<WelcomeManager>,
    deletions: Arc<DeletionQueue>,
    messenger: Arc<dyn Messenger>,
}

impl Sweeper {
    pub fn new(
        welcome: Arc<WelcomeManager>,
        deletions: Arc<DeletionQueue>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self { welcome, deletions, messenger }
    }

    pub async fn tick(&self) -> SweepReport {
        self.tick_at(Utc::now()).await
    }

    /// Tear down every welcome announcement, then delete queued messages
    /// that are due. Failures are logged; a failed delete is not retried.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        match self.welcome.teardown_all().await {
            Ok(n) => report.welcomes_cleared = n,
            Err(e) => tracing::warn!(error = %e, "welcome sweep failed"),
        }

        let due = match self.deletions.drain_due(now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!(error = %e, "deletion queue drain failed");
                Vec::new()
            }
        };

        let results = join_all(
            due.iter()
                .map(|p| self.messenger.delete(p.chat_id, p.message_ref)),
        )
        .await;
        for (pending, result) in due.iter().zip(results) {
            match result {
                Ok(()) => report.messages_deleted += 1,
                Err(e) => {
                    report.delete_failures += 1;
                    tracing::warn!(
                        chat_id = pending.chat_id,
                        message_ref = pending.message_ref,
                        error = %e,
                        "queued delete failed"
                    );
                }
            }
        }

        if report != SweepReport::default() {
            tracing::info!(
                welcomes_cleared = report.welcomes_cleared,
                messages_deleted = report.messages_deleted,
                delete_failures = report.delete_failures,
                "sweep complete"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::chat_lock::ChatLockMap;
    use crate::runtime::deletions::PendingDeletion;
    use crate::transport::MemoryTransport;
    use cb_domain::config::WelcomeConfig;
    use cb_domain::welcome::WelcomeRecord;
    use cb_sessions::MemoryRecordStore;
    use chrono::Duration;

    #[tokio::test]
    async fn tick_clears_welcomes_and_due_deletions() {
        let transport = Arc::new(MemoryTransport::new());
        let welcome = Arc::new(WelcomeManager::new(
            Arc::new(MemoryRecordStore::<WelcomeRecord>::new()),
            transport.clone(),
            Arc::new(ChatLockMap::new()),
            &WelcomeConfig::default(),
        ));
        let deletions = Arc::new(DeletionQueue::new(Arc::new(
            MemoryRecordStore::<Vec<PendingDeletion>>::new(),
        )));
        let now = Utc::now();
        welcome.handle_join_at(-1, &["A".to_string()], now).await.unwrap();
        deletions.schedule_at(-1, 500, 0, now).await.unwrap();
        deletions.schedule_at(-1, 501, 3600, now).await.unwrap();

        let sweeper = Sweeper::new(welcome.clone(), deletions.clone(), transport.clone());
        let report = sweeper.tick_at(now + Duration::seconds(1)).await;

        assert_eq!(
            report,
            SweepReport { welcomes_cleared: 1, messages_deleted: 1, delete_failures: 0 }
        );
        assert!(welcome.active(-1).await.is_none());
        assert!(transport.deleted().contains(&(-1, 500)));
        assert_eq!(deletions.pending_count().await, 1);

        assert_eq!(sweeper.tick_at(now + Duration::seconds(2)).await, SweepReport::default());
    }
}
