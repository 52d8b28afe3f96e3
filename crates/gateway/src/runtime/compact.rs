//! History compression: once a user's stored history passes the ceiling,
//! the oldest block is folded into one assistant-role summary turn.
//!
//! Safe to call on every turn; below the ceiling it only reads the count.
//! The summary is stored before the block is removed (see
//! [`HistoryStore::replace`]), so a failure part-way never loses data.

use std::sync::Arc;

use async_trait::async_trait;

use cb_domain::error::Result;
use cb_domain::message::ChatMessage;
use cb_domain::trace::TraceEvent;
use cb_domain::turn::{ConversationTurn, NewTurn};
use cb_providers::traits::ChatRequest;
use cb_providers::LlmProvider;
use cb_sessions::HistoryStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Summarizers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarise `block`. `total` is the user's stored count before
    /// compression.
    async fn summarize(&self, block: &[ConversationTurn], total: usize) -> Result<String>;
}

/// Fixed marker text; never calls a backend.
pub struct PlaceholderSummarizer;

#[async_trait]
impl Summarizer for PlaceholderSummarizer {
    async fn summarize(&self, _block: &[ConversationTurn], total: usize) -> Result<String> {
        Ok(format!("(Summary of {total} messages...)"))
    }
}

/// Asks the completion backend for a real summary.
pub struct LlmSummarizer {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: Option<String>) -> Self {
        Self { provider, model }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, block: &[ConversationTurn], _total: usize) -> Result<String> {
        let conversation = build_conversation_text(block);

        let prompt = format!(
            "You are a conversation summarizer. Summarize the following part of a \
             conversation between a guest and a concierge assistant. Keep the \
             guest's requests, any facts they shared about themselves, and \
             what was promised or left open.\n\
             Be concise. Omit greetings and pleasantries. Write in present tense.\n\n\
             CONVERSATION:\n{conversation}"
        );

        let resp = self
            .provider
            .chat(ChatRequest {
                messages: vec![ChatMessage::user(prompt)],
                temperature: Some(0.1),
                max_tokens: Some(600),
                model: self.model.clone(),
                purpose: "summary",
            })
            .await?;
        Ok(resp.content)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compressor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HistoryCompressor {
    history: Arc<dyn HistoryStore>,
    summarizer: Arc<dyn Summarizer>,
    max_turns: usize,
    batch: usize,
}

impl HistoryCompressor {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        summarizer: Arc<dyn Summarizer>,
        max_turns: usize,
        batch: usize,
    ) -> Self {
        Self { history, summarizer, max_turns, batch }
    }

    /// Compress the oldest block if the history is over the ceiling.
    ///
    /// Returns the id of the new summary turn, or `None` when nothing was
    /// done. Any error leaves the stored history untouched or, at worst,
    /// holding both the old block and its summary.
    pub async fn maybe_compress(&self, user_id: &str) -> Result<Option<u64>> {
        let total = self.history.count(user_id).await?;
        if total <= self.max_turns || self.batch == 0 {
            return Ok(None);
        }

        let block = self.history.oldest_n(user_id, self.batch).await?;
        if block.len() < self.batch {
            return Ok(None);
        }

        let summary = self.summarizer.summarize(&block, total).await?;
        let ids: Vec<u64> = block.iter().map(|t| t.id).collect();
        let summary_id = self
            .history
            .replace(user_id, &ids, NewTurn::assistant(user_id, summary))
            .await?;

        TraceEvent::HistoryCompressed {
            user_id: user_id.to_owned(),
            removed: ids.len(),
            total_before: total,
            summary_id,
        }
        .emit();

        tracing::info!(
            user_id = user_id,
            removed = ids.len(),
            total_before = total,
            "history compressed"
        );

        Ok(Some(summary_id))
    }
}

fn build_conversation_text(turns: &[ConversationTurn]) -> String {
    let mut buf = String::new();
    for turn in turns {
        let role_label = match turn.role.as_str() {
            "user" => "Guest",
            "assistant" => "Assistant",
            "system" => "System",
            other => other,
        };
        buf.push_str(role_label);
        buf.push_str(": ");
        // Keep very long turns from dominating the summary prompt.
        let chars = turn.content.chars().count();
        if chars > 2000 {
            let head: String = turn.content.chars().take(1000).collect();
            let tail: String = turn.content.chars().skip(chars - 500).collect();
            buf.push_str(&head);
            buf.push_str(" [...] ");
            buf.push_str(&tail);
        } else {
            buf.push_str(&turn.content);
        }
        buf.push('\n');
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use cb_domain::error::Error;
    use cb_sessions::MemoryHistoryStore;

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _: &[ConversationTurn], _: usize) -> Result<String> {
            Err(Error::Timeout("summarizer".into()))
        }
    }

    /// Memory store whose deletes always fail; `replace` stays the trait default.
    struct DeleteFails(Arc<MemoryHistoryStore>);

    #[async_trait]
    impl HistoryStore for DeleteFails {
        async fn append(&self, turn: NewTurn) -> Result<u64> {
            self.0.append(turn).await
        }
        async fn last_n(&self, user_id: &str, n: usize) -> Result<Vec<ConversationTurn>> {
            self.0.last_n(user_id, n).await
        }
        async fn oldest_n(&self, user_id: &str, n: usize) -> Result<Vec<ConversationTurn>> {
            self.0.oldest_n(user_id, n).await
        }
        async fn count(&self, user_id: &str) -> Result<usize> {
            self.0.count(user_id).await
        }
        async fn delete(&self, _user_id: &str, _ids: &[u64]) -> Result<()> {
            Err(Error::Store("disk full".into()))
        }
    }

    async fn seeded(n: usize) -> Arc<MemoryHistoryStore> {
        let store = Arc::new(MemoryHistoryStore::new());
        for i in 0..n {
            let turn = if i % 2 == 0 {
                NewTurn::user("u", format!("m{i}"))
            } else {
                NewTurn::assistant("u", format!("m{i}"))
            };
            store.append(turn).await.unwrap();
        }
        store
    }

    fn compressor(store: Arc<MemoryHistoryStore>) -> HistoryCompressor {
        HistoryCompressor::new(store, Arc::new(PlaceholderSummarizer), 20, 10)
    }

    #[tokio::test]
    async fn at_or_below_ceiling_is_noop() {
        for n in [0, 1, 10, 20] {
            let store = seeded(n).await;
            let before = store.snapshot("u");
            assert_eq!(compressor(store.clone()).maybe_compress("u").await.unwrap(), None);
            assert_eq!(store.snapshot("u"), before);
        }
    }

    #[tokio::test]
    async fn over_ceiling_folds_oldest_block() {
        let store = seeded(21).await;
        let before = store.snapshot("u");

        let id = compressor(store.clone()).maybe_compress("u").await.unwrap().unwrap();

        let after = store.snapshot("u");
        assert_eq!(after.len(), 21 - 10 + 1);
        // Untouched turns keep their order.
        assert_eq!(&after[..11], &before[10..]);
        let summary = after.last().unwrap();
        assert_eq!(summary.id, id);
        assert_eq!(summary.role, "assistant");
        assert_eq!(summary.content, "(Summary of 21 messages...)");
    }

    #[tokio::test]
    async fn repeated_calls_settle_below_ceiling() {
        let store = seeded(35).await;
        let c = compressor(store.clone());
        while c.maybe_compress("u").await.unwrap().is_some() {}
        assert!(store.snapshot("u").len() <= 20);
    }

    #[tokio::test]
    async fn summarizer_failure_leaves_history_untouched() {
        let store = seeded(25).await;
        let before = store.snapshot("u");
        let c = HistoryCompressor::new(store.clone(), Arc::new(FailingSummarizer), 20, 10);
        assert!(c.maybe_compress("u").await.is_err());
        assert_eq!(store.snapshot("u"), before);
    }

    #[tokio::test]
    async fn delete_failure_keeps_block_and_summary() {
        let store = seeded(21).await;
        let before = store.snapshot("u");
        let c = HistoryCompressor::new(
            Arc::new(DeleteFails(store.clone())),
            Arc::new(PlaceholderSummarizer),
            20,
            10,
        );

        assert!(matches!(c.maybe_compress("u").await, Err(Error::Store(_))));

        let after = store.snapshot("u");
        assert_eq!(after.len(), 22);
        assert_eq!(&after[..21], &before[..]);
        assert_eq!(after[21].role, "assistant");
        assert_eq!(after[21].content, "(Summary of 21 messages...)");
    }

    #[test]
    fn conversation_text_labels_roles() {
        let turns = vec![
            NewTurn::user("u", "hi").into_turn(1),
            NewTurn::assistant("u", "hello").into_turn(2),
        ];
        assert_eq!(build_conversation_text(&turns), "Guest: hi\nAssistant: hello\n");
    }
}
