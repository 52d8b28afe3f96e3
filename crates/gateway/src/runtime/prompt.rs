//! Prompt assembly: persona + date banner + extra context as one system
//! message, followed by the user's recent history in chronological order.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;

use cb_domain::config::PromptConfig;
use cb_domain::error::{Error, Result};
use cb_domain::message::{ChatMessage, Role};
use cb_domain::trace::TraceEvent;
use cb_domain::turn::RetrievedSnippet;
use cb_sessions::HistoryStore;

use super::compact::HistoryCompressor;

/// The backend rejects empty message content.
const EMPTY_CONTENT_PLACEHOLDER: &str = " ";

pub struct PromptAssembler {
    history: Arc<dyn HistoryStore>,
    compressor: Arc<HistoryCompressor>,
    persona: String,
    tz: Tz,
    date_label: String,
    weekday_names: Vec<String>,
    context_heading: String,
}

impl PromptAssembler {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        compressor: Arc<HistoryCompressor>,
        cfg: &PromptConfig,
    ) -> Result<Self> {
        let tz: Tz = cfg
            .timezone
            .parse()
            .map_err(|e| Error::Config(format!("prompt.timezone: {e}")))?;
        Ok(Self {
            history,
            compressor,
            persona: cfg.persona.clone(),
            tz,
            date_label: cfg.date_label.clone(),
            weekday_names: cfg.weekday_names.clone(),
            context_heading: cfg.context_heading.clone(),
        })
    }

    /// `Now (Asia/Dubai): Tuesday, 05.03.2024 14:07`
    pub fn date_banner(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.tz);
        let idx = local.weekday().num_days_from_monday() as usize;
        let weekday = self
            .weekday_names
            .get(idx)
            .cloned()
            .unwrap_or_else(|| local.format("%A").to_string());
        format!(
            "{} ({}): {}, {}",
            self.date_label,
            self.tz.name(),
            weekday,
            local.format("%d.%m.%Y %H:%M")
        )
    }

    pub async fn build_messages(
        &self,
        user_id: &str,
        history_limit: usize,
        extra_context: Option<&str>,
    ) -> Result<Vec<ChatMessage>> {
        self.build_messages_at(user_id, history_limit, extra_context, Utc::now())
            .await
    }

    pub async fn build_messages_at(
        &self,
        user_id: &str,
        history_limit: usize,
        extra_context: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>> {
        // Compression failures only skip compression for this turn.
        if let Err(e) = self.compressor.maybe_compress(user_id).await {
            tracing::warn!(user_id = user_id, error = %e, "history compression skipped");
        }

        let turns = self.history.last_n(user_id, history_limit).await?;

        let mut system = format!("{}\n\n{}", self.persona, self.date_banner(now));
        let extra = extra_context.map(str::trim).filter(|e| !e.is_empty());
        if let Some(extra) = extra {
            system.push_str("\n\n");
            system.push_str(&self.context_heading);
            system.push('\n');
            system.push_str(extra);
        }

        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatMessage::system(system));
        for turn in &turns {
            let content = if turn.content.is_empty() {
                EMPTY_CONTENT_PLACEHOLDER.to_owned()
            } else {
                turn.content.clone()
            };
            messages.push(ChatMessage { role: Role::from_stored(&turn.role), content });
        }

        TraceEvent::PromptBuilt {
            user_id: user_id.to_owned(),
            history_turns: turns.len(),
            system_chars: messages[0].content.chars().count(),
            extra_context_chars: extra.map_or(0, |e| e.chars().count()),
        }
        .emit();

        Ok(messages)
    }
}

/// Render retrieved snippets as a labelled block, or `None` when empty.
pub fn format_snippets(label: &str, snippets: &[RetrievedSnippet]) -> Option<String> {
    if snippets.is_empty() {
        return None;
    }
    let mut out = String::from(label);
    out.push('\n');
    for (i, s) in snippets.iter().enumerate() {
        out.push_str(&format!(
            "\n--- Fragment #{} (score={:.4}) ---\n{}\n",
            i + 1,
            s.relevance_score,
            s.text
        ));
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::compact::PlaceholderSummarizer;
    use cb_domain::turn::NewTurn;
    use cb_sessions::MemoryHistoryStore;
    use chrono::TimeZone;

    fn assembler(store: Arc<MemoryHistoryStore>) -> PromptAssembler {
        let compressor = Arc::new(HistoryCompressor::new(
            store.clone(),
            Arc::new(PlaceholderSummarizer),
            20,
            10,
        ));
        let cfg = PromptConfig { persona: "PERSONA".into(), ..PromptConfig::default() };
        PromptAssembler::new(store, compressor, &cfg).unwrap()
    }

    fn tuesday_noon_utc() -> DateTime<Utc> {
        // 2024-03-05 10:07 UTC is 14:07 in Dubai.
        Utc.with_ymd_and_hms(2024, 3, 5, 10, 7, 0).unwrap()
    }

    #[test]
    fn banner_uses_local_time_and_weekday_names() {
        let a = assembler(Arc::new(MemoryHistoryStore::new()));
        assert_eq!(
            a.date_banner(tuesday_noon_utc()),
            "Now (Asia/Dubai): Tuesday, 05.03.2024 14:07"
        );
    }

    #[test]
    fn unknown_timezone_is_config_error() {
        let store: Arc<MemoryHistoryStore> = Arc::new(MemoryHistoryStore::new());
        let compressor = Arc::new(HistoryCompressor::new(
            store.clone(),
            Arc::new(PlaceholderSummarizer),
            20,
            10,
        ));
        let cfg = PromptConfig { timezone: "Nowhere/City".into(), ..PromptConfig::default() };
        assert!(matches!(
            PromptAssembler::new(store, compressor, &cfg),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn system_first_then_history_in_order() {
        let store = Arc::new(MemoryHistoryStore::new());
        store.append(NewTurn::user("u", "q1")).await.unwrap();
        store.append(NewTurn::assistant("u", "a1")).await.unwrap();
        store.append(NewTurn::user("u", "q2")).await.unwrap();

        let msgs = assembler(store)
            .build_messages_at("u", 15, Some("REF"), tuesday_noon_utc())
            .await
            .unwrap();

        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[0].content.starts_with("PERSONA\n\nNow (Asia/Dubai)"));
        assert!(msgs[0].content.ends_with("(Additional context)\nREF"));
        let rest: Vec<_> = msgs[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(rest, vec!["q1", "a1", "q2"]);
        assert_eq!(msgs[2].role, Role::Assistant);
    }

    #[tokio::test]
    async fn coerces_roles_and_empty_content() {
        let store = Arc::new(MemoryHistoryStore::new());
        store.append(NewTurn::with_role("u", "operator", "note")).await.unwrap();
        store.append(NewTurn::user("u", "")).await.unwrap();

        let msgs = assembler(store).build_messages("u", 15, None).await.unwrap();
        assert_eq!(msgs[1].role, Role::User);
        assert_eq!(msgs[2].content, " ");
        assert!(!msgs[0].content.contains("(Additional context)"));
    }

    #[tokio::test]
    async fn history_limit_keeps_most_recent() {
        let store = Arc::new(MemoryHistoryStore::new());
        for i in 0..6 {
            store.append(NewTurn::user("u", format!("m{i}"))).await.unwrap();
        }
        let msgs = assembler(store).build_messages("u", 3, None).await.unwrap();
        let rest: Vec<_> = msgs[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(rest, vec!["m3", "m4", "m5"]);
    }

    #[tokio::test]
    async fn compresses_before_fetching() {
        let store = Arc::new(MemoryHistoryStore::new());
        for i in 0..21 {
            store.append(NewTurn::user("u", format!("m{i}"))).await.unwrap();
        }
        let msgs = assembler(store.clone()).build_messages("u", 15, None).await.unwrap();
        assert_eq!(store.snapshot("u").len(), 12);
        assert_eq!(msgs.last().unwrap().content, "(Summary of 21 messages...)");
    }

    #[test]
    fn snippets_are_numbered_with_scores() {
        let block = format_snippets(
            "Reference material:",
            &[
                RetrievedSnippet { text: "Pool opens at 7".into(), relevance_score: 0.91234 },
                RetrievedSnippet { text: "Gym on floor 2".into(), relevance_score: 0.5 },
            ],
        )
        .unwrap();
        assert!(block.starts_with("Reference material:\n"));
        assert!(block.contains("--- Fragment #1 (score=0.9123) ---\nPool opens at 7\n"));
        assert!(block.contains("--- Fragment #2 (score=0.5000) ---\nGym on floor 2\n"));
        assert!(format_snippets("x", &[]).is_none());
    }
}
