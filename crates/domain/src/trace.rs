use serde::Serialize;

/// Structured trace events emitted across all ConciergeBot crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TurnAppended {
        user_id: String,
        turn_id: u64,
        role: String,
        kind: String,
    },
    HistoryCompressed {
        user_id: String,
        removed: usize,
        total_before: usize,
        summary_id: u64,
    },
    PromptBuilt {
        user_id: String,
        history_turns: usize,
        system_chars: usize,
        extra_context_chars: usize,
    },
    RetrievalFetched {
        query_chars: usize,
        snippets: usize,
        duration_ms: u64,
    },
    LlmRequest {
        provider: String,
        model: String,
        purpose: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    ReplyParsed {
        display_chars: usize,
        actions: usize,
        block_found: bool,
    },
    EscalationDispatched {
        user_id: String,
        chat_id: i64,
        context_turns: usize,
        delivered: bool,
    },
    WelcomeCreated {
        chat_id: i64,
        message_ref: i64,
        mentioned: usize,
    },
    WelcomeMerged {
        chat_id: i64,
        message_ref: i64,
        mentioned: usize,
        edited: bool,
    },
    WelcomeReplaced {
        old_chat_id: i64,
        new_chat_id: i64,
        reason: String,
    },
    WelcomeCleared {
        chat_id: i64,
        message_ref: i64,
    },
    MessageQueuedForDeletion {
        chat_id: i64,
        message_ref: i64,
        delay_secs: u64,
    },
    SpamRemoved {
        chat_id: i64,
        user_id: i64,
        message_ref: i64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cb_event");
    }
}
