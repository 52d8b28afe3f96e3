//! Session orchestrator: one inbound message in, one display reply out.
//!
//! Ordering per turn: persist inbound, escalate on inbound, retrieve,
//! assemble, complete, persist reply, escalate on reply, parse. Backend
//! failures become a diagnostic reply; nothing here fails the turn.

use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;

use cb_domain::error::Error;
use cb_domain::reply::ActionItem;
use cb_domain::turn::{NewTurn, TurnKind};
use cb_providers::{ChatRequest, LlmProvider, RetrievalProvider, TranscriptionProvider};
use cb_sessions::HistoryStore;

use super::escalation::EscalationDetector;
use super::prompt::{format_snippets, PromptAssembler};
use super::reply;

pub const EMPTY_REPLY_DIAGNOSTIC: &str = "Could not get a response from the model.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inputs / outputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Who sent an inbound event and where.
#[derive(Debug, Clone)]
pub struct InboundMeta {
    pub user_id: String,
    pub display_name: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone)]
pub enum InboundEvent {
    Text(String),
    Voice { audio_ref: String },
    /// An inline action was activated; carries its token.
    ButtonPressed { token: String },
}

/// One resolved turn. Voice input arrives here already transcribed.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub meta: InboundMeta,
    pub text: String,
    pub kind: TurnKind,
    pub source_ref: Option<String>,
}

impl TurnInput {
    pub fn text(meta: InboundMeta, text: impl Into<String>) -> Self {
        Self { meta, text: text.into(), kind: TurnKind::Text, source_ref: None }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub turn_id: String,
    pub display_text: String,
    pub actions: Vec<ActionItem>,
    /// Whether either escalation check fired.
    pub escalated: bool,
}

impl TurnOutcome {
    fn diagnostic(turn_id: String, text: String) -> Self {
        Self { turn_id, display_text: text, actions: Vec::new(), escalated: false }
    }
}

/// Per-turn knobs lifted out of config.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub chat_model: Option<String>,
    pub temperature: f32,
    pub history_limit: usize,
    pub retrieval_top_k: usize,
    pub retrieval_label: String,
}

/// User-visible text for a failed completion.
pub fn diagnostic_for(err: &Error) -> String {
    match err {
        e if e.is_connection() => format!("API connection error: {e}"),
        Error::Provider { message, .. } => format!("API returned an error: {message}"),
        e => format!("Unexpected error: {e}"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SessionOrchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionOrchestrator {
    history: Arc<dyn HistoryStore>,
    prompt: Arc<PromptAssembler>,
    escalation: Arc<EscalationDetector>,
    llm: Arc<dyn LlmProvider>,
    retrieval: Option<Arc<dyn RetrievalProvider>>,
    transcriber: Option<Arc<dyn TranscriptionProvider>>,
    settings: TurnSettings,
}

impl SessionOrchestrator {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        prompt: Arc<PromptAssembler>,
        escalation: Arc<EscalationDetector>,
        llm: Arc<dyn LlmProvider>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            history,
            prompt,
            escalation,
            llm,
            retrieval: None,
            transcriber: None,
            settings,
        }
    }

    pub fn with_retrieval(mut self, retrieval: Arc<dyn RetrievalProvider>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn TranscriptionProvider>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Resolve a raw inbound event into a turn and run it.
    pub async fn handle_event(&self, meta: InboundMeta, event: InboundEvent) -> TurnOutcome {
        match event {
            InboundEvent::Text(text) => self.handle_turn(TurnInput::text(meta, text)).await,
            InboundEvent::ButtonPressed { token } => {
                let text = format!("button pressed: {token}");
                self.handle_turn(TurnInput::text(meta, text)).await
            }
            InboundEvent::Voice { audio_ref } => {
                let transcribed = match &self.transcriber {
                    Some(t) => t.transcribe(&audio_ref).await,
                    None => Err(Error::Other("no transcription backend configured".into())),
                };
                match transcribed {
                    Ok(text) => {
                        self.handle_turn(TurnInput {
                            meta,
                            text,
                            kind: TurnKind::Voice,
                            source_ref: Some(audio_ref),
                        })
                        .await
                    }
                    Err(e) => {
                        tracing::warn!(user_id = %meta.user_id, error = %e, "transcription failed");
                        TurnOutcome::diagnostic(new_turn_id(), format!("Recognition error: {e}"))
                    }
                }
            }
        }
    }

    pub async fn handle_turn(&self, input: TurnInput) -> TurnOutcome {
        let turn_id = new_turn_id();
        let span = tracing::info_span!(
            "turn",
            turn_id = %turn_id,
            user_id = %input.meta.user_id,
            chat_id = input.meta.chat_id,
            kind = input.kind.as_str(),
        );
        self.run(turn_id, input).instrument(span).await
    }

    async fn run(&self, turn_id: String, input: TurnInput) -> TurnOutcome {
        let TurnInput { meta, text, kind, source_ref } = input;
        let user_id = meta.user_id.as_str();

        // ── Persist inbound ──────────────────────────────────────────
        let mut inbound = NewTurn::user(user_id, text.as_str());
        if kind == TurnKind::Voice {
            inbound = inbound.voice(source_ref);
        }
        if let Err(e) = self.history.append(inbound).await {
            // Without the inbound turn the prompt would be missing the
            // question itself.
            tracing::error!(error = %e, "failed to persist inbound turn");
            return TurnOutcome::diagnostic(turn_id, diagnostic_for(&e));
        }

        let mut escalated = self
            .escalation
            .check_and_spawn(&text, user_id, &meta.display_name, meta.chat_id)
            .await;

        // ── Retrieval ────────────────────────────────────────────────
        let extra_context = self.retrieve(&text).await;

        // ── Completion ───────────────────────────────────────────────
        let reply_text = match self
            .prompt
            .build_messages(user_id, self.settings.history_limit, extra_context.as_deref())
            .await
        {
            Ok(messages) => self.complete(messages).await,
            Err(e) => {
                tracing::warn!(error = %e, "prompt assembly failed");
                diagnostic_for(&e)
            }
        };

        // ── Persist reply ────────────────────────────────────────────
        if let Err(e) = self.history.append(NewTurn::assistant(user_id, reply_text.as_str())).await {
            tracing::warn!(error = %e, "failed to persist reply turn");
        }

        escalated |= self
            .escalation
            .check_and_spawn(&reply_text, user_id, &meta.display_name, meta.chat_id)
            .await;

        let parsed = reply::parse(&reply_text);
        tracing::debug!(
            display_chars = parsed.display_text.len(),
            actions = parsed.actions.len(),
            escalated,
            "turn complete"
        );

        TurnOutcome {
            turn_id,
            display_text: parsed.display_text,
            actions: parsed.actions,
            escalated,
        }
    }

    async fn retrieve(&self, query: &str) -> Option<String> {
        let retrieval = self.retrieval.as_ref()?;
        match retrieval.search(query, self.settings.retrieval_top_k).await {
            Ok(snippets) => format_snippets(&self.settings.retrieval_label, &snippets),
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, continuing without context");
                None
            }
        }
    }

    async fn complete(&self, messages: Vec<cb_domain::message::ChatMessage>) -> String {
        let req = ChatRequest {
            messages,
            temperature: Some(self.settings.temperature),
            max_tokens: None,
            model: self.settings.chat_model.clone(),
            purpose: "chat",
        };
        match self.llm.chat(req).await {
            Ok(resp) if resp.content.trim().is_empty() => EMPTY_REPLY_DIAGNOSTIC.to_owned(),
            Ok(resp) => resp.content.trim().to_owned(),
            Err(e) => {
                tracing::warn!(provider = self.llm.provider_id(), error = %e, "completion failed");
                diagnostic_for(&e)
            }
        }
    }
}

fn new_turn_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
