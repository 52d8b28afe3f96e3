//! AppState construction and background-task spawning.
//!
//! Every front end (`serve`, `run`, `chat`, `sweep`) boots through
//! [`build_app_state`] so they all see the same wiring.

use std::sync::Arc;

use anyhow::Context;

use cb_domain::config::{Config, ConfigSeverity, LlmConfig, SummarizerKind};
use cb_domain::welcome::WelcomeRecord;
use cb_providers::{
    EmbeddingProvider, EmbeddingRetriever, LlmProvider, OpenAiCompatProvider, RetrievalProvider,
    TranscriptionProvider,
};
use cb_sessions::{HistoryStore, JsonRecordStore, JsonlHistoryStore};

use crate::audit::{AuditLog, JsonlAuditLog};
use crate::runtime::{
    ChatLockMap, DeletionQueue, EscalationDetector, HistoryCompressor, LlmSummarizer,
    MembershipHandler, Moderator, PendingDeletion, PlaceholderSummarizer, PromptAssembler,
    SessionOrchestrator, Summarizer, Sweeper, TurnSettings, WelcomeManager,
};
use crate::state::AppState;
use crate::transport::{Messenger, Notifier};

/// The external services the core consumes. Injected so front ends and
/// tests can swap any of them.
#[derive(Clone)]
pub struct Collaborators {
    pub messenger: Arc<dyn Messenger>,
    pub notifier: Arc<dyn Notifier>,
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub transcriber: Arc<dyn TranscriptionProvider>,
}

impl Collaborators {
    /// Back every model call with one OpenAI-compatible client.
    pub fn openai(
        cfg: &LlmConfig,
        messenger: Arc<dyn Messenger>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let provider = Arc::new(
            OpenAiCompatProvider::from_config(cfg).context("initializing completion backend")?,
        );
        tracing::info!(
            base_url = %cfg.base_url,
            model = %cfg.chat_model,
            has_api_key = provider.has_api_key(),
            "completion backend ready"
        );
        Ok(Self {
            messenger,
            notifier,
            llm: provider.clone(),
            embedder: provider.clone(),
            transcriber: provider,
        })
    }
}

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub async fn build_app_state(
    config: Arc<Config>,
    collab: Collaborators,
) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if Config::has_errors(&issues) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── History store ────────────────────────────────────────────────
    let history_dir = config.storage.history_dir();
    let history: Arc<dyn HistoryStore> = Arc::new(
        JsonlHistoryStore::new(&history_dir).context("initializing history store")?,
    );
    tracing::info!(path = %history_dir.display(), "history store ready");

    // ── Compression + prompt assembly ────────────────────────────────
    let summarizer: Arc<dyn Summarizer> = match config.history.summarizer {
        SummarizerKind::Placeholder => Arc::new(PlaceholderSummarizer),
        SummarizerKind::Llm => Arc::new(LlmSummarizer::new(
            collab.llm.clone(),
            Some(config.llm.summary_model().to_owned()),
        )),
    };
    let compressor = Arc::new(HistoryCompressor::new(
        history.clone(),
        summarizer,
        config.history.max_turns,
        config.history.compress_batch,
    ));
    let prompt = Arc::new(
        PromptAssembler::new(history.clone(), compressor, &config.prompt)
            .context("initializing prompt assembler")?,
    );
    tracing::info!(
        max_turns = config.history.max_turns,
        compress_batch = config.history.compress_batch,
        summarizer = ?config.history.summarizer,
        timezone = %config.prompt.timezone,
        "prompt assembler ready"
    );

    // ── Escalation ───────────────────────────────────────────────────
    let escalation = Arc::new(EscalationDetector::new(
        history.clone(),
        collab.notifier.clone(),
        &config.escalation.operator_handle,
        config.escalation.operator_channel.clone(),
        config.escalation.context_turns,
    ));
    tracing::info!(
        handle = %config.escalation.operator_handle,
        channel = ?config.escalation.operator_channel,
        "escalation detector ready"
    );

    // ── Retrieval (optional) ─────────────────────────────────────────
    let retrieval: Option<Arc<dyn RetrievalProvider>> = match &config.retrieval.chunks_path {
        Some(path) => {
            let retriever = EmbeddingRetriever::load(path, collab.embedder.clone())
                .with_context(|| format!("loading doc chunks from {}", path.display()))?
                .with_model(config.llm.embedding_model.clone());
            tracing::info!(path = %path.display(), chunks = retriever.len(), "retrieval index ready");
            Some(Arc::new(retriever))
        }
        None => {
            tracing::info!("no retrieval index configured");
            None
        }
    };

    // ── Session orchestrator ─────────────────────────────────────────
    let settings = TurnSettings {
        chat_model: Some(config.llm.chat_model.clone()),
        temperature: config.llm.temperature,
        history_limit: config.history.history_limit,
        retrieval_top_k: config.prompt.retrieval_top_k,
        retrieval_label: config.prompt.retrieval_label.clone(),
    };
    let mut orchestrator = SessionOrchestrator::new(
        history.clone(),
        prompt,
        escalation.clone(),
        collab.llm.clone(),
        settings,
    )
    .with_transcriber(collab.transcriber.clone());
    if let Some(retrieval) = retrieval {
        orchestrator = orchestrator.with_retrieval(retrieval);
    }
    let orchestrator = Arc::new(orchestrator);
    tracing::info!("session orchestrator ready");

    // ── Welcome lifecycle + deletion queue ───────────────────────────
    let chat_locks = Arc::new(ChatLockMap::new());
    let welcome_store = Arc::new(
        JsonRecordStore::<WelcomeRecord>::new(&config.storage.welcome_path())
            .context("initializing welcome store")?,
    );
    let welcome = Arc::new(WelcomeManager::new(
        welcome_store,
        collab.messenger.clone(),
        chat_locks.clone(),
        &config.welcome,
    ));
    let deletions = Arc::new(DeletionQueue::new(Arc::new(
        JsonRecordStore::<Vec<PendingDeletion>>::new(&config.storage.deletions_path())
            .context("initializing deletion queue")?,
    )));
    tracing::info!(
        ttl_secs = config.welcome.ttl_secs,
        scope = ?config.welcome.scope,
        "welcome manager ready"
    );

    let membership = Arc::new(MembershipHandler::new(
        welcome.clone(),
        deletions.clone(),
        collab.notifier.clone(),
        config.escalation.operator_channel.clone(),
        config.welcome.notify_membership,
        config.welcome.service_message_ttl_secs,
    ));

    // ── Moderation ───────────────────────────────────────────────────
    let audit: Arc<dyn AuditLog> = Arc::new(
        JsonlAuditLog::new(&config.storage.audit_path()).context("opening audit log")?,
    );
    let moderator = Arc::new(Moderator::new(
        collab.llm.clone(),
        audit,
        collab.messenger.clone(),
        collab.notifier.clone(),
        config.escalation.operator_channel.clone(),
        Some(config.llm.moderation_model.clone()),
        config.moderation.enabled,
        config.moderation.max_chars,
    ));
    tracing::info!(enabled = config.moderation.enabled, "moderator ready");

    let sweeper = Arc::new(Sweeper::new(
        welcome.clone(),
        deletions.clone(),
        collab.messenger.clone(),
    ));

    Ok(AppState {
        config,
        llm: collab.llm,
        history,
        orchestrator,
        escalation,
        welcome,
        membership,
        moderator,
        deletions,
        sweeper,
        chat_locks,
        messenger: collab.messenger,
        notifier: collab.notifier,
    })
}

/// Spawn the periodic housekeeping loops. They stop once `shutdown` is
/// notified.
pub fn spawn_background_tasks(
    state: &AppState,
    shutdown: Arc<tokio::sync::Notify>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    // ── Periodic welcome / deletion sweep ────────────────────────────
    {
        let sweeper = state.sweeper.clone();
        let shutdown = shutdown.clone();
        let every = std::time::Duration::from_secs(state.config.welcome.sweep_interval_secs.max(1));
        handles.push(tokio::spawn(async move {
            let stop = shutdown.notified();
            tokio::pin!(stop);
            stop.as_mut().enable();

            let mut interval = tokio::time::interval(every);
            // The first tick fires immediately; skip it so a restart does not
            // wipe a fresh announcement.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = interval.tick() => {
                        sweeper.tick().await;
                    }
                }
            }
            tracing::debug!("sweep loop stopped");
        }));
    }

    // ── Periodic chat lock pruning ───────────────────────────────────
    {
        let chat_locks = state.chat_locks.clone();
        handles.push(tokio::spawn(async move {
            let stop = shutdown.notified();
            tokio::pin!(stop);
            stop.as_mut().enable();

            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = interval.tick() => {
                        chat_locks.prune_idle();
                        tracing::debug!(slots = chat_locks.slot_count(), "chat locks pruned");
                    }
                }
            }
        }));
    }

    handles
}
