use std::sync::Arc;

use cb_domain::config::Config;
use cb_providers::LlmProvider;
use cb_sessions::HistoryStore;

use crate::runtime::{
    ChatLockMap, DeletionQueue, EscalationDetector, MembershipHandler, Moderator,
    SessionOrchestrator, Sweeper, WelcomeManager,
};
use crate::transport::{Messenger, Notifier};

/// Shared application state handed to every front end.
///
/// Fields are grouped by concern:
/// - **Core services**: config, completion backend
/// - **Conversations**: history, orchestrator, escalation
/// - **Group chats**: welcome lifecycle, membership, moderation, sweep
/// - **Transport**: the outbound messenger and operator notifier
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<dyn LlmProvider>,

    // ── Conversations ─────────────────────────────────────────────────
    pub history: Arc<dyn HistoryStore>,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub escalation: Arc<EscalationDetector>,

    // ── Group chats ───────────────────────────────────────────────────
    pub welcome: Arc<WelcomeManager>,
    pub membership: Arc<MembershipHandler>,
    pub moderator: Arc<Moderator>,
    pub deletions: Arc<DeletionQueue>,
    pub sweeper: Arc<Sweeper>,
    /// Per-chat serialisation of welcome updates.
    pub chat_locks: Arc<ChatLockMap>,

    // ── Transport ─────────────────────────────────────────────────────
    pub messenger: Arc<dyn Messenger>,
    pub notifier: Arc<dyn Notifier>,
}
