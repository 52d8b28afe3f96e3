//! Core runtime: the per-message session pipeline and the group-chat
//! housekeeping that runs beside it.
//!
//! Entry points: [`SessionOrchestrator::handle_event`] for private
//! conversations, [`MembershipHandler`] and [`Moderator`] for group
//! events, and [`Sweeper::tick`] for the periodic pass.

pub mod chat_lock;
pub mod compact;
pub mod deletions;
pub mod escalation;
pub mod membership;
pub mod moderation;
pub mod prompt;
pub mod reply;
pub mod sweep;
pub mod turn;
pub mod welcome;

pub use chat_lock::ChatLockMap;
pub use compact::{HistoryCompressor, LlmSummarizer, PlaceholderSummarizer, Summarizer};
pub use deletions::{DeletionQueue, PendingDeletion};
pub use escalation::EscalationDetector;
pub use membership::{Member, MembershipHandler};
pub use moderation::{GroupMessage, Moderator};
pub use prompt::PromptAssembler;
pub use sweep::{SweepReport, Sweeper};
pub use turn::{
    diagnostic_for, InboundEvent, InboundMeta, SessionOrchestrator, TurnInput, TurnOutcome,
    TurnSettings,
};
pub use welcome::{WelcomeManager, WelcomeOutcome};
