//! Group-chat spam moderation backed by the completion backend.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use cb_domain::message::ChatMessage;
use cb_domain::trace::TraceEvent;
use cb_providers::{ChatRequest, LlmProvider};

use crate::audit::{AuditLog, AuditMessage, AuditUser};
use crate::transport::{MessageRef, Messenger, Notifier};

use super::membership::Member;

const CLASSIFIER_PROMPT: &str = "You are a strict spam filter for a hotel guest group chat. \
Spam is advertising, scams, phishing, crypto or investment offers, and unsolicited promotion. \
Questions and conversation between guests are never spam. \
Answer with exactly one word: SPAM or NOT_SPAM.";

/// One message posted in a moderated group.
#[derive(Debug, Clone)]
pub struct GroupMessage {
    pub chat_id: i64,
    pub message_ref: MessageRef,
    pub author: Member,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub reply_to: Option<MessageRef>,
}

pub struct Moderator {
    llm: Arc<dyn LlmProvider>,
    audit: Arc<dyn AuditLog>,
    messenger: Arc<dyn Messenger>,
    notifier: Arc<dyn Notifier>,
    operator_channel: Option<String>,
    model: Option<String>,
    enabled: bool,
    max_chars: usize,
}

impl Moderator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        audit: Arc<dyn AuditLog>,
        messenger: Arc<dyn Messenger>,
        notifier: Arc<dyn Notifier>,
        operator_channel: Option<String>,
        model: Option<String>,
        enabled: bool,
        max_chars: usize,
    ) -> Self {
        Self {
            llm,
            audit,
            messenger,
            notifier,
            operator_channel,
            model,
            enabled,
            max_chars,
        }
    }

    /// Backend failures and any answer other than `SPAM` read as clean.
    pub async fn is_spam(&self, text: &str) -> bool {
        let truncated: String = text.chars().take(self.max_chars).collect();
        let req = ChatRequest {
            messages: vec![ChatMessage::system(CLASSIFIER_PROMPT), ChatMessage::user(truncated)],
            temperature: Some(0.0),
            max_tokens: Some(10),
            model: self.model.clone(),
            purpose: "moderation",
        };
        match self.llm.chat(req).await {
            Ok(resp) => resp.content.trim().eq_ignore_ascii_case("SPAM"),
            Err(e) => {
                tracing::warn!(error = %e, "spam classification failed, treating as clean");
                false
            }
        }
    }

    /// Record the message and remove it if it is spam. Returns whether it
    /// was classified as spam.
    pub async fn handle_group_message(&self, msg: GroupMessage) -> bool {
        self.record(&msg).await;

        if !self.enabled || msg.text.trim().is_empty() || !self.is_spam(&msg.text).await {
            return false;
        }

        let display = msg.author.display_name();
        let user_id = msg.author.user_id;
        tracing::info!(chat_id = msg.chat_id, user_id, message_ref = msg.message_ref, "spam detected");

        self.notice(&format!(
            "Spam detected from {display} (ID: {user_id}) in chat {}:\n\n{}",
            msg.chat_id, msg.text
        ))
        .await;

        if let Err(e) = self.messenger.delete(msg.chat_id, msg.message_ref).await {
            tracing::warn!(chat_id = msg.chat_id, message_ref = msg.message_ref, error = %e, "failed to delete spam");
        }
        if let Err(e) = self.audit.mark_spam(msg.chat_id, msg.message_ref).await {
            tracing::warn!(error = %e, "failed to mark spam in audit log");
        }

        self.notice(&format!("Removed spam message from {display} (ID: {user_id}).")).await;

        TraceEvent::SpamRemoved {
            chat_id: msg.chat_id,
            user_id,
            message_ref: msg.message_ref,
        }
        .emit();
        true
    }

    async fn record(&self, msg: &GroupMessage) {
        let author = &msg.author;
        match self.audit.user_exists(author.user_id).await {
            Ok(true) => {}
            Ok(false) => {
                let user = AuditUser {
                    user_id: author.user_id,
                    username: author.username.clone().unwrap_or_default(),
                    full_name: author.full_name(),
                    chat_id: msg.chat_id,
                };
                if let Err(e) = self.audit.add_user(user).await {
                    tracing::warn!(user_id = author.user_id, error = %e, "failed to audit user");
                }
            }
            Err(e) => tracing::warn!(user_id = author.user_id, error = %e, "audit lookup failed"),
        }

        let entry = AuditMessage {
            message_ref: msg.message_ref,
            user_id: author.user_id,
            chat_id: msg.chat_id,
            text: msg.text.clone(),
            sent_at: msg.sent_at,
            reply_to: msg.reply_to,
            spam: false,
        };
        if let Err(e) = self.audit.add_message(entry).await {
            tracing::warn!(error = %e, "failed to audit message");
        }
    }

    async fn notice(&self, text: &str) {
        let Some(channel) = &self.operator_channel else {
            return;
        };
        if let Err(e) = self.notifier.notify(channel, text).await {
            tracing::warn!(error = %e, "moderation notice failed");
        }
    }
}
