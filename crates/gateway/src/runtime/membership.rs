//! Join/leave handling for group chats: operator notices, the welcome
//! announcement, and cleanup of the platform's own service message.

use std::sync::Arc;

use cb_domain::error::Result;

use crate::transport::{MessageRef, Notifier};

use super::deletions::DeletionQueue;
use super::welcome::{WelcomeManager, WelcomeOutcome};

/// A group member as the transport reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl Member {
    /// `@username` when present, otherwise the full name.
    pub fn display_name(&self) -> String {
        match self.username.as_deref().filter(|u| !u.is_empty()) {
            Some(username) => format!("@{username}"),
            None => self.full_name(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name.as_deref().unwrap_or(""))
            .trim()
            .to_owned()
    }
}

pub struct MembershipHandler {
    welcome: Arc<WelcomeManager>,
    deletions: Arc<DeletionQueue>,
    notifier: Arc<dyn Notifier>,
    operator_channel: Option<String>,
    notify_membership: bool,
    service_message_ttl_secs: Option<u64>,
}

impl MembershipHandler {
    pub fn new(
        welcome: Arc<WelcomeManager>,
        deletions: Arc<DeletionQueue>,
        notifier: Arc<dyn Notifier>,
        operator_channel: Option<String>,
        notify_membership: bool,
        service_message_ttl_secs: Option<u64>,
    ) -> Self {
        Self {
            welcome,
            deletions,
            notifier,
            operator_channel,
            notify_membership,
            service_message_ttl_secs,
        }
    }

    /// A batch of members joined `chat_id`. `reason` is the transport's
    /// event label (e.g. `join`, `invite`, `approved`).
    pub async fn handle_join(
        &self,
        chat_id: i64,
        joiners: &[Member],
        reason: &str,
        service_message: Option<MessageRef>,
    ) -> Result<WelcomeOutcome> {
        for member in joiners {
            self.notice(format!(
                "User {} ({}) joined chat {chat_id}. Event: {reason}",
                member.display_name(),
                member.user_id
            ))
            .await;
        }
        self.schedule_cleanup(chat_id, service_message).await;

        let names: Vec<String> = joiners.iter().map(Member::display_name).collect();
        self.welcome.handle_join(chat_id, &names).await
    }

    pub async fn handle_leave(
        &self,
        chat_id: i64,
        member: &Member,
        reason: &str,
        service_message: Option<MessageRef>,
    ) {
        self.notice(format!(
            "User {} ({}) left chat {chat_id}. Event: {reason}",
            member.display_name(),
            member.user_id
        ))
        .await;
        self.schedule_cleanup(chat_id, service_message).await;
    }

    async fn schedule_cleanup(&self, chat_id: i64, service_message: Option<MessageRef>) {
        let (Some(message_ref), Some(ttl)) = (service_message, self.service_message_ttl_secs) else {
            return;
        };
        if let Err(e) = self.deletions.schedule(chat_id, message_ref, ttl).await {
            tracing::warn!(chat_id, message_ref, error = %e, "failed to queue service message");
        }
    }

    async fn notice(&self, text: String) {
        if !self.notify_membership {
            return;
        }
        let Some(channel) = &self.operator_channel else {
            tracing::debug!(notice = %text, "membership notice (no operator channel)");
            return;
        };
        if let Err(e) = self.notifier.notify(channel, &text).await {
            tracing::warn!(error = %e, "membership notice failed");
        }
    }
}
