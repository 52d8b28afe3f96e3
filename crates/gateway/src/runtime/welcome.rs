//! Welcome announcement lifecycle.
//!
//! Each slot is either empty or holds one live announcement. A join batch
//! creates an announcement, merges into a fresh one for the same chat, or
//! replaces one that is stale or belongs to another chat. The sweep tears
//! announcements down regardless of age.
//!
//! All read-modify-write of a slot happens under its [`ChatLockMap`]
//! permit; the record store itself only persists.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use cb_domain::config::{LinkButton, WelcomeConfig, WelcomeScope};
use cb_domain::error::Result;
use cb_domain::trace::TraceEvent;
use cb_domain::welcome::WelcomeRecord;
use cb_sessions::RecordStore;

use crate::transport::{ButtonTarget, Messenger, OutboundButton, OutboundMessage};

use super::chat_lock::ChatLockMap;

const GLOBAL_SLOT: &str = "global";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WelcomeOutcome {
    Created,
    /// New names were merged; `edited` is false when the in-place edit
    /// failed (the record is still updated).
    Merged { edited: bool },
    /// A stale or other-chat announcement was replaced.
    Replaced,
    /// Nothing to do (no names, or all already mentioned).
    Ignored,
}

pub struct WelcomeManager {
    store: Arc<dyn RecordStore<WelcomeRecord>>,
    messenger: Arc<dyn Messenger>,
    locks: Arc<ChatLockMap>,
    template: String,
    ttl_secs: u64,
    scope: WelcomeScope,
    link_button: Option<LinkButton>,
}

impl WelcomeManager {
    pub fn new(
        store: Arc<dyn RecordStore<WelcomeRecord>>,
        messenger: Arc<dyn Messenger>,
        locks: Arc<ChatLockMap>,
        cfg: &WelcomeConfig,
    ) -> Self {
        Self {
            store,
            messenger,
            locks,
            template: cfg.template.clone(),
            ttl_secs: cfg.ttl_secs,
            scope: cfg.scope,
            link_button: cfg.link_button.clone(),
        }
    }

    fn slot_key(&self, chat_id: i64) -> String {
        match self.scope {
            WelcomeScope::PerChat => format!("chat:{chat_id}"),
            WelcomeScope::Global => GLOBAL_SLOT.to_owned(),
        }
    }

    pub fn render(&self, names: &[String]) -> OutboundMessage {
        let mut msg = OutboundMessage::text(self.template.replace("{users}", &names.join(", ")));
        if let Some(link) = &self.link_button {
            msg.buttons.push(OutboundButton {
                label: link.label.clone(),
                target: ButtonTarget::Url(link.url.clone()),
            });
        }
        msg
    }

    /// The live announcement for `chat_id`, if any.
    pub async fn active(&self, chat_id: i64) -> Option<WelcomeRecord> {
        self.load(&self.slot_key(chat_id))
            .await
            .filter(|rec| rec.chat_id == chat_id)
    }

    pub async fn handle_join(&self, chat_id: i64, names: &[String]) -> Result<WelcomeOutcome> {
        self.handle_join_at(chat_id, names, Utc::now()).await
    }

    pub async fn handle_join_at(
        &self,
        chat_id: i64,
        names: &[String],
        now: DateTime<Utc>,
    ) -> Result<WelcomeOutcome> {
        if names.is_empty() {
            return Ok(WelcomeOutcome::Ignored);
        }
        let key = self.slot_key(chat_id);
        let _permit = self.locks.acquire(&key).await?;

        match self.load(&key).await {
            None => {
                self.create(&key, chat_id, names, now).await?;
                Ok(WelcomeOutcome::Created)
            }
            Some(mut rec) if rec.chat_id == chat_id && !rec.is_expired(now, self.ttl_secs) => {
                if !rec.merge(names) {
                    return Ok(WelcomeOutcome::Ignored);
                }
                self.store.put(&key, rec.clone()).await?;

                let edited = match self
                    .messenger
                    .edit(rec.chat_id, rec.message_ref, self.render(&rec.mentioned))
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(
                            chat_id,
                            message_ref = rec.message_ref,
                            error = %e,
                            "welcome edit failed"
                        );
                        false
                    }
                };

                TraceEvent::WelcomeMerged {
                    chat_id,
                    message_ref: rec.message_ref,
                    mentioned: rec.mentioned.len(),
                    edited,
                }
                .emit();
                Ok(WelcomeOutcome::Merged { edited })
            }
            Some(stale) => {
                let reason = if stale.chat_id != chat_id { "other_chat" } else { "expired" };
                self.delete_message(&stale).await;
                TraceEvent::WelcomeReplaced {
                    old_chat_id: stale.chat_id,
                    new_chat_id: chat_id,
                    reason: reason.to_owned(),
                }
                .emit();
                self.create(&key, chat_id, names, now).await?;
                Ok(WelcomeOutcome::Replaced)
            }
        }
    }

    /// Delete the announcement for `chat_id` and empty its slot.
    pub async fn teardown(&self, chat_id: i64) -> Result<bool> {
        let key = self.slot_key(chat_id);
        self.teardown_slot(&key, Some(chat_id)).await
    }

    /// Tear down every stored announcement. Returns how many were cleared.
    pub async fn teardown_all(&self) -> Result<usize> {
        let mut cleared = 0;
        for key in self.store.keys().await? {
            match self.teardown_slot(&key, None).await {
                Ok(true) => cleared += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(slot = %key, error = %e, "welcome teardown failed"),
            }
        }
        Ok(cleared)
    }

    /// With `only_chat` set, a slot owned by another chat is left alone.
    async fn teardown_slot(&self, key: &str, only_chat: Option<i64>) -> Result<bool> {
        let _permit = self.locks.acquire(key).await?;
        let Some(rec) = self.load(key).await else {
            // Drop undecodable leftovers too.
            self.store.clear(key).await?;
            return Ok(false);
        };
        if only_chat.is_some_and(|chat_id| chat_id != rec.chat_id) {
            return Ok(false);
        }
        self.delete_message(&rec).await;
        self.store.clear(key).await?;
        TraceEvent::WelcomeCleared { chat_id: rec.chat_id, message_ref: rec.message_ref }.emit();
        Ok(true)
    }

    async fn create(
        &self,
        key: &str,
        chat_id: i64,
        names: &[String],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut rec = WelcomeRecord::new(chat_id, 0, now);
        rec.merge(names);

        let message_ref = match self.messenger.send(chat_id, self.render(&rec.mentioned)).await {
            Ok(r) => r,
            Err(e) => {
                // Whatever was in the slot is gone from the chat already.
                if let Err(clear_err) = self.store.clear(key).await {
                    tracing::warn!(slot = %key, error = %clear_err, "failed to clear welcome slot");
                }
                return Err(e);
            }
        };
        rec.message_ref = message_ref;
        self.store.put(key, rec.clone()).await?;

        TraceEvent::WelcomeCreated {
            chat_id,
            message_ref,
            mentioned: rec.mentioned.len(),
        }
        .emit();
        Ok(())
    }

    async fn delete_message(&self, rec: &WelcomeRecord) {
        if let Err(e) = self.messenger.delete(rec.chat_id, rec.message_ref).await {
            tracing::warn!(
                chat_id = rec.chat_id,
                message_ref = rec.message_ref,
                error = %e,
                "failed to delete welcome announcement"
            );
        }
    }

    /// Unreadable records count as an empty slot.
    async fn load(&self, key: &str) -> Option<WelcomeRecord> {
        match self.store.get(key).await {
            Ok(rec) => rec,
            Err(e) => {
                tracing::warn!(slot = %key, error = %e, "welcome record unreadable, treating as empty");
                None
            }
        }
    }
}
