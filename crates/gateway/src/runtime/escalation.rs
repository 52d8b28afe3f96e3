//! Operator escalation: a mention of the configured operator handle in
//! any text forwards the recent conversation to the operator channel.
//!
//! Detection (including the context fetch) runs inline; delivery is
//! best-effort and every failure is logged and swallowed.

use std::sync::Arc;

use cb_domain::escalation::{ContextLine, EscalationEvent};
use cb_domain::trace::TraceEvent;
use cb_sessions::HistoryStore;

use crate::transport::Notifier;

pub struct EscalationDetector {
    history: Arc<dyn HistoryStore>,
    notifier: Arc<dyn Notifier>,
    /// Lowercased once; matching is case-insensitive.
    handle: String,
    channel: Option<String>,
    context_turns: usize,
}

impl EscalationDetector {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        notifier: Arc<dyn Notifier>,
        operator_handle: &str,
        channel: Option<String>,
        context_turns: usize,
    ) -> Self {
        Self {
            history,
            notifier,
            handle: operator_handle.trim().to_lowercase(),
            channel,
            context_turns,
        }
    }

    pub fn is_triggered(&self, text: &str) -> bool {
        !self.handle.is_empty() && text.to_lowercase().contains(&self.handle)
    }

    /// Build the escalation for `text` if it mentions the operator.
    pub async fn check(
        &self,
        text: &str,
        user_id: &str,
        display_name: &str,
        chat_id: i64,
    ) -> Option<EscalationEvent> {
        if !self.is_triggered(text) {
            return None;
        }

        let recent_context = match self.history.last_n(user_id, self.context_turns).await {
            Ok(turns) => turns
                .into_iter()
                .map(|t| ContextLine { role: t.role, content: t.content })
                .collect(),
            Err(e) => {
                tracing::warn!(user_id = user_id, error = %e, "escalation context unavailable");
                Vec::new()
            }
        };

        Some(EscalationEvent {
            reporter_display_name: display_name.to_owned(),
            originating_chat_id: chat_id,
            triggering_text: text.to_owned(),
            recent_context,
        })
    }

    /// Deliver one escalation. Returns whether the notifier accepted it.
    pub async fn dispatch(&self, user_id: &str, event: &EscalationEvent) -> bool {
        let delivered = match &self.channel {
            None => {
                tracing::info!(
                    user_id = user_id,
                    chat_id = event.originating_chat_id,
                    "operator mentioned but no operator channel configured"
                );
                false
            }
            Some(channel) => match self.notifier.notify(channel, &event.render()).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        user_id = user_id,
                        channel = %channel,
                        error = %e,
                        "operator notification failed"
                    );
                    false
                }
            },
        };

        TraceEvent::EscalationDispatched {
            user_id: user_id.to_owned(),
            chat_id: event.originating_chat_id,
            context_turns: event.recent_context.len(),
            delivered,
        }
        .emit();

        delivered
    }

    /// Check and, on a match, deliver inline. Returns whether it triggered.
    pub async fn check_and_notify(
        &self,
        text: &str,
        user_id: &str,
        display_name: &str,
        chat_id: i64,
    ) -> bool {
        match self.check(text, user_id, display_name, chat_id).await {
            Some(event) => {
                self.dispatch(user_id, &event).await;
                true
            }
            None => false,
        }
    }

    /// Check inline and hand delivery to a background task so the caller
    /// never waits on the notifier.
    pub async fn check_and_spawn(
        self: &Arc<Self>,
        text: &str,
        user_id: &str,
        display_name: &str,
        chat_id: i64,
    ) -> bool {
        let Some(event) = self.check(text, user_id, display_name, chat_id).await else {
            return false;
        };
        let detector = Arc::clone(self);
        let user_id = user_id.to_owned();
        tokio::spawn(async move {
            detector.dispatch(&user_id, &event).await;
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use cb_domain::turn::NewTurn;
    use cb_sessions::MemoryHistoryStore;
    use std::sync::atomic::Ordering;

    async fn setup(channel: Option<&str>) -> (Arc<MemoryHistoryStore>, Arc<MemoryTransport>, EscalationDetector) {
        let store = Arc::new(MemoryHistoryStore::new());
        for (role, text) in [("user", "one"), ("assistant", "two"), ("user", "three"), ("assistant", "four")] {
            store.append(NewTurn::with_role("u", role, text)).await.unwrap();
        }
        let transport = Arc::new(MemoryTransport::new());
        let detector = EscalationDetector::new(
            store.clone(),
            transport.clone(),
            "@OpName",
            channel.map(String::from),
            3,
        );
        (store, transport, detector)
    }

    #[tokio::test]
    async fn mention_notifies_once_with_last_three_turns() {
        let (_, transport, detector) = setup(Some("ops")).await;

        assert!(detector.check_and_notify("ping @opname please", "u", "@guest", 77).await);

        let notes = transport.notifications();
        assert_eq!(notes.len(), 1);
        let (channel, text) = &notes[0];
        assert_eq!(channel, "ops");
        assert!(text.contains("@guest (chat_id: 77)"));
        assert!(text.contains("ping @opname please"));
        assert!(text.ends_with("[assistant] two\n[user] three\n[assistant] four"));
        assert!(!text.contains("[user] one"));
    }

    #[tokio::test]
    async fn no_mention_no_notification() {
        let (_, transport, detector) = setup(Some("ops")).await;
        assert!(!detector.check_and_notify("no mention here", "u", "g", 1).await);
        assert!(transport.notifications().is_empty());
    }

    #[tokio::test]
    async fn match_is_case_insensitive() {
        let (_, _, detector) = setup(Some("ops")).await;
        assert!(detector.is_triggered("HELLO @OPNAME"));
        assert!(detector.is_triggered("hey @opName!"));
        assert!(!detector.is_triggered("@opnam"));
    }

    #[tokio::test]
    async fn notifier_failure_is_swallowed() {
        let (_, transport, detector) = setup(Some("ops")).await;
        transport.fail_notify.store(true, Ordering::SeqCst);
        assert!(detector.check_and_notify("@opname", "u", "g", 1).await);
        assert!(transport.notifications().is_empty());
    }

    #[tokio::test]
    async fn missing_channel_still_reports_trigger() {
        let (_, transport, detector) = setup(None).await;
        assert!(detector.check_and_notify("@opname", "u", "g", 1).await);
        assert!(transport.notifications().is_empty());
    }

    #[tokio::test]
    async fn spawned_dispatch_delivers() {
        let (_, transport, detector) = setup(Some("ops")).await;
        let detector = Arc::new(detector);
        assert!(detector.check_and_spawn("@opname help", "u", "g", 1).await);
        for _ in 0..50 {
            if !transport.notifications().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(transport.notifications().len(), 1);
    }
}
