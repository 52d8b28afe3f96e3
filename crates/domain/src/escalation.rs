use serde::{Deserialize, Serialize};

/// One `[role] content` line of recent history attached to an escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLine {
    pub role: String,
    pub content: String,
}

/// A human-operator alert. Lives only for the duration of the dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationEvent {
    pub reporter_display_name: String,
    pub originating_chat_id: i64,
    pub triggering_text: String,
    /// Chronological order, oldest first.
    pub recent_context: Vec<ContextLine>,
}

impl EscalationEvent {
    /// Render the recent context as `[role] content` lines.
    pub fn render_context(&self) -> String {
        self.recent_context
            .iter()
            .map(|line| format!("[{}] {}", line.role, line.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Full notification text sent to the operator channel.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Operator mention!\nAuthor: {} (chat_id: {})\n\nText:\n{}",
            self.reporter_display_name, self.originating_chat_id, self.triggering_text
        );
        if !self.recent_context.is_empty() {
            out.push_str("\n\n-- Context (recent messages) --\n");
            out.push_str(&self.render_context());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(role: &str, content: &str) -> ContextLine {
        ContextLine { role: role.into(), content: content.into() }
    }

    #[test]
    fn render_includes_all_parts() {
        let ev = EscalationEvent {
            reporter_display_name: "@sam".into(),
            originating_chat_id: 42,
            triggering_text: "ping @op".into(),
            recent_context: vec![line("user", "hello"), line("assistant", "hi there")],
        };
        let text = ev.render();
        assert!(text.contains("Author: @sam (chat_id: 42)"));
        assert!(text.contains("Text:\nping @op"));
        assert!(text.ends_with("[user] hello\n[assistant] hi there"));
    }

    #[test]
    fn render_without_context_has_no_context_header() {
        let ev = EscalationEvent {
            reporter_display_name: "x".into(),
            originating_chat_id: 1,
            triggering_text: "t".into(),
            recent_context: vec![],
        };
        assert!(!ev.render().contains("Context"));
    }
}
