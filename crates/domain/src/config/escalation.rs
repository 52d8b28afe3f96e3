use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Operator escalation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Mention that triggers an escalation (matched case-insensitively).
    #[serde(default = "d_handle")]
    pub operator_handle: String,
    /// Where alerts are delivered. When unset, triggers are only logged.
    #[serde(default)]
    pub operator_channel: Option<String>,
    /// Recent turns attached to each alert.
    #[serde(default = "d_3")]
    pub context_turns: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            operator_handle: d_handle(),
            operator_channel: None,
            context_turns: 3,
        }
    }
}

fn d_handle() -> String {
    "@manager".into()
}
fn d_3() -> usize {
    3
}
