use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// System persona placed at the top of every request.
    #[serde(default = "d_persona")]
    pub persona: String,
    /// IANA timezone used for the date banner.
    #[serde(default = "d_timezone")]
    pub timezone: String,
    /// Prefix of the date banner line, e.g. `Now (Asia/Dubai): ...`.
    #[serde(default = "d_date_label")]
    pub date_label: String,
    /// Weekday names, Monday first.
    #[serde(default = "d_weekday_names")]
    pub weekday_names: Vec<String>,
    /// Heading placed above the extra context block.
    #[serde(default = "d_context_heading")]
    pub context_heading: String,
    /// Snippets requested from the retrieval service per turn.
    #[serde(default = "d_3")]
    pub retrieval_top_k: usize,
    /// Label placed above the formatted snippets.
    #[serde(default = "d_retrieval_label")]
    pub retrieval_label: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            persona: d_persona(),
            timezone: d_timezone(),
            date_label: d_date_label(),
            weekday_names: d_weekday_names(),
            context_heading: d_context_heading(),
            retrieval_top_k: 3,
            retrieval_label: d_retrieval_label(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_persona() -> String {
    "You are a helpful concierge assistant. Answer briefly and politely. \
     When offering follow-up choices, append a block \
     [BUTTONS_JSON]{\"buttons\":[{\"text\":\"...\",\"callback\":\"...\"}]}[/BUTTONS_JSON] \
     after your answer."
        .into()
}
fn d_timezone() -> String {
    "Asia/Dubai".into()
}
fn d_date_label() -> String {
    "Now".into()
}
fn d_weekday_names() -> Vec<String> {
    ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn d_context_heading() -> String {
    "(Additional context)".into()
}
fn d_3() -> usize {
    3
}
fn d_retrieval_label() -> String {
    "Reference material:".into()
}
