use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// History windowing + compression
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compression collapses the oldest block of a user's history into one
/// summary turn once the stored count passes `max_turns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Stored turn count at or below which compression is a no-op.
    #[serde(default = "d_20")]
    pub max_turns: usize,
    /// Number of oldest turns folded into one summary.
    #[serde(default = "d_10")]
    pub compress_batch: usize,
    /// Turns fed to the model on each request.
    #[serde(default = "d_15")]
    pub history_limit: usize,
    #[serde(default)]
    pub summarizer: SummarizerKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarizerKind {
    /// Fixed `(Summary of N messages...)` marker.
    #[default]
    Placeholder,
    /// Ask the completion backend for a real summary.
    Llm,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            compress_batch: 10,
            history_limit: 15,
            summarizer: SummarizerKind::Placeholder,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_20() -> usize {
    20
}
fn d_10() -> usize {
    10
}
fn d_15() -> usize {
    15
}
