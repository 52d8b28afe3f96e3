use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Group moderation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Message text is truncated to this many characters before classifying.
    #[serde(default = "d_2000")]
    pub max_chars: usize,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self { enabled: true, max_chars: 2000 }
    }
}

fn d_true() -> bool {
    true
}
fn d_2000() -> usize {
    2000
}
