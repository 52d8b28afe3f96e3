use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single OpenAI-compatible endpoint serves chat, moderation,
/// embeddings and speech-to-text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key. If unset, backend calls
    /// fail with a config error and turns get a diagnostic reply.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_chat_model")]
    pub chat_model: String,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    /// Model used by the spam classifier.
    #[serde(default = "d_moderation_model")]
    pub moderation_model: String,
    /// Model used by the `llm` summarizer; falls back to `chat_model`.
    #[serde(default)]
    pub summary_model: Option<String>,
    #[serde(default = "d_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "d_transcription_model")]
    pub transcription_model: String,
    #[serde(default = "d_60000")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            chat_model: d_chat_model(),
            temperature: d_temperature(),
            moderation_model: d_moderation_model(),
            summary_model: None,
            embedding_model: d_embedding_model(),
            transcription_model: d_transcription_model(),
            timeout_ms: 60_000,
        }
    }
}

impl LlmConfig {
    pub fn summary_model(&self) -> &str {
        self.summary_model.as_deref().unwrap_or(&self.chat_model)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn d_chat_model() -> String {
    "gpt-4o".into()
}
fn d_temperature() -> f32 {
    0.7
}
fn d_moderation_model() -> String {
    "gpt-4".into()
}
fn d_embedding_model() -> String {
    "text-embedding-ada-002".into()
}
fn d_transcription_model() -> String {
    "whisper-1".into()
}
fn d_60000() -> u64 {
    60_000
}
