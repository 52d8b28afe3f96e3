//! OpenAI-compatible adapter.
//!
//! One endpoint serves chat completions, embeddings and Whisper-style
//! transcription. Works with OpenAI and any server that follows the same
//! contract (Ollama, vLLM, LM Studio, ...).

use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};
use serde_json::Value;

use cb_domain::config::LlmConfig;
use cb_domain::error::{Error, Result};
use cb_domain::message::ChatMessage;
use cb_domain::trace::TraceEvent;

use crate::traits::{
    ChatRequest, ChatResponse, EmbeddingProvider, EmbeddingsRequest, EmbeddingsResponse,
    LlmProvider, TranscriptionProvider, Usage,
};
use crate::util::{from_reqwest, http_status_error, resolve_api_key};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    /// `None` when the key env var is unset; every call then fails with
    /// an auth error instead of the gateway refusing to boot.
    api_key: Option<String>,
    default_model: String,
    embedding_model: String,
    transcription_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = match resolve_api_key(&cfg.api_key_env) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(
                    env = %cfg.api_key_env,
                    error = %e,
                    "no LLM API key; backend calls will fail until it is set"
                );
                None
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: "openai_compat".into(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.chat_model.clone(),
            embedding_model: cfg.embedding_model.clone(),
            transcription_model: cfg.transcription_model.clone(),
            client,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    // ── Internal: build authenticated request builder ──────────────

    fn authed_post(&self, url: &str) -> Result<reqwest::RequestBuilder> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            Error::Auth(format!("provider {} has no API key configured", self.id))
        })?;
        Ok(self.client.post(url).bearer_auth(key))
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value> {
        let resp = builder.send().await.map_err(from_reqwest)?;
        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(http_status_error(&self.id, status.as_u16(), &resp_text));
        }
        Ok(serde_json::from_str(&resp_text)?)
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
        let model = req.model.clone().unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_openai(msg: &ChatMessage) -> Value {
    serde_json::json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    })
}

fn parse_chat_response(body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: "openai_compat".into(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: "openai_compat".into(),
        message: "no message in choice".into(),
    })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let usage = body.get("usage").and_then(parse_openai_usage);

    Ok(ChatResponse { content, usage, model, finish_reason })
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
    })
}

fn parse_embeddings(provider: &str, body: &Value) -> Result<Vec<Vec<f32>>> {
    let data = body
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::Provider {
            provider: provider.to_owned(),
            message: "missing 'data' array in embeddings response".into(),
        })?;

    Ok(data
        .iter()
        .filter_map(|item| {
            let embedding = item.get("embedding")?.as_array()?;
            Some(
                embedding
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect(),
            )
        })
        .collect())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(&req);

        tracing::debug!(provider = %self.id, url = %url, purpose = req.purpose, "chat request");

        let started = Instant::now();
        let resp_json = self.send(self.authed_post(&url)?.json(&body)).await?;
        let resp = parse_chat_response(&resp_json)?;

        TraceEvent::LlmRequest {
            provider: self.id.clone(),
            model: resp.model.clone(),
            purpose: req.purpose.to_owned(),
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: resp.usage.map(|u| u.prompt_tokens),
            completion_tokens: resp.usage.map(|u| u.completion_tokens),
        }
        .emit();

        Ok(resp)
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiCompatProvider {
    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        let model = req.model.unwrap_or_else(|| self.embedding_model.clone());
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({ "model": model, "input": req.input });

        let resp_json = self.send(self.authed_post(&url)?.json(&body)).await?;
        Ok(EmbeddingsResponse { embeddings: parse_embeddings(&self.id, &resp_json)? })
    }
}

#[async_trait::async_trait]
impl TranscriptionProvider for OpenAiCompatProvider {
    async fn transcribe(&self, audio_ref: &str) -> Result<String> {
        let bytes = tokio::fs::read(audio_ref).await.map_err(Error::Io)?;
        let file_name = std::path::Path::new(audio_ref)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.ogg")
            .to_string();

        let form = Form::new()
            .text("model", self.transcription_model.clone())
            .part("file", Part::bytes(bytes).file_name(file_name));

        let url = format!("{}/audio/transcriptions", self.base_url);
        let resp_json = self.send(self.authed_post(&url)?.multipart(form)).await?;

        resp_json
            .get("text")
            .and_then(|v| v.as_str())
            .map(|t| t.trim().to_string())
            .ok_or_else(|| Error::Provider {
                provider: self.id.clone(),
                message: "missing 'text' in transcription response".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiCompatProvider {
        let cfg = LlmConfig {
            api_key_env: "CB_TEST_KEY_THAT_IS_NEVER_SET_5150".into(),
            ..LlmConfig::default()
        };
        OpenAiCompatProvider::from_config(&cfg).unwrap()
    }

    #[test]
    fn chat_body_uses_default_model_and_options() {
        let p = provider();
        let req = ChatRequest {
            messages: vec![ChatMessage::system("be nice"), ChatMessage::user("hi")],
            temperature: Some(0.5),
            max_tokens: Some(10),
            ..Default::default()
        };
        let body = p.build_chat_body(&req);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["max_tokens"], 10);
        assert!(body.get("temperature").is_some());
    }

    #[test]
    fn chat_body_omits_unset_options() {
        let p = provider();
        let body = p.build_chat_body(&ChatRequest {
            model: Some("gpt-4".into()),
            ..Default::default()
        });
        assert_eq!(body["model"], "gpt-4");
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn parse_response_extracts_content_and_usage() {
        let body = serde_json::json!({
            "model": "gpt-4o-2024",
            "choices": [{"message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        });
        let resp = parse_chat_response(&body).unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(resp.model, "gpt-4o-2024");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage, Some(Usage { prompt_tokens: 12, completion_tokens: 3 }));
    }

    #[test]
    fn parse_response_without_choices_is_provider_error() {
        let err = parse_chat_response(&serde_json::json!({"choices": []})).unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }

    #[test]
    fn parse_embeddings_reads_vectors() {
        let body = serde_json::json!({"data": [{"embedding": [0.5, 1.0]}, {"embedding": [0.0]}]});
        let vecs = parse_embeddings("p", &body).unwrap();
        assert_eq!(vecs, vec![vec![0.5, 1.0], vec![0.0]]);
    }

    #[tokio::test]
    async fn missing_key_fails_with_auth_error() {
        let p = provider();
        assert!(!p.has_api_key());
        let err = p.chat(ChatRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}
