//! Scripted stand-ins for the external collaborators.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use cb_domain::config::Config;
use cb_domain::error::{Error, Result};
use cb_gateway::bootstrap::{build_app_state, Collaborators};
use cb_gateway::state::AppState;
use cb_gateway::transport::MemoryTransport;
use cb_providers::{
    ChatRequest, ChatResponse, EmbeddingProvider, EmbeddingsRequest, EmbeddingsResponse,
    LlmProvider, TranscriptionProvider,
};

/// Replies from a queue; `"ok"` once the queue is empty.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    pub fn push_reply(&self, text: &str) {
        self.replies.lock().push_back(Ok(text.to_owned()));
    }

    pub fn push_error(&self, err: Error) {
        self.replies.lock().push_back(Err(err));
    }

    pub fn last_request(&self) -> ChatRequest {
        self.requests.lock().last().cloned().expect("no completion request recorded")
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().iter().filter(|r| r.purpose == "chat").cloned().collect()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedLlm {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().push(req);
        let next = self.replies.lock().pop_front().unwrap_or_else(|| Ok("ok".into()));
        next.map(|content| ChatResponse {
            content,
            usage: None,
            model: "scripted".into(),
            finish_reason: Some("stop".into()),
        })
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

/// Two-dimensional keyword embedding: (pool, breakfast).
pub struct KeywordEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        let embeddings = req
            .input
            .iter()
            .map(|text| {
                let t = text.to_lowercase();
                vec![
                    if t.contains("pool") { 1.0 } else { 0.0 },
                    if t.contains("breakfast") { 1.0 } else { 0.0 },
                ]
            })
            .collect();
        Ok(EmbeddingsResponse { embeddings })
    }
}

/// Known audio refs transcribe to fixed text; anything else fails.
#[derive(Default)]
pub struct FakeTranscriber {
    pub known: HashMap<String, String>,
}

#[async_trait::async_trait]
impl TranscriptionProvider for FakeTranscriber {
    async fn transcribe(&self, audio_ref: &str) -> Result<String> {
        self.known
            .get(audio_ref)
            .cloned()
            .ok_or_else(|| Error::Provider {
                provider: "fake".into(),
                message: format!("unsupported audio {audio_ref}"),
            })
    }
}

pub struct Harness {
    pub state: AppState,
    pub llm: Arc<ScriptedLlm>,
    pub transport: Arc<MemoryTransport>,
}

pub const CHUNKS: &str = r#"{"id":"pool","chunk_text":"The pool is open 8:00-20:00.","embedding":[1.0,0.0]}
{"id":"food","chunk_text":"Breakfast is served 7:00-10:30.","embedding":[0.0,1.0]}
"#;

/// Config rooted in `dir` with an operator channel and a chunk file.
pub fn test_config(dir: &Path) -> Config {
    let chunks = dir.join("chunks.jsonl");
    std::fs::write(&chunks, CHUNKS).expect("write chunks");

    let mut config = Config::default();
    config.storage.state_path = dir.join("state");
    config.escalation.operator_handle = "@opname".into();
    config.escalation.operator_channel = Some("ops".into());
    config.retrieval.chunks_path = Some(chunks);
    config
}

pub async fn harness(config: Config) -> Harness {
    let llm = Arc::new(ScriptedLlm::default());
    let transport = Arc::new(MemoryTransport::new());
    let mut transcriber = FakeTranscriber::default();
    transcriber.known.insert("voice-1.ogg".into(), "is the pool open?".into());

    let collab = Collaborators {
        messenger: transport.clone(),
        notifier: transport.clone(),
        llm: llm.clone(),
        embedder: Arc::new(KeywordEmbedder),
        transcriber: Arc::new(transcriber),
    };
    let state = build_app_state(Arc::new(config), collab).await.expect("boot");
    Harness { state, llm, transport }
}

/// Escalations are delivered from spawned tasks.
pub async fn wait_for_notifications(transport: &MemoryTransport, n: usize) -> Vec<(String, String)> {
    for _ in 0..100 {
        let notes = transport.notifications();
        if notes.len() >= n {
            return notes;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    transport.notifications()
}
