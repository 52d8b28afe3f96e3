//! Similarity search over a pre-embedded document chunk file.
//!
//! The chunk file is JSONL, one `{id, chunk_text, embedding}` object per
//! line, produced by whatever indexing job owns the reference material.
//! Ranking is plain cosine similarity against the embedded query.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;

use cb_domain::error::{Error, Result};
use cb_domain::trace::TraceEvent;
use cb_domain::turn::RetrievedSnippet;

use crate::traits::{EmbeddingProvider, EmbeddingsRequest, RetrievalProvider};

#[derive(Debug, Clone, Deserialize)]
pub struct DocChunk {
    #[serde(default)]
    pub id: Option<String>,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
}

pub struct EmbeddingRetriever {
    chunks: Vec<DocChunk>,
    embedder: Arc<dyn EmbeddingProvider>,
    model: Option<String>,
}

impl EmbeddingRetriever {
    pub fn new(chunks: Vec<DocChunk>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { chunks, embedder, model: None }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Load chunks from a JSONL file. A missing file yields an empty
    /// index; malformed lines are skipped.
    pub fn load(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "doc chunk file not found, retrieval disabled");
            return Ok(Self::new(Vec::new(), embedder));
        }

        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut chunks = Vec::new();
        for (lineno, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DocChunk>(line) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping malformed doc chunk"
                ),
            }
        }

        tracing::info!(chunks = chunks.len(), path = %path.display(), "doc chunks loaded");
        Ok(Self::new(chunks, embedder))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Rank chunks against an already-embedded query.
    fn rank(&self, query: &[f32], k: usize) -> Vec<RetrievedSnippet> {
        let mut scored: Vec<RetrievedSnippet> = self
            .chunks
            .iter()
            .map(|c| RetrievedSnippet {
                text: c.chunk_text.clone(),
                relevance_score: cosine(query, &c.embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        scored.truncate(k);
        scored
    }
}

#[async_trait::async_trait]
impl RetrievalProvider for EmbeddingRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedSnippet>> {
        if self.chunks.is_empty() || k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let resp = self
            .embedder
            .embeddings(EmbeddingsRequest {
                input: vec![query.to_owned()],
                model: self.model.clone(),
            })
            .await?;
        let vector = resp.embeddings.into_iter().next().ok_or_else(|| {
            Error::Other("embedding backend returned no vector for query".into())
        })?;

        let hits = self.rank(&vector, k);

        TraceEvent::RetrievalFetched {
            query_chars: query.chars().count(),
            snippets: hits.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        Ok(hits)
    }
}

/// Cosine similarity; zero when either vector is empty or all zeros, or
/// when dimensions differ.
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::EmbeddingsResponse;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait::async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            Ok(EmbeddingsResponse { embeddings: req.input.iter().map(|_| self.0.clone()).collect() })
        }
    }

    fn chunk(text: &str, embedding: Vec<f32>) -> DocChunk {
        DocChunk { id: None, chunk_text: text.into(), embedding }
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn search_returns_top_k_descending() {
        let retriever = EmbeddingRetriever::new(
            vec![
                chunk("orthogonal", vec![0.0, 1.0]),
                chunk("exact", vec![1.0, 0.0]),
                chunk("close", vec![0.9, 0.1]),
                chunk("opposite", vec![-1.0, 0.0]),
            ],
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
        );

        let hits = retriever.search("where is the pool?", 3).await.unwrap();
        let texts: Vec<_> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["exact", "close", "orthogonal"]);
        assert!(hits[0].relevance_score >= hits[1].relevance_score);
    }

    #[tokio::test]
    async fn empty_index_skips_embedding() {
        let retriever = EmbeddingRetriever::new(Vec::new(), Arc::new(FixedEmbedder(vec![])));
        assert!(retriever.search("anything", 3).await.unwrap().is_empty());
    }

    #[test]
    fn load_skips_bad_lines_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.jsonl");
        std::fs::write(
            &path,
            "{\"id\":\"1\",\"chunk_text\":\"a\",\"embedding\":[1.0]}\nnope\n{\"chunk_text\":\"b\",\"embedding\":[0.5]}\n",
        )
        .unwrap();

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FixedEmbedder(vec![1.0]));
        let retriever = EmbeddingRetriever::load(&path, embedder.clone()).unwrap();
        assert_eq!(retriever.len(), 2);

        let missing = EmbeddingRetriever::load(&dir.path().join("none.jsonl"), embedder).unwrap();
        assert!(missing.is_empty());
    }
}
