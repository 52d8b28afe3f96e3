pub mod openai_compat;
pub mod retrieval;
pub mod traits;
pub(crate) mod util;

// Re-exports for convenience.
pub use openai_compat::OpenAiCompatProvider;
pub use retrieval::{DocChunk, EmbeddingRetriever};
pub use traits::{
    ChatRequest, ChatResponse, EmbeddingProvider, EmbeddingsRequest, EmbeddingsResponse,
    LlmProvider, RetrievalProvider, TranscriptionProvider, Usage,
};
pub use util::resolve_api_key;
