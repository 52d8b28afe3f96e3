//! Persistence for ConciergeBot.
//!
//! Per-user conversation history (append-only JSONL with an in-memory
//! cache) and small keyed record stores for gateway state that has to
//! survive restarts.

pub mod history;
pub mod jsonl;
pub mod records;

pub use history::{HistoryStore, MemoryHistoryStore};
pub use jsonl::JsonlHistoryStore;
pub use records::{JsonRecordStore, MemoryRecordStore, RecordStore};
