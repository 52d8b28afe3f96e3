use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for history files, the welcome record, the deletion queue
    /// and the audit log.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { state_path: d_state_path() }
    }
}

impl StorageConfig {
    pub fn history_dir(&self) -> PathBuf {
        self.state_path.join("history")
    }
    pub fn welcome_path(&self) -> PathBuf {
        self.state_path.join("welcome.json")
    }
    pub fn deletions_path(&self) -> PathBuf {
        self.state_path.join("to_delete.json")
    }
    pub fn audit_path(&self) -> PathBuf {
        self.state_path.join("audit.jsonl")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retrieval
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// JSONL file of pre-embedded document chunks. Retrieval is off
    /// when unset.
    #[serde(default)]
    pub chunks_path: Option<PathBuf>,
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./data/state")
}
