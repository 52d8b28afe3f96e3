//! Durable history backed by append-only JSONL files.
//!
//! Each user gets a `<user>.jsonl` file under the history directory and
//! every turn is one JSON line. Reads go through an in-memory
//! write-through cache; file I/O runs on blocking threads.
//!
//! Deletions rewrite the user's file into a temp file and rename it over
//! the original, so a crash mid-rewrite never leaves a truncated history.
//!
//! The store assumes it is the only writer of its directory. A user's file
//! is read once, on first access, and the cache then holds that user's turns
//! for the life of the process. Edits made by another process after that
//! point are not seen.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use cb_domain::error::{Error, Result};
use cb_domain::trace::TraceEvent;
use cb_domain::turn::{ConversationTurn, NewTurn};

use crate::history::HistoryStore;

pub struct JsonlHistoryStore {
    base_dir: PathBuf,
    next_id: AtomicU64,
    cache: RwLock<HashMap<String, Vec<ConversationTurn>>>,
    /// Serialises file mutations; reads stay lock-free via the cache.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlHistoryStore {
    /// Open (or create) the history directory. Scans existing files once
    /// so new ids continue after the highest stored id.
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir).map_err(Error::Io)?;

        let mut max_id = 0u64;
        let mut files = 0usize;
        for entry in std::fs::read_dir(base_dir).map_err(Error::Io)? {
            let path = entry.map_err(Error::Io)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            files += 1;
            for turn in read_jsonl_file(&path)? {
                max_id = max_id.max(turn.id);
            }
        }

        tracing::info!(
            files,
            max_id,
            path = %base_dir.display(),
            "history store loaded"
        );

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            next_id: AtomicU64::new(max_id),
            cache: RwLock::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.jsonl", file_stem(user_id)))
    }

    /// Return the user's turns, loading from disk on first access.
    async fn load(&self, user_id: &str) -> Result<Vec<ConversationTurn>> {
        // Fast path: return from cache.
        {
            let cache = self.cache.read();
            if let Some(turns) = cache.get(user_id) {
                return Ok(turns.clone());
            }
        }

        // Slow path: load from disk on a blocking thread.
        let path = self.path_for(user_id);
        let turns = tokio::task::spawn_blocking(move || read_jsonl_file(&path))
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        let mut cache = self.cache.write();
        let entry = cache.entry(user_id.to_owned()).or_insert(turns);
        Ok(entry.clone())
    }

    async fn append_line(&self, turn: &ConversationTurn) -> Result<()> {
        let mut buf = serde_json::to_string(turn)
            .map_err(|e| Error::Store(format!("serializing turn: {e}")))?;
        buf.push('\n');
        let path = self.path_for(&turn.user_id);

        tokio::task::spawn_blocking(move || {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(Error::Io)?;
            file.write_all(buf.as_bytes()).map_err(Error::Io)?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))?
    }

    async fn rewrite(&self, user_id: &str, turns: Vec<ConversationTurn>) -> Result<()> {
        let path = self.path_for(user_id);
        let mut buf = String::new();
        for turn in &turns {
            let json = serde_json::to_string(turn)
                .map_err(|e| Error::Store(format!("serializing turn: {e}")))?;
            buf.push_str(&json);
            buf.push('\n');
        }

        tokio::task::spawn_blocking(move || {
            let tmp = path.with_extension("jsonl.tmp");
            std::fs::write(&tmp, buf).map_err(Error::Io)?;
            std::fs::rename(&tmp, &path).map_err(Error::Io)?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        self.cache.write().insert(user_id.to_owned(), turns);
        Ok(())
    }

    async fn append_locked(&self, turn: NewTurn) -> Result<u64> {
        // Make sure the cache holds the full history before extending it.
        self.load(&turn.user_id).await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let turn = turn.into_turn(id);
        self.append_line(&turn).await?;

        TraceEvent::TurnAppended {
            user_id: turn.user_id.clone(),
            turn_id: id,
            role: turn.role.clone(),
            kind: turn.kind.as_str().to_owned(),
        }
        .emit();

        self.cache
            .write()
            .entry(turn.user_id.clone())
            .or_default()
            .push(turn);
        Ok(id)
    }

    async fn delete_locked(&self, user_id: &str, ids: &[u64]) -> Result<()> {
        let turns = self.load(user_id).await?;
        let before = turns.len();
        let kept: Vec<_> = turns.into_iter().filter(|t| !ids.contains(&t.id)).collect();
        if kept.len() == before {
            return Ok(());
        }
        self.rewrite(user_id, kept).await
    }
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn append(&self, turn: NewTurn) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        self.append_locked(turn).await
    }

    async fn last_n(&self, user_id: &str, n: usize) -> Result<Vec<ConversationTurn>> {
        let turns = self.load(user_id).await?;
        let skip = turns.len().saturating_sub(n);
        Ok(turns.into_iter().skip(skip).collect())
    }

    async fn oldest_n(&self, user_id: &str, n: usize) -> Result<Vec<ConversationTurn>> {
        let turns = self.load(user_id).await?;
        Ok(turns.into_iter().take(n).collect())
    }

    async fn count(&self, user_id: &str) -> Result<usize> {
        Ok(self.load(user_id).await?.len())
    }

    async fn delete(&self, user_id: &str, ids: &[u64]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.delete_locked(user_id, ids).await
    }

    async fn replace(&self, user_id: &str, ids: &[u64], turn: NewTurn) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let id = self.append_locked(turn).await?;
        self.delete_locked(user_id, ids).await?;
        Ok(id)
    }
}

// ── Private helpers ───────────────────────────────────────────────

/// Percent-encode anything outside `[A-Za-z0-9_-]` so distinct user ids
/// never share a file.
fn file_stem(user_id: &str) -> String {
    let mut out = String::with_capacity(user_id.len());
    for b in user_id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Read and parse a JSONL history file, sorted by id.
fn read_jsonl_file(path: &Path) -> Result<Vec<ConversationTurn>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    let mut turns = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ConversationTurn>(line) {
            Ok(turn) => turns.push(turn),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "skipping malformed history line"
                );
            }
        }
    }
    turns.sort_by_key(|t| t.id);
    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stem_escapes_separators() {
        assert_eq!(file_stem("12345"), "12345");
        assert_eq!(file_stem("a/b"), "a%2Fb");
        assert_eq!(file_stem("a.b"), "a%2Eb");
        assert_ne!(file_stem("a.b"), file_stem("a_b"));
    }

    #[tokio::test]
    async fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlHistoryStore::new(dir.path()).unwrap();

        store.append(NewTurn::user("42", "hello")).await.unwrap();
        store.append(NewTurn::assistant("42", "hi")).await.unwrap();

        let turns = store.last_n("42", 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, "user");
        assert_eq!(turns[1].content, "hi");
        assert!(dir.path().join("42.jsonl").exists());
    }

    #[tokio::test]
    async fn ids_continue_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonlHistoryStore::new(dir.path()).unwrap();
            store.append(NewTurn::user("a", "1")).await.unwrap();
            store.append(NewTurn::user("b", "2")).await.unwrap();
        }
        let store = JsonlHistoryStore::new(dir.path()).unwrap();
        let id = store.append(NewTurn::user("a", "3")).await.unwrap();
        assert_eq!(id, 3);
        assert_eq!(store.count("a").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn cached_user_ignores_outside_writes_until_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlHistoryStore::new(dir.path()).unwrap();
        store.append(NewTurn::user("u", "mine")).await.unwrap();

        {
            let other = JsonlHistoryStore::new(dir.path()).unwrap();
            other.append(NewTurn::user("u", "theirs")).await.unwrap();
        }

        assert_eq!(store.count("u").await.unwrap(), 1);
        let reopened = JsonlHistoryStore::new(dir.path()).unwrap();
        assert_eq!(reopened.count("u").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlHistoryStore::new(dir.path()).unwrap();
        let first = store.append(NewTurn::user("u", "old")).await.unwrap();
        store.append(NewTurn::user("u", "new")).await.unwrap();

        store.delete("u", &[first]).await.unwrap();

        let reopened = JsonlHistoryStore::new(dir.path()).unwrap();
        let turns = reopened.last_n("u", 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "new");
    }

    #[tokio::test]
    async fn replace_persists_summary_and_drops_block() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlHistoryStore::new(dir.path()).unwrap();
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(store.append(NewTurn::user("u", format!("m{i}"))).await.unwrap());
        }

        store
            .replace("u", &ids[..2], NewTurn::assistant("u", "summary"))
            .await
            .unwrap();

        let reopened = JsonlHistoryStore::new(dir.path()).unwrap();
        let contents: Vec<_> = reopened
            .last_n("u", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.content)
            .collect();
        assert_eq!(contents, vec!["m2", "m3", "summary"]);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("u.jsonl"),
            "not json\n{\"id\":7,\"user_id\":\"u\",\"role\":\"user\",\"content\":\"ok\",\"created_at\":\"2024-01-01T00:00:00Z\"}\n",
        )
        .unwrap();

        let store = JsonlHistoryStore::new(dir.path()).unwrap();
        let turns = store.last_n("u", 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].id, 7);
        assert_eq!(store.append(NewTurn::user("u", "next")).await.unwrap(), 8);
    }
}
