//! Audit trail of group members and their messages.
//!
//! Every group message is recorded with a spam flag so moderators can
//! review what was removed. The bundled implementation appends events to
//! a JSONL file; the set of known users is rebuilt from it at startup.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use cb_domain::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditUser {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMessage {
    pub message_ref: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub reply_to: Option<i64>,
    pub spam: bool,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn user_exists(&self, user_id: i64) -> Result<bool>;
    async fn add_user(&self, user: AuditUser) -> Result<()>;
    async fn add_message(&self, message: AuditMessage) -> Result<()>;
    async fn mark_spam(&self, chat_id: i64, message_ref: i64) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum AuditEvent {
    UserAdded {
        at: DateTime<Utc>,
        #[serde(flatten)]
        user: AuditUser,
    },
    Message {
        #[serde(flatten)]
        message: AuditMessage,
    },
    MarkedSpam {
        at: DateTime<Utc>,
        chat_id: i64,
        message_ref: i64,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSONL file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct JsonlAuditLog {
    path: PathBuf,
    known_users: RwLock<HashSet<i64>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }

        let mut known_users = HashSet::new();
        if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
            for line in raw.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<AuditEvent>(line) {
                    Ok(AuditEvent::UserAdded { user, .. }) => {
                        known_users.insert(user.user_id);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "skipping malformed audit line"),
                }
            }
        }

        tracing::info!(users = known_users.len(), path = %path.display(), "audit log loaded");

        Ok(Self {
            path: path.to_path_buf(),
            known_users: RwLock::new(known_users),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn append(&self, event: AuditEvent) -> Result<()> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let path = self.path.clone();

        let _guard = self.write_lock.lock().await;
        tokio::task::spawn_blocking(move || {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(Error::Io)?;
            file.write_all(line.as_bytes()).map_err(Error::Io)?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))?
    }
}

#[async_trait]
impl AuditLog for JsonlAuditLog {
    async fn user_exists(&self, user_id: i64) -> Result<bool> {
        Ok(self.known_users.read().contains(&user_id))
    }

    async fn add_user(&self, user: AuditUser) -> Result<()> {
        let user_id = user.user_id;
        self.append(AuditEvent::UserAdded { at: Utc::now(), user }).await?;
        self.known_users.write().insert(user_id);
        Ok(())
    }

    async fn add_message(&self, message: AuditMessage) -> Result<()> {
        self.append(AuditEvent::Message { message }).await
    }

    async fn mark_spam(&self, chat_id: i64, message_ref: i64) -> Result<()> {
        self.append(AuditEvent::MarkedSpam { at: Utc::now(), chat_id, message_ref }).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct MemoryAuditLog {
    users: Mutex<Vec<AuditUser>>,
    messages: Mutex<Vec<AuditMessage>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn users(&self) -> Vec<AuditUser> {
        self.users.lock().clone()
    }

    pub fn messages(&self) -> Vec<AuditMessage> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn user_exists(&self, user_id: i64) -> Result<bool> {
        Ok(self.users.lock().iter().any(|u| u.user_id == user_id))
    }

    async fn add_user(&self, user: AuditUser) -> Result<()> {
        self.users.lock().push(user);
        Ok(())
    }

    async fn add_message(&self, message: AuditMessage) -> Result<()> {
        self.messages.lock().push(message);
        Ok(())
    }

    async fn mark_spam(&self, chat_id: i64, message_ref: i64) -> Result<()> {
        for m in self.messages.lock().iter_mut() {
            if m.chat_id == chat_id && m.message_ref == message_ref {
                m.spam = true;
            }
        }
        Ok(())
    }
}
