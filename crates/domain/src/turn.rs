use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an inbound turn reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    #[default]
    Text,
    Voice,
}

impl TurnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnKind::Text => "text",
            TurnKind::Voice => "voice",
        }
    }
}

/// One stored, role-tagged message in a user's conversation history.
///
/// `role` is kept as the raw stored tag; it is only narrowed to
/// [`Role`](crate::message::Role) when the prompt is assembled, so
/// histories written by older tooling still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: u64,
    pub user_id: String,
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub kind: TurnKind,
    /// Opaque pointer back to the source (e.g. a recorded audio path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A turn that has not been assigned an id by the history store yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTurn {
    pub user_id: String,
    pub role: String,
    pub content: String,
    pub kind: TurnKind,
    pub source_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewTurn {
    pub fn user(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_role(user_id, "user", content)
    }

    pub fn assistant(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_role(user_id, "assistant", content)
    }

    pub fn with_role(
        user_id: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
            content: content.into(),
            kind: TurnKind::Text,
            source_ref: None,
            created_at: Utc::now(),
        }
    }

    pub fn voice(mut self, source_ref: Option<String>) -> Self {
        self.kind = TurnKind::Voice;
        self.source_ref = source_ref;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Attach the id handed out by the store.
    pub fn into_turn(self, id: u64) -> ConversationTurn {
        ConversationTurn {
            id,
            user_id: self.user_id,
            role: self.role,
            content: self.content,
            kind: self.kind,
            source_ref: self.source_ref,
            created_at: self.created_at,
        }
    }
}

/// A reference snippet returned by similarity search. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSnippet {
    pub text: String,
    pub relevance_score: f32,
}
