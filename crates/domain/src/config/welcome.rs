use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Welcome announcements
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeConfig {
    /// Announcement body; `{users}` is replaced with the joined names.
    #[serde(default = "d_template")]
    pub template: String,
    /// Seconds after creation during which new joiners are merged in.
    #[serde(default = "d_300")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub scope: WelcomeScope,
    /// Optional URL button attached to every announcement.
    #[serde(default)]
    pub link_button: Option<LinkButton>,
    /// Interval of the housekeeping sweep that tears announcements down.
    #[serde(default = "d_300")]
    pub sweep_interval_secs: u64,
    /// Tell the operator channel about joins and leaves.
    #[serde(default = "d_true")]
    pub notify_membership: bool,
    /// Delete the platform's own join/leave service message after this
    /// many seconds. Unset keeps it.
    #[serde(default)]
    pub service_message_ttl_secs: Option<u64>,
}

/// How many active records exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WelcomeScope {
    /// One record per chat; chats never interfere with each other.
    #[default]
    PerChat,
    /// A single record shared by every chat; a join in another chat
    /// replaces the current announcement.
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

impl Default for WelcomeConfig {
    fn default() -> Self {
        Self {
            template: d_template(),
            ttl_secs: 300,
            scope: WelcomeScope::PerChat,
            link_button: None,
            sweep_interval_secs: 300,
            notify_membership: true,
            service_message_ttl_secs: None,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_template() -> String {
    "Welcome, {users}! Ask me anything in a private message.".into()
}
fn d_300() -> u64 {
    300
}
fn d_true() -> bool {
    true
}
