//! Outbound collaborator contracts: the messenger that owns chat
//! messages and the operator notification sink.
//!
//! The gateway never talks to a chat platform directly. Adapters
//! implement [`Messenger`] and [`Notifier`]; two in-process
//! implementations ship here, one that prints and one that records.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use cb_domain::error::{Error, Result};

/// Transport handle of a sent message.
pub type MessageRef = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonTarget {
    /// Re-enters the pipeline as a button press carrying this token.
    Callback(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundButton {
    pub label: String,
    pub target: ButtonTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub buttons: Vec<OutboundButton>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), buttons: Vec::new() }
    }
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, chat_id: i64, message: OutboundMessage) -> Result<MessageRef>;
    async fn edit(&self, chat_id: i64, message_ref: MessageRef, message: OutboundMessage) -> Result<()>;
    async fn delete(&self, chat_id: i64, message_ref: MessageRef) -> Result<()>;
}

/// Best-effort operator alerts. Callers log and swallow failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &str, text: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Console transport (CLI)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Prints every outbound action to stdout.
pub struct ConsoleTransport {
    next_ref: AtomicI64,
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self { next_ref: AtomicI64::new(1) }
    }
}

fn print_buttons(buttons: &[OutboundButton]) {
    for b in buttons {
        match &b.target {
            ButtonTarget::Callback(token) => println!("  [{}] -> /press {token}", b.label),
            ButtonTarget::Url(url) => println!("  [{}] -> {url}", b.label),
        }
    }
}

#[async_trait]
impl Messenger for ConsoleTransport {
    async fn send(&self, chat_id: i64, message: OutboundMessage) -> Result<MessageRef> {
        let id = self.next_ref.fetch_add(1, Ordering::SeqCst);
        println!("[chat {chat_id} #{id}] {}", message.text);
        print_buttons(&message.buttons);
        Ok(id)
    }

    async fn edit(&self, chat_id: i64, message_ref: MessageRef, message: OutboundMessage) -> Result<()> {
        println!("[chat {chat_id} #{message_ref} edited] {}", message.text);
        print_buttons(&message.buttons);
        Ok(())
    }

    async fn delete(&self, chat_id: i64, message_ref: MessageRef) -> Result<()> {
        println!("[chat {chat_id} #{message_ref} deleted]");
        Ok(())
    }
}

#[async_trait]
impl Notifier for ConsoleTransport {
    async fn notify(&self, channel: &str, text: &str) -> Result<()> {
        println!("[operator {channel}] {text}");
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recording transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOp {
    Sent { chat_id: i64, message_ref: MessageRef, message: OutboundMessage },
    Edited { chat_id: i64, message_ref: MessageRef, message: OutboundMessage },
    Deleted { chat_id: i64, message_ref: MessageRef },
}

/// Keeps every outbound action in memory. Individual operations can be
/// switched to fail for exercising error paths.
#[derive(Default)]
pub struct MemoryTransport {
    next_ref: AtomicI64,
    ops: Mutex<Vec<TransportOp>>,
    notifications: Mutex<Vec<(String, String)>>,
    pub fail_send: AtomicBool,
    pub fail_edit: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_notify: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<TransportOp> {
        self.ops.lock().clone()
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifications.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.ops.lock().iter().filter(|op| matches!(op, TransportOp::Sent { .. })).count()
    }

    pub fn deleted(&self) -> Vec<(i64, MessageRef)> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                TransportOp::Deleted { chat_id, message_ref } => Some((*chat_id, *message_ref)),
                _ => None,
            })
            .collect()
    }

    /// Text of the newest send or edit for a message.
    pub fn latest_text(&self, message_ref: MessageRef) -> Option<String> {
        self.ops.lock().iter().rev().find_map(|op| match op {
            TransportOp::Sent { message_ref: r, message, .. }
            | TransportOp::Edited { message_ref: r, message, .. }
                if *r == message_ref =>
            {
                Some(message.text.clone())
            }
            _ => None,
        })
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::Transport(format!("{what} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for MemoryTransport {
    async fn send(&self, chat_id: i64, message: OutboundMessage) -> Result<MessageRef> {
        Self::check(&self.fail_send, "send")?;
        let message_ref = self.next_ref.fetch_add(1, Ordering::SeqCst) + 1;
        self.ops.lock().push(TransportOp::Sent { chat_id, message_ref, message });
        Ok(message_ref)
    }

    async fn edit(&self, chat_id: i64, message_ref: MessageRef, message: OutboundMessage) -> Result<()> {
        Self::check(&self.fail_edit, "edit")?;
        self.ops.lock().push(TransportOp::Edited { chat_id, message_ref, message });
        Ok(())
    }

    async fn delete(&self, chat_id: i64, message_ref: MessageRef) -> Result<()> {
        Self::check(&self.fail_delete, "delete")?;
        self.ops.lock().push(TransportOp::Deleted { chat_id, message_ref });
        Ok(())
    }
}

#[async_trait]
impl Notifier for MemoryTransport {
    async fn notify(&self, channel: &str, text: &str) -> Result<()> {
        Self::check(&self.fail_notify, "notify")?;
        self.notifications.lock().push((channel.to_owned(), text.to_owned()));
        Ok(())
    }
}
