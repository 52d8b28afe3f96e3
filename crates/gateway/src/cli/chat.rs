//! `conciergebot chat`: interactive REPL.
//!
//! Plain lines are conversation turns. Slash commands drive the group
//! side: joins, leaves, group messages for moderation, and the sweep.

use std::sync::Arc;

use chrono::Utc;

use cb_domain::config::Config;

use crate::bootstrap::{self, Collaborators};
use crate::runtime::{GroupMessage, InboundEvent, InboundMeta, Member};
use crate::state::AppState;
use crate::transport::ConsoleTransport;

use super::run::print_outcome;

pub struct ChatArgs {
    pub user: String,
    pub name: String,
    pub chat: i64,
    pub group: i64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(config: Arc<Config>, args: ChatArgs) -> anyhow::Result<()> {
    let console = Arc::new(ConsoleTransport::new());
    let collab = Collaborators::openai(&config.llm, console.clone(), console)?;
    let state = bootstrap::build_app_state(config, collab).await?;

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let tasks = bootstrap::spawn_background_tasks(&state, shutdown.clone());

    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".conciergebot")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("ConciergeBot interactive chat");
    eprintln!("User: {}  |  Type /help for commands, Ctrl+D to exit", args.user);
    eprintln!();

    let mut repl = Repl { state: &state, args: &args, next_member_id: 1000, next_message_ref: 1 };

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    if repl.slash_command(trimmed).await {
                        break;
                    }
                    continue;
                }
                repl.send(InboundEvent::Text(trimmed.to_owned())).await;
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    shutdown.notify_waiters();
    futures_util::future::join_all(tasks).await;
    eprintln!("Goodbye!");
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Repl<'a> {
    state: &'a AppState,
    args: &'a ChatArgs,
    next_member_id: i64,
    next_message_ref: i64,
}

impl Repl<'_> {
    async fn send(&self, event: InboundEvent) {
        let meta = InboundMeta {
            user_id: self.args.user.clone(),
            display_name: self.args.name.clone(),
            chat_id: self.args.chat,
        };
        let outcome = self.state.orchestrator.handle_event(meta, event).await;
        print_outcome(&outcome);
        if outcome.escalated {
            eprintln!("\x1b[2m(operator notified)\x1b[0m");
        }
    }

    fn member(&mut self, name: &str) -> Member {
        self.next_member_id += 1;
        let (username, first_name) = match name.strip_prefix('@') {
            Some(u) => (Some(u.to_owned()), u.to_owned()),
            None => (None, name.to_owned()),
        };
        Member { user_id: self.next_member_id, username, first_name, last_name: None }
    }

    /// Returns `true` if the REPL should exit.
    async fn slash_command(&mut self, input: &str) -> bool {
        let (cmd, arg) = match input.split_once(' ') {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (input, ""),
        };

        match cmd {
            "/exit" | "/quit" => return true,

            "/press" if !arg.is_empty() => {
                self.send(InboundEvent::ButtonPressed { token: arg.to_owned() }).await;
            }

            "/voice" if !arg.is_empty() => {
                self.send(InboundEvent::Voice { audio_ref: arg.to_owned() }).await;
            }

            "/join" if !arg.is_empty() => {
                let members: Vec<Member> = arg.split_whitespace().map(|n| self.member(n)).collect();
                match self
                    .state
                    .membership
                    .handle_join(self.args.group, &members, "join", None)
                    .await
                {
                    Ok(outcome) => eprintln!("welcome: {outcome:?}"),
                    Err(e) => eprintln!("\x1B[31mwelcome failed: {e}\x1B[0m"),
                }
            }

            "/leave" if !arg.is_empty() => {
                let member = self.member(arg);
                self.state.membership.handle_leave(self.args.group, &member, "left", None).await;
            }

            "/group" if !arg.is_empty() => {
                self.next_message_ref += 1;
                let msg = GroupMessage {
                    chat_id: self.args.group,
                    message_ref: self.next_message_ref,
                    author: Member {
                        user_id: 1,
                        username: None,
                        first_name: self.args.name.clone(),
                        last_name: None,
                    },
                    text: arg.to_owned(),
                    sent_at: Utc::now(),
                    reply_to: None,
                };
                let spam = self.state.moderator.handle_group_message(msg).await;
                eprintln!("moderation: {}", if spam { "spam removed" } else { "clean" });
            }

            "/sweep" => {
                let report = self.state.sweeper.tick().await;
                eprintln!("sweep: {report:?}");
            }

            "/help" => {
                eprintln!("Commands:");
                eprintln!("  /press <token>     Press an inline action");
                eprintln!("  /voice <path>      Send an audio file as a voice message");
                eprintln!("  /join <names...>   Simulate members joining the group");
                eprintln!("  /leave <name>      Simulate a member leaving the group");
                eprintln!("  /group <text>      Post a group message (moderated)");
                eprintln!("  /sweep             Run one housekeeping sweep");
                eprintln!("  /exit, /quit       Exit the chat");
            }

            other => {
                eprintln!("Unknown or incomplete command: {other}  (type /help for a list)");
            }
        }

        false
    }
}
