pub mod chat;
pub mod config;
pub mod run;

use clap::{Parser, Subcommand};

use cb_domain::config::Config;

/// ConciergeBot: a retrieval-augmented hotel concierge chat gateway.
#[derive(Debug, Parser)]
#[command(name = "conciergebot", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the background housekeeping until interrupted (default).
    Serve,
    /// Send a single message through the pipeline and print the reply.
    Run {
        /// The message to send.
        message: String,
        /// Conversation owner.
        #[arg(long, default_value = "cli")]
        user: String,
        /// Display name used in operator alerts.
        #[arg(long, default_value = "cli")]
        name: String,
        /// Chat the message arrives in.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        chat: i64,
        /// Treat MESSAGE as a path to an audio file and transcribe it.
        #[arg(long)]
        voice: bool,
        /// Output the outcome as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Interactive conversation with group-chat simulation commands.
    Chat {
        #[arg(long, default_value = "cli")]
        user: String,
        #[arg(long, default_value = "cli")]
        name: String,
        /// Private chat id for conversation turns.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        chat: i64,
        /// Group chat id used by /join, /leave and /group.
        #[arg(long, default_value_t = -100, allow_negative_numbers = true)]
        group: i64,
    },
    /// Run one housekeeping sweep and exit.
    Sweep,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `CB_CONFIG` (or `config.toml`).
/// A missing file yields the defaults. Returns the config and the path
/// that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("CB_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(std::path::Path::new(&config_path))?;
    Ok((config, config_path))
}

pub fn load_config_from(path: &std::path::Path) -> anyhow::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.history.max_turns, 20);
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[history\nmax_turns = ").unwrap();
        let err = load_config_from(&path).unwrap_err().to_string();
        assert!(err.contains("config.toml"));
    }

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::try_parse_from(["conciergebot", "run", "hello", "--user", "42", "--json"]).unwrap();
        match cli.command {
            Some(Command::Run { message, user, json, voice, .. }) => {
                assert_eq!(message, "hello");
                assert_eq!(user, "42");
                assert!(json);
                assert!(!voice);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
