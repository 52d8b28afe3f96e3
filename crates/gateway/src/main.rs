use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cb_domain::config::{Config, ObservabilityConfig};
use cb_gateway::bootstrap::{self, Collaborators};
use cb_gateway::cli::chat::ChatArgs;
use cb_gateway::cli::run::RunArgs;
use cb_gateway::cli::{Cli, Command, ConfigCommand};
use cb_gateway::transport::ConsoleTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            let (config, _) = cb_gateway::cli::load_config()?;
            init_tracing(&config.observability);
            serve(Arc::new(config)).await
        }
        Some(Command::Run { message, user, name, chat, voice, json }) => {
            init_cli_tracing();
            let (config, _) = cb_gateway::cli::load_config()?;
            let args = RunArgs { message, user, name, chat, voice, json };
            cb_gateway::cli::run::run(Arc::new(config), args).await
        }
        Some(Command::Chat { user, name, chat, group }) => {
            init_cli_tracing();
            let (config, _) = cb_gateway::cli::load_config()?;
            let args = ChatArgs { user, name, chat, group };
            cb_gateway::cli::chat::chat(Arc::new(config), args).await
        }
        Some(Command::Sweep) => {
            init_cli_tracing();
            let (config, _) = cb_gateway::cli::load_config()?;
            let state = build_console_state(Arc::new(config)).await?;
            let report = state.sweeper.tick().await;
            println!(
                "cleared {} welcome(s), deleted {} queued message(s), {} failure(s)",
                report.welcomes_cleared, report.messages_deleted, report.delete_failures
            );
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cb_gateway::cli::load_config()?;
            if !cb_gateway::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _) = cb_gateway::cli::load_config()?;
            cb_gateway::cli::config::show(&config)
        }
        Some(Command::Version) => {
            println!("conciergebot {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured tracing for the long-running `serve` command.
fn init_tracing(obs: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&obs.default_filter));

    if obs.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }
}

/// Compact stderr-only tracing for CLI commands.
///
/// Defaults to `warn` so diagnostic output does not pollute stdout.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

async fn build_console_state(config: Arc<Config>) -> anyhow::Result<cb_gateway::state::AppState> {
    let console = Arc::new(ConsoleTransport::new());
    let collab = Collaborators::openai(&config.llm, console.clone(), console)?;
    bootstrap::build_app_state(config, collab).await
}

/// Boot the runtime and keep the housekeeping loops running until a
/// shutdown signal arrives. Chat adapters attach to the same state.
async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("ConciergeBot starting");

    let state = build_console_state(config).await?;
    let shutdown = Arc::new(tokio::sync::Notify::new());
    let tasks = bootstrap::spawn_background_tasks(&state, shutdown.clone());

    shutdown_signal().await;
    shutdown.notify_waiters();
    futures_util::future::join_all(tasks).await;

    tracing::info!("shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
                tracing::info!("received SIGINT, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received SIGINT, shutting down");
    }
}
