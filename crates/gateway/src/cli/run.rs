//! `conciergebot run`: one message through the pipeline, then exit.

use std::sync::Arc;

use cb_domain::config::Config;

use crate::bootstrap::{self, Collaborators};
use crate::runtime::{InboundEvent, InboundMeta, TurnOutcome};
use crate::transport::ConsoleTransport;

pub struct RunArgs {
    pub message: String,
    pub user: String,
    pub name: String,
    pub chat: i64,
    pub voice: bool,
    pub json: bool,
}

pub async fn run(config: Arc<Config>, args: RunArgs) -> anyhow::Result<()> {
    let console = Arc::new(ConsoleTransport::new());
    let collab = Collaborators::openai(&config.llm, console.clone(), console)?;
    let state = bootstrap::build_app_state(config, collab).await?;

    let meta = InboundMeta {
        user_id: args.user,
        display_name: args.name,
        chat_id: args.chat,
    };
    let event = if args.voice {
        InboundEvent::Voice { audio_ref: args.message }
    } else {
        InboundEvent::Text(args.message)
    };

    let outcome = state.orchestrator.handle_event(meta, event).await;

    if args.json {
        let json = serde_json::to_string_pretty(&outcome)
            .map_err(|e| anyhow::anyhow!("serializing outcome: {e}"))?;
        println!("{json}");
    } else {
        print_outcome(&outcome);
    }

    // Escalations are delivered in the background; give them a moment.
    if outcome.escalated {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
    Ok(())
}

pub(crate) fn print_outcome(outcome: &TurnOutcome) {
    println!("{}", outcome.display_text);
    for action in &outcome.actions {
        println!("  [{}] -> /press {}", action.label, action.action_token);
    }
}
