//! Console driver: reads a topic and round triggers from stdin, prints each turn.
//!
//! Usage: `agon [config.yaml]`
//!
//! - first non-empty line: the topic, starts round 1
//! - empty line or `next`: run the next round
//! - `reset`: forget the topic, summary and all entity memory
//! - `quit` / `exit`: leave
//!
//! Ctrl-C while a round is running stops it; the turn in flight is not
//! committed. Ctrl-C at the prompt exits.

use agon::interrupt::Interrupts;
use agon::telemetry::init_tracing;
use agon::{ChatClient, DebateConfig, DebateOrchestrator, DebateSession, Error};
use futures::future::join_all;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = DebateConfig::load(config_path.as_deref())?;
    init_tracing(&config.logging)?;

    let orchestrator = DebateOrchestrator::from_config(&config)?;
    check_providers(&config).await;
    let interrupts = Interrupts::new();
    let _ctrl_c = interrupts.listen();
    let mut session = DebateSession::new();
    let turn_delay = config.presentation.turn_delay();
    info!(session_id = %session.id(), "debate session ready");

    println!("=== agon debate ===");
    for binding in orchestrator.registry().iter() {
        println!("  {} -> {} ({})", binding.display_name, binding.model, binding.provider);
    }
    println!("\nEnter a debate topic:");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut topic_input = String::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "quit" | "exit" => break,
            "reset" => {
                match orchestrator.reset(&mut session).await {
                    Ok(()) => println!("\nDebate reset. Enter a new topic:"),
                    Err(e) => eprintln!("Reset failed: {}", e),
                }
                continue;
            }
            _ => {}
        }

        if session.awaiting_topic() {
            if line.is_empty() || line == "next" {
                println!("Enter a topic first.");
                continue;
            }
            topic_input = line.to_string();
            println!("\nTopic: {}\n", topic_input);
        }

        run_round(&orchestrator, &mut session, &topic_input, turn_delay, &interrupts).await;
        println!(
            "\n[round {}] Enter for the next round, 'reset' to start over, 'quit' to leave.",
            session.round()
        );
    }

    Ok(())
}

/// Hit every provider's `/models` endpoint concurrently.
///
/// Only logs: an unreachable provider fails its entity's turn later, with a
/// retryable error, instead of blocking startup.
async fn check_providers(config: &DebateConfig) {
    let checks = config.providers.iter().map(|(name, provider)| async move {
        let client = ChatClient::new(name.clone(), provider)?;
        let models = client.health_check().await?;
        Ok::<_, Error>(models.data.len())
    });
    let names = config.providers.keys();

    for (name, result) in names.zip(join_all(checks).await) {
        match result {
            Ok(count) => info!(provider = %name, models = count, "provider reachable"),
            Err(e) => warn!(provider = %name, error = %e, "provider health check failed"),
        }
    }
}

/// Run the remaining turns of the current round, printing each as it commits.
///
/// Stops at the first failed turn; the session still points at that turn so
/// the next trigger retries it. Ctrl-C during a turn or the pause between
/// turns stops the round without committing anything further.
async fn run_round(
    orchestrator: &DebateOrchestrator,
    session: &mut DebateSession,
    topic_input: &str,
    turn_delay: Duration,
    interrupts: &Interrupts,
) {
    let mut round = interrupts.enter_round();
    loop {
        let closes_round = session.phase().closes_round();

        match orchestrator
            .advance_cancellable(session, topic_input, round.stopped())
            .await
        {
            Ok(utterance) => {
                let (speaker, text) = utterance.as_pair();
                println!("{}: {}\n", speaker, text);
            }
            Err(Error::Cancelled(what)) => {
                println!("Cancelled {}. Press Enter to retry it.", what);
                return;
            }
            Err(e) => {
                error!(error = %e, "turn failed");
                if e.is_recoverable() {
                    eprintln!("Turn failed: {}. Press Enter to retry or type 'reset'.", e);
                } else {
                    eprintln!("Turn failed: {}", e);
                }
                return;
            }
        }

        if closes_round {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(turn_delay) => {}
            _ = round.stopped() => {
                println!("Round stopped. Press Enter to continue it.");
                return;
            }
        }
    }
}
