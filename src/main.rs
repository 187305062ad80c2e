use anyhow::Context;
use clap::Parser;
use concierge::kernel::sweeper::spawn_idle_sweeper;
use concierge::kernel::time::SystemClock;
use concierge::{builtin, logging, AssistantConfig, Modality, Utterance};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Console front end: each stdin line is one utterance of a single session.
#[derive(Parser, Debug)]
#[command(name = "concierge", version, about)]
struct Args {
    /// JSON config file (defaults to $CONCIERGE_CONFIG, then built-in defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "console")]
    session: String,

    /// Treat input as transcribed speech
    #[arg(long)]
    voice: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AssistantConfig::load(args.config.as_deref()).context("loading configuration")?;
    logging::init_tracing(&config.log_level).context("installing tracing subscriber")?;
    tracing::info!("Concierge booting...");

    let orchestrator = Arc::new(
        builtin::assemble(&config, Arc::new(SystemClock))
            .await
            .context("opening session store")?,
    );

    let shutdown = CancellationToken::new();
    let sweeper = spawn_idle_sweeper(orchestrator.clone(), config.sweep_interval(), shutdown.clone());

    let modality = if args.voice { Modality::Voice } else { Modality::Text };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Say something (Ctrl-D or Ctrl-C to quit).");

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            line = lines.next_line() => line.context("reading stdin")?,
        };
        let Some(line) = line else { break };

        let utterance = Utterance::new(&args.session, &line, modality, chrono::Utc::now());
        let response = orchestrator.handle_turn(utterance).await;
        println!("> {}", response.text);
        if !response.payload.is_empty() {
            tracing::debug!(payload = ?response.payload, "action payload");
        }
        if response.ended_session {
            break;
        }
    }

    shutdown.cancel();
    sweeper.await.context("joining idle sweeper")?;
    let stats = orchestrator.telemetry_snapshot();
    tracing::info!(
        turns = stats.turn_stats.total,
        dispatched = stats.dispatch_stats.ok + stats.dispatch_stats.failed,
        "Concierge stopped"
    );
    Ok(())
}
