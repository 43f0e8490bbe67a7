//! `permgate`
//!
//! Replays an NDJSON permission scenario through the arbitration engine and
//! prints the resulting queue states and outbound runtime/focus calls.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use permgate_core::config::load_config;
use permgate_core::tracing_init::{default_filter, init_tracing};
use permgate_engine::replay::{Replayer, read_script};

#[derive(Parser, Debug)]
#[command(name = "permgate")]
#[command(version, about = "permgate - permission request arbitration replay")]
struct Args {
    /// Scenario file (NDJSON). Reads stdin when omitted.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Settings file layered over the global config.
    #[arg(long, env = "PERMGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,

    /// Start with the host window focused.
    #[arg(long)]
    focused: bool,

    /// Override the group cooldown (seconds).
    #[arg(long)]
    cooldown_secs: Option<u64>,

    /// Override the group grace period (seconds).
    #[arg(long)]
    grace_period_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(secs) = args.cooldown_secs {
        config.arbiter.cooldown_secs = secs;
    }
    if let Some(secs) = args.grace_period_secs {
        config.arbiter.grace_period_secs = secs;
    }

    init_tracing(
        &default_filter(&config.logging.level),
        args.log_json || config.logging.json,
    );

    let ops = read_script(args.script.as_deref()).with_context(|| match &args.script {
        Some(path) => format!("Failed to load scenario {}", path.display()),
        None => "Failed to load scenario from stdin".to_string(),
    })?;

    let settings = config.arbiter.settings();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        ops = ops.len(),
        cooldown_secs = settings.cooldown.as_secs(),
        grace_period_secs = settings.grace_period.as_secs(),
        "Starting replay"
    );

    let replayer = Replayer::new(settings, args.focused);
    let report = replayer.run(ops).await;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
