use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use gtp_sync::gtp::{parse_genmove, Command};
use gtp_sync::{
    Color, Config, EngineProcess, GtpTransport, Komi, Position, PositionSource,
    SyncOptions, Synchronizer,
};

#[derive(Parser, Debug)]
#[command(name = "gtp-sync")]
#[command(about = "Load a position into a GTP engine and keep it in sync", long_about = None)]
#[command(version)]
struct Cli {
    /// Moves of the position, e.g. `B:D4 W:Q16` (use `B:pass` for a pass)
    moves: Vec<String>,

    /// Engine command line, e.g. "gnugo --mode gtp"
    #[arg(short, long, env = "GTP_SYNC_ENGINE")]
    engine: Option<String>,

    /// Config file (default: <config dir>/gtp-sync/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Board size
    #[arg(short, long, default_value_t = 19)]
    size: usize,

    #[arg(short, long)]
    komi: Option<f64>,

    /// Afterwards, synchronize to this variation instead
    #[arg(long, num_args = 1..)]
    then: Vec<String>,

    /// Finally let the engine generate a move for this color
    #[arg(long)]
    genmove: Option<String>,

    /// Per-command timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Never use gg-undo or play_sequence
    #[arg(long)]
    no_batch: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Serialize)]
struct Summary {
    size: usize,
    komi: Option<f64>,
    moves: Vec<String>,
    capabilities: Vec<String>,
    out_of_sync: bool,
    resigned: bool,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gtp_sync={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config =
        Config::load_or_default(cli.config.as_deref()).context("Failed to load config")?;

    if let Some(engine) = &cli.engine {
        config.engine.set_command_line(engine);
    }
    if cli.timeout.is_some() {
        config.engine.timeout_secs = cli.timeout;
    }
    if cli.no_batch {
        config.sync = SyncOptions {
            batch_undo: false,
            batch_play: false,
        };
    }

    if config.engine.command.is_empty() {
        anyhow::bail!(
            "No engine configured: pass --engine or set [engine] command in the config file"
        );
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = resolve_config(&cli)?;

    let mut position = Position::from_texts(cli.size, &cli.moves).context("Invalid position")?;
    position.set_komi(cli.komi.map(Komi));

    let engine = EngineProcess::spawn(&config.engine)
        .await
        .with_context(|| format!("Failed to start engine `{}`", config.engine.command))?;
    let mut sync = Synchronizer::with_options(engine, config.sync);

    sync.init(&position)
        .await
        .context("Failed to load position into engine")?;
    tracing::info!("Engine holds {} moves", sync.peer_moves().len());

    if !cli.then.is_empty() {
        let komi = position.komi();
        position = Position::from_texts(cli.size, &cli.then).context("Invalid variation")?;
        position.set_komi(komi);

        sync.synchronize(&position)
            .await
            .context("Failed to synchronize variation")?;
    }

    let mut resigned = false;
    if let Some(color) = &cli.genmove {
        let color: Color = color.parse()?;
        let text = sync
            .transport_mut()
            .send(&Command::genmove(color).to_string())
            .await
            .context("genmove failed")?;

        match parse_genmove(&text, color, cli.size)? {
            Some(mv) => {
                position.play(mv);
                sync.update_after_genmove(&position);
            }
            None => resigned = true,
        }
    }

    let summary = Summary {
        size: cli.size,
        komi: cli.komi,
        moves: sync.peer_moves().iter().map(ToString::to_string).collect(),
        capabilities: sync
            .capabilities()
            .iter_names()
            .map(|(name, _)| name.to_string())
            .collect(),
        out_of_sync: sync.is_out_of_sync(),
        resigned,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for mv in &summary.moves {
            println!("{}", mv);
        }
        if resigned {
            println!("(engine resigned)");
        }
    }

    sync.into_transport().close().await?;

    Ok(())
}
