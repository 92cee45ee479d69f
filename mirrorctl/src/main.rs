use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use mirrorctl::{run, Command, SqliteDirectory};
use mirrordir::{AsyncMirrorDirectory, Directory, MirrorConfig, SyncMirrorDirectory};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Write through to the database before returning
    Sync,
    /// Replay writes to the database in the background, drain on exit
    Async,
}

/// Run a directory command through an in-memory mirror of a SQLite store
#[derive(Debug, Parser)]
#[command(name = "mirrorctl", version)]
struct Cli {
    /// SQLite database holding the entries
    #[arg(long, env = "MIRRORCTL_DB")]
    db: PathBuf,

    #[arg(long, value_enum, default_value_t = Mode::Async)]
    mode: Mode,

    /// JSON file with mirror settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the drain timeout from the config file
    #[arg(long, env = "MIRRORCTL_DRAIN_TIMEOUT_SECS")]
    drain_timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

fn load_config(cli: &Cli) -> anyhow::Result<MirrorConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => MirrorConfig::default(),
    };
    if let Some(secs) = cli.drain_timeout_secs {
        config = config.with_drain_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let backing = Arc::new(
        SqliteDirectory::open(&cli.db)
            .with_context(|| format!("cannot open {}", cli.db.display()))?,
    );
    let mut out = std::io::stdout();

    match cli.mode {
        Mode::Sync => {
            let mirror = SyncMirrorDirectory::new(backing).await?;
            let result = run(&mirror, &cli.command, &mut out).await;
            mirror.close().await?;
            result?;
        }
        Mode::Async => {
            let mirror = AsyncMirrorDirectory::builder(backing)
                .config(config)
                .open()
                .await?;
            let result = run(&mirror, &cli.command, &mut out).await;
            mirror.close().await?;
            result?;
        }
    }

    info!(db = %cli.db.display(), mode = ?cli.mode, "done");
    Ok(())
}
