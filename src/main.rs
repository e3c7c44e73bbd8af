use anyhow::{Context, Result};
use clap::Parser;
use rmate::{edit, Config, EditOptions};
use std::path::PathBuf;

/// Open a local file in an editor listening for rmate connections
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// File to edit
    file: PathBuf,

    /// Editor host
    #[arg(short = 'H', long, env = "RMATE_HOST")]
    host: Option<String>,

    /// Editor port
    #[arg(short, long, env = "RMATE_PORT")]
    port: Option<u16>,

    /// Name shown in the editor instead of the path
    #[arg(short, long)]
    name: Option<String>,

    /// Place the cursor on this line
    #[arg(short, long)]
    line: Option<u32>,

    /// Configuration file (default: <config dir>/rmate/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rmate={level}").into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref())
        .context("failed to load configuration")?
        .with_overrides(cli.host, cli.port);

    let options = EditOptions {
        display_name: cli.name,
        line: cli.line,
    };

    let stats = edit(&config, &cli.file, options)
        .await
        .with_context(|| format!("editing {} via {}", cli.file.display(), config.addr()))?;

    tracing::debug!(
        saves = stats.saves,
        failed_saves = stats.failed_saves,
        protocol_errors = stats.protocol_errors,
        "done"
    );
    Ok(())
}
