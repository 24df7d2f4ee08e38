use anyhow::{bail, Context, Result};
use clap::Parser;
use sheet2da::{
    config::Config,
    fetch::{Fetcher, HttpFetcher},
    state::{JsonStateStore, StateStore},
    sync::{SyncEngine, SyncOptions},
};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, fmt::writer::MakeWriterExt, EnvFilter};

/// Syncs published spreadsheet tabs into 2DA tables for a game server's
/// override folder. The server never touches the internet; this tool does.
#[derive(Debug, Parser)]
#[command(name = "sheet2da", version, about)]
struct Args {
    /// Path to the JSON config file.
    #[arg(long, default_value = "sheet2da.json")]
    config: PathBuf,

    /// Preview changes without writing any files.
    #[arg(long)]
    dry_run: bool,

    /// Keep running, re-syncing every poll interval.
    #[arg(long)]
    watch: bool,

    /// Ignore change detection and re-sync every sheet.
    #[arg(long)]
    force: bool,

    /// Write a starter config to the --config path and exit.
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init {
        return write_example_config(&args.config);
    }

    // ─── 1) load config ──────────────────────────────────────────────
    let config = Config::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    // ─── 2) init logging ─────────────────────────────────────────────
    let _guard = init_logging(&config)?;
    info!(config = %args.config.display(), sheets = config.sheets.len(), "startup");

    // ─── 3) build collaborators ──────────────────────────────────────
    let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch_timeout_secs));
    let store = JsonStateStore::open(&config.state_file)
        .with_context(|| format!("opening state store {}", config.state_file.display()))?;
    let engine = SyncEngine::new(fetcher, store, &config);

    if !config.output_dir.exists() && !args.dry_run {
        warn!(
            dir = %config.output_dir.display(),
            "output directory does not exist yet; it will be created on first write"
        );
    }

    // ─── 4) run ──────────────────────────────────────────────────────
    let mut opts = SyncOptions {
        dry_run: args.dry_run,
        force: args.force,
    };
    if args.watch {
        info!(
            interval_secs = config.poll_interval_secs,
            "watch mode: press Ctrl+C to stop"
        );
        loop {
            if let Err(err) = run_once(&engine, opts).await {
                error!(%err, "sync pass failed");
            }
            // only the first pass of a watch session honors --force
            opts.force = false;
            tokio::time::sleep(Duration::from_secs(config.poll_interval_secs)).await;
        }
    } else {
        run_once(&engine, opts).await
    }
}

async fn run_once<F: Fetcher, S: StateStore>(
    engine: &SyncEngine<F, S>,
    opts: SyncOptions,
) -> Result<()> {
    info!(dry_run = opts.dry_run, "sync pass starting");
    let report = engine.run(opts).await?;

    let updated = report.updated();
    if updated.is_empty() {
        info!("sync complete: no changes detected");
    } else {
        info!(
            count = updated.len(),
            sheets = updated.join(", "),
            "sync complete"
        );
        info!("reload the server's table cache to pick up the new files");
    }
    if report.failure_count() > 0 {
        warn!(failures = report.failure_count(), "some sheets did not sync");
    }
    Ok(())
}

fn init_logging(config: &Config) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &config.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("log file {} has no file name", path.display()))?;
            fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let (file_writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            fmt::Subscriber::builder()
                .with_env_filter(env)
                .with_ansi(false)
                .with_writer(std::io::stdout.and(file_writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            fmt::Subscriber::builder().with_env_filter(env).init();
            Ok(None)
        }
    }
}

fn write_example_config(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("refusing to overwrite existing config at {}", path.display());
    }
    let text =
        serde_json::to_string_pretty(&Config::example()).context("serializing example config")?;
    fs::write(path, text + "\n").with_context(|| format!("writing {}", path.display()))?;
    println!(
        "wrote starter config to {} - fill in the sheet URLs before syncing",
        path.display()
    );
    Ok(())
}
