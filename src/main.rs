use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use podcatch::config::{Config, Settings};
use podcatch::pipeline;

#[derive(Parser, Debug)]
#[command(
    name = "podcatch",
    about = "Download podcast episodes from RSS feeds into a local archive"
)]
struct Args {
    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Debug output
    #[arg(long)]
    debug: bool,

    /// Destination directory for downloads
    #[arg(short = 'd', long = "dest", value_name = "DIR")]
    dest: Option<PathBuf>,

    /// Re-download an episode whose file is older than this many days
    /// (0 disables rerun handling)
    #[arg(short = 'r', long = "rerun-days", value_name = "DAYS")]
    rerun_days: Option<u64>,

    /// Filename extraction instruction, "<field> <pattern>", for feeds
    /// behind tracking redirects
    #[arg(long, value_name = "INSTRUCTION")]
    extract: Option<String>,

    /// Settings file (default: ~/.config/podcatch/settings.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Feed URLs to process
    #[arg(value_name = "FEED_URL", required = true)]
    feeds: Vec<String>,
}

fn default_settings_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("podcatch")
            .join("settings.toml")
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise the -v/--debug flags pick the level
    let default_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => match default_settings_path() {
            Some(path) => Settings::load(&path).context("failed to load settings")?,
            None => Settings::default(),
        },
    };

    // Fatal before any feed is touched: a bad extraction instruction must
    // not start a partial run
    let config = Arc::new(
        Config::resolve(settings, args.dest, args.rerun_days, args.extract)
            .context("invalid configuration")?,
    );

    pipeline::run(config, &args.feeds).await
}
