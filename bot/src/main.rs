//! arrwatch-bot binary. Reads settings.json (or the legacy environment variables), then keeps
//! the configured Discord channel in sync with the Sonarr/Radarr queues.

use std::path::PathBuf;
use std::time::Duration;

use arrwatch::config::{self, MIN_POLL_INTERVAL_SECS};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "arrwatch-bot", version, about)]
struct Args {
    /// Settings file. Defaults to ./settings.json when present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single tick and exit.
    #[arg(long)]
    once: bool,

    /// Poll interval in seconds; overrides the settings file.
    #[arg(long)]
    interval_secs: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut settings = config::load(args.config.as_deref())?;
    if let Some(secs) = args.interval_secs {
        anyhow::ensure!(
            secs >= MIN_POLL_INTERVAL_SECS,
            "--interval-secs must be at least {MIN_POLL_INTERVAL_SECS}"
        );
        settings.poll_interval = Duration::from_secs(secs);
    }
    tracing::info!(
        instances = settings.instances.len(),
        interval_secs = settings.poll_interval.as_secs(),
        grouping = ?settings.grouping,
        "settings loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(arrwatch_bot::run_bot(settings, args.once))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from(["arrwatch-bot", "--config", "/etc/arrwatch.json", "--once", "--interval-secs", "30"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/arrwatch.json")));
        assert!(args.once);
        assert_eq!(args.interval_secs, Some(30));
    }

    #[test]
    fn defaults_to_looping_without_overrides() {
        let args = Args::try_parse_from(["arrwatch-bot"]).unwrap();
        assert!(args.config.is_none());
        assert!(!args.once);
        assert!(args.interval_secs.is_none());
    }
}
