//! MeshView Agent - live satellite proximity mesh
//!
//! Fetches active element sets from CelesTrak on a fixed interval, propagates
//! them to the current instant and publishes the proximity graph to:
//! - the log (one summary line per update)
//! - a GeoJSON file, when `--output` is given

use anyhow::{Context, Result};
use clap::Parser;
use meshview_core::{
    drive_presenter, CelestrakSource, DistanceMetric, GeoJsonPresenter, Graph, IndexStrategy,
    LogPresenter, MeshConfig, RefreshLoop, SnapshotPresenter, Threshold,
};
use meshview_env::{MeshContext, TokioContext};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// MeshView live agent
#[derive(Parser, Debug)]
#[command(name = "meshview", version)]
#[command(about = "Link nearby satellites into a live proximity mesh", long_about = None)]
struct Args {
    /// JSON configuration file; flags below override its values
    #[arg(short, long, env = "MESHVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between refreshes
    #[arg(long, env = "MESHVIEW_REFRESH_INTERVAL_SECS")]
    refresh_interval_secs: Option<u64>,

    /// Seconds before a fetch is abandoned
    #[arg(long, env = "MESHVIEW_FETCH_TIMEOUT_SECS")]
    fetch_timeout_secs: Option<u64>,

    /// Maximum satellites per snapshot
    #[arg(long, env = "MESHVIEW_MAX_SATELLITES")]
    max_satellites: Option<usize>,

    /// Distance metric (haversine, planar)
    #[arg(long, env = "MESHVIEW_METRIC")]
    metric: Option<DistanceMetric>,

    /// Link threshold with its unit: `1500km` for haversine, `15deg` for planar
    #[arg(long, env = "MESHVIEW_THRESHOLD")]
    threshold: Option<Threshold>,

    /// Candidate index (all_pairs, h3)
    #[arg(long, env = "MESHVIEW_INDEX")]
    index: Option<IndexStrategy>,

    /// Element-set URL (TLE format)
    #[arg(long, env = "MESHVIEW_SOURCE_URL")]
    source_url: Option<String>,

    /// GeoJSON output file
    #[arg(short, long, env = "MESHVIEW_OUTPUT")]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<MeshConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => MeshConfig::default(),
        };

        if let Some(v) = self.refresh_interval_secs {
            config.refresh_interval_secs = v;
        }
        if let Some(v) = self.fetch_timeout_secs {
            config.fetch_timeout_secs = v;
        }
        if let Some(v) = self.max_satellites {
            config.max_satellites = v;
        }
        if let Some(v) = self.metric {
            config.metric = v;
        }
        if self.threshold.is_some() {
            config.threshold = self.threshold;
        }
        if let Some(v) = self.index {
            config.index = v;
        }
        if let Some(v) = self.source_url {
            config.source_url = v;
        }
        if self.output.is_some() {
            config.output_path = self.output;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Runs a presenter until the refresh loop goes away.
async fn present_updates<P>(
    name: &'static str,
    updates: watch::Receiver<Option<Arc<Graph>>>,
    presenter: P,
) where
    P: SnapshotPresenter + 'static,
{
    if let Err(e) = drive_presenter(updates, presenter).await {
        warn!(presenter = name, "Presenter stopped: {}", e);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let config = args.into_config()?;

    info!("MeshView Agent v{}", env!("CARGO_PKG_VERSION"));

    let builder = config.graph_builder()?;
    info!(
        metric = %builder.metric(),
        threshold = %builder.threshold(),
        index = ?builder.strategy(),
        interval_secs = config.refresh_interval_secs,
        "Configuration loaded"
    );

    let context = TokioContext::shared();
    let source = CelestrakSource::new(
        config.source_url.clone(),
        config.max_satellites,
        config.fetch_timeout(),
    )?;
    info!(url = source.url(), max_satellites = config.max_satellites, "Element-set source ready");

    let mut refresh = RefreshLoop::new(
        context.clone(),
        Arc::new(source),
        builder,
        config.refresh_settings(),
    );

    let updates = refresh.last_good().subscribe();
    context.spawn("log-presenter", present_updates("log", updates, LogPresenter));
    if let Some(path) = config.output_path.clone() {
        info!(path = %path.display(), "Writing GeoJSON");
        let updates = refresh.last_good().subscribe();
        context.spawn(
            "geojson-presenter",
            present_updates("geojson", updates, GeoJsonPresenter::new(path)),
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let stats = refresh.run(shutdown_rx).await;
    info!(
        passes = stats.passes,
        published = stats.published,
        failures = stats.source_failures,
        timeouts = stats.timeouts,
        ticks_dropped = stats.ticks_dropped,
        "MeshView Agent stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("meshview").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = parse(&["--metric", "planar", "--threshold", "5deg", "--index", "h3"])
            .into_config()
            .unwrap();

        assert_eq!(config.metric, DistanceMetric::Planar);
        assert_eq!(config.threshold, Some(Threshold::Degrees(5.0)));
        assert_eq!(config.index, IndexStrategy::H3Grid);
        assert_eq!(config.refresh_interval_secs, 10);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = parse(&["--fetch-timeout-secs", "30"]).into_config().unwrap_err();
        assert!(err.to_string().contains("fetch_timeout_secs"));
    }

    #[test]
    fn test_threshold_unit_mismatch_rejected() {
        let err = parse(&["--metric", "planar", "--threshold", "1500km"])
            .into_config()
            .unwrap_err();
        assert!(err.to_string().contains("kilometers") || err.to_string().contains("km"));
    }

    #[test]
    fn test_threshold_without_unit_rejected() {
        let argv = ["meshview", "--threshold", "1500"];
        assert!(Args::try_parse_from(argv).is_err());
    }
}
