//! MeshView Simulator CLI
//!
//! Run the refresh pipeline through deterministic fault-injection scenarios.

use clap::Parser;
use meshview_sim::scenarios::ScenarioId;
use meshview_sim::{ScenarioResult, ScenarioRunner, SimExport};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// MeshView Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "meshview-sim")]
#[command(about = "Run deterministic simulations of the MeshView refresh loop", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (nominal, outage, slow_fetch, malformed_feed, seam_crossing, index_parity, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Refresh ticks per scenario
    #[arg(short, long, default_value = "10")]
    ticks: u32,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-tick frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.json {
        info!("MeshView Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                eprintln!("Error: {}", e);
                let names: Vec<_> = ScenarioId::all().iter().map(|s| s.name()).collect();
                eprintln!("Available scenarios: {}, all", names.join(", "));
                std::process::exit(1);
            }
        }
    };

    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    if args.export.is_some() && scenarios.len() > 1 {
        eprintln!("Error: --export only supports a single scenario, not 'all'");
        std::process::exit(1);
    }

    let runner = ScenarioRunner::new(seed).with_ticks(args.ticks);
    let mut results: Vec<ScenarioResult> = Vec::new();

    for scenario in &scenarios {
        let result = runner.run(*scenario).await;

        if !args.json {
            if result.passed {
                info!(
                    "✓ {} (seed={}) PASSED | published={} retained={}",
                    scenario.name(),
                    seed,
                    result.stats.published,
                    result.stats.passes - result.stats.published
                );
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    scenario.name(),
                    seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }

        if let Some(path) = &args.export {
            let mut export = SimExport::new(scenario.name(), seed);
            for frame in result.frames.iter().cloned() {
                export.add_frame(frame);
            }
            export.finalize(result.passed, result.stats.clone());

            match export.write_to_file(path) {
                Ok(()) => info!("Exported {} frames to {}", export.frames.len(), path),
                Err(e) => error!("Failed to write export: {:?}", e),
            }
        }

        results.push(result);
    }

    let total = results.len();
    let failed = results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed,
            "failed": failed,
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "stats": r.stats,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to serialize summary: {}", e),
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed, total);
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
}
