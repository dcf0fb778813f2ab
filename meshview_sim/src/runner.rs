//! Scenario runner - executes fault-injection scenarios against the refresh loop.

use crate::constellation::WalkerShell;
use crate::context::SimContext;
use crate::exporter::SimFrame;
use crate::scenarios::ScenarioId;
use crate::source::{FeedBehavior, ScriptedSource};

use meshview_core::proximity::all_pairs;
use meshview_core::{
    DistanceMetric, Graph, IndexStrategy, LoopStats, PassOutcome, Position, PositionSource,
    ProximityGraphBuilder, RefreshLoop, RefreshSettings, RetainReason, StaticSource, Threshold,
};
use meshview_env::MeshContext;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fewest ticks any scenario needs for its script to play out.
pub const MIN_TICKS: u32 = 6;

/// Link range for the dense shell; in-plane neighbours are ~1670 km apart.
const SHELL_LINK_KM: f64 = 2000.0;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u32,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Loop counters at the end of the run
    pub stats: LoopStats,

    /// One frame per tick
    pub frames: Vec<SimFrame>,
}

/// What one tick left behind.
struct TickRecord {
    outcome: PassOutcome,
    visible: Option<Arc<Graph>>,
    time: Duration,
}

impl TickRecord {
    fn observed_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.visible.as_ref().map(|g| g.snapshot().observed_at)
    }
}

/// Collects failed assertions.
#[derive(Default)]
struct Checks {
    failures: Vec<String>,
}

impl Checks {
    fn check(&mut self, condition: bool, message: impl FnOnce() -> String) {
        if !condition {
            let message = message();
            warn!("Assertion failed: {}", message);
            self.failures.push(message);
        }
    }
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Ticks per scenario
    ticks: u32,

    /// Loop settings shared by every scenario
    settings: RefreshSettings,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ticks: 10,
            settings: RefreshSettings::default(),
        }
    }

    /// Sets the tick count; raised to [`MIN_TICKS`] if lower.
    pub fn with_ticks(mut self, ticks: u32) -> Self {
        self.ticks = ticks.max(MIN_TICKS);
        self
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("{}", scenario.description());

        let context = SimContext::shared(self.seed);
        let mut checks = Checks::default();

        let (records, stats) = match scenario {
            ScenarioId::Nominal => self.run_nominal(&context, &mut checks).await,
            ScenarioId::Outage => self.run_outage(&context, &mut checks).await,
            ScenarioId::SlowFetch => self.run_slow_fetch(&context, &mut checks).await,
            ScenarioId::MalformedFeed => self.run_malformed_feed(&context, &mut checks).await,
            ScenarioId::SeamCrossing => self.run_seam_crossing(&context, &mut checks).await,
            ScenarioId::IndexParity => self.run_index_parity(&context, &mut checks).await,
        };

        let frames = records
            .iter()
            .enumerate()
            .map(|(tick, r)| {
                SimFrame::new(tick as u32, r.time.as_secs_f64(), &r.outcome, r.visible.as_deref())
            })
            .collect();

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: checks.failures.is_empty(),
            total_ticks: records.len() as u32,
            final_time_secs: context.now().as_secs_f64(),
            failure_reason: checks.failures.first().cloned(),
            stats,
            frames,
        }
    }

    /// Drives one pass per tick deadline on the virtual clock.
    async fn drive<Src: PositionSource>(
        &self,
        context: &Arc<SimContext>,
        refresh: &mut RefreshLoop<SimContext, Src>,
    ) -> Vec<TickRecord> {
        let last_good = refresh.last_good();
        let mut records = Vec::with_capacity(self.ticks as usize);

        for tick in 0..self.ticks {
            context.advance_to(self.settings.interval * tick);
            let outcome = refresh.run_pass(context.utc_now()).await;
            debug!(tick, time = ?context.now(), ?outcome, "tick");

            records.push(TickRecord {
                outcome,
                visible: last_good.current(),
                time: context.now(),
            });
        }
        records
    }

    fn dense_shell(&self, context: &SimContext) -> WalkerShell {
        let raan_offset = context.with_rng(|rng| rng.gen_range(0.0..360.0));
        WalkerShell::new("MESH", 12, 24, 53.0, 550.0, context.epoch()).with_raan_offset(raan_offset)
    }

    fn scripted_loop(
        &self,
        context: &Arc<SimContext>,
        script: Vec<FeedBehavior>,
        builder: ProximityGraphBuilder,
    ) -> RefreshLoop<SimContext, ScriptedSource> {
        let source = ScriptedSource::new(context.clone(), self.dense_shell(context), script);
        RefreshLoop::new(context.clone(), Arc::new(source), builder, self.settings.clone())
    }

    fn haversine(km: f64) -> ProximityGraphBuilder {
        ProximityGraphBuilder::new(DistanceMetric::Haversine, Threshold::Kilometers(km))
            .unwrap_or_else(|e| unreachable!("static threshold rejected: {}", e))
    }

    /// SIM-001: Every tick publishes the full shell with every in-plane link.
    async fn run_nominal(
        &self,
        context: &Arc<SimContext>,
        checks: &mut Checks,
    ) -> (Vec<TickRecord>, LoopStats) {
        let mut refresh = self.scripted_loop(context, vec![], Self::haversine(SHELL_LINK_KM));
        let records = self.drive(context, &mut refresh).await;

        for (tick, record) in records.iter().enumerate() {
            match &record.outcome {
                PassOutcome::Published(stats) => {
                    checks.check(stats.positions == 288, || {
                        format!("tick {}: {} positions, expected 288", tick, stats.positions)
                    });
                    checks.check(stats.edges >= 288, || {
                        format!("tick {}: only {} edges, in-plane rings missing", tick, stats.edges)
                    });
                }
                other => checks.check(false, || format!("tick {}: not published: {:?}", tick, other)),
            }
        }

        (records, refresh.stats().clone())
    }

    /// SIM-002: Two failed fetches keep the tick-1 graph visible.
    async fn run_outage(
        &self,
        context: &Arc<SimContext>,
        checks: &mut Checks,
    ) -> (Vec<TickRecord>, LoopStats) {
        use FeedBehavior::*;
        let script = vec![Healthy, Healthy, Outage, Outage, Healthy];
        let mut refresh = self.scripted_loop(context, script, Self::haversine(SHELL_LINK_KM));
        let records = self.drive(context, &mut refresh).await;

        for tick in [2, 3] {
            checks.check(
                matches!(
                    records[tick].outcome,
                    PassOutcome::Retained(RetainReason::SourceUnavailable(_))
                ),
                || format!("tick {}: expected source failure, got {:?}", tick, records[tick].outcome),
            );
            checks.check(records[tick].observed_at() == records[1].observed_at(), || {
                format!("tick {}: visible graph is not the tick-1 graph", tick)
            });
        }
        checks.check(records[4].outcome.is_published(), || {
            format!("tick 4: no recovery, got {:?}", records[4].outcome)
        });
        checks.check(refresh.stats().source_failures == 2, || {
            format!("{} source failures, expected 2", refresh.stats().source_failures)
        });

        (records, refresh.stats().clone())
    }

    /// SIM-003: A fetch slower than the timeout is abandoned at the timeout.
    async fn run_slow_fetch(
        &self,
        context: &Arc<SimContext>,
        checks: &mut Checks,
    ) -> (Vec<TickRecord>, LoopStats) {
        use FeedBehavior::*;
        let script = vec![Healthy, Healthy, Slow(Duration::from_secs(20))];
        let mut refresh = self.scripted_loop(context, script, Self::haversine(SHELL_LINK_KM));
        let timeout = refresh.settings().fetch_timeout;
        let interval = refresh.settings().interval;
        let records = self.drive(context, &mut refresh).await;

        checks.check(
            records[2].outcome == PassOutcome::Retained(RetainReason::TimedOut),
            || format!("tick 2: expected timeout, got {:?}", records[2].outcome),
        );
        checks.check(records[2].time == interval * 2 + timeout, || {
            format!("tick 2 ended at {:?}, expected the timeout boundary", records[2].time)
        });
        checks.check(records[2].observed_at() == records[1].observed_at(), || {
            "tick 2: stale graph was replaced".to_string()
        });
        checks.check(records[3].outcome.is_published(), || {
            format!("tick 3: no recovery, got {:?}", records[3].outcome)
        });
        checks.check(refresh.stats().timeouts == 1, || {
            format!("{} timeouts, expected 1", refresh.stats().timeouts)
        });

        (records, refresh.stats().clone())
    }

    /// SIM-004: Malformed entries are skipped and counted; an empty batch changes nothing.
    async fn run_malformed_feed(
        &self,
        context: &Arc<SimContext>,
        checks: &mut Checks,
    ) -> (Vec<TickRecord>, LoopStats) {
        use FeedBehavior::*;
        let (k1, k2) = context.with_rng(|rng| (rng.gen_range(1..=10), rng.gen_range(1..=10)));
        let script = vec![Healthy, Corrupt(k1), Empty, Corrupt(k2), Healthy];
        let mut refresh = self.scripted_loop(context, script, Self::haversine(SHELL_LINK_KM));
        let records = self.drive(context, &mut refresh).await;

        for (tick, k) in [(1, k1), (3, k2)] {
            match &records[tick].outcome {
                PassOutcome::Published(stats) => {
                    checks.check(stats.positions == 288 - k && stats.skipped == k, || {
                        format!(
                            "tick {}: {} positions / {} skipped, expected {} / {}",
                            tick, stats.positions, stats.skipped, 288 - k, k
                        )
                    });
                }
                other => checks.check(false, || format!("tick {}: not published: {:?}", tick, other)),
            }
        }
        checks.check(
            records[2].outcome == PassOutcome::Retained(RetainReason::EmptySnapshot),
            || format!("tick 2: expected empty snapshot, got {:?}", records[2].outcome),
        );
        checks.check(records[2].observed_at() == records[1].observed_at(), || {
            "tick 2: empty batch replaced the graph".to_string()
        });

        (records, refresh.stats().clone())
    }

    /// SIM-005: A pair straddling ±180° links under haversine only.
    async fn run_seam_crossing(
        &self,
        context: &Arc<SimContext>,
        checks: &mut Checks,
    ) -> (Vec<TickRecord>, LoopStats) {
        let latitude = context.with_rng(|rng| rng.gen_range(-60.0..60.0));
        let positions: Vec<Position> = [
            ("WEST", latitude, 179.5),
            ("EAST", latitude, -179.5),
            ("FAR", -latitude, 0.0),
        ]
        .into_iter()
        .filter_map(|(name, lat, lon)| Position::new(name, lat, lon, 550.0).ok())
        .collect();
        let source = Arc::new(StaticSource::from_positions(positions));

        let planar = ProximityGraphBuilder::new(DistanceMetric::Planar, Threshold::Degrees(15.0))
            .unwrap_or_else(|e| unreachable!("static threshold rejected: {}", e));
        let mut planar_loop =
            RefreshLoop::new(context.clone(), source.clone(), planar, self.settings.clone());
        let mut haversine_loop = RefreshLoop::new(
            context.clone(),
            source,
            Self::haversine(1500.0),
            self.settings.clone(),
        );

        let instant = context.utc_now();
        planar_loop.run_pass(instant).await;
        let planar_edges = planar_loop
            .last_good()
            .current()
            .map(|g| g.edge_pairs())
            .unwrap_or_default();
        checks.check(planar_edges.is_empty(), || {
            format!("planar metric linked across the seam: {:?}", planar_edges)
        });

        let records = self.drive(context, &mut haversine_loop).await;
        for (tick, record) in records.iter().enumerate() {
            let edges = record.visible.as_ref().map(|g| g.edge_pairs()).unwrap_or_default();
            checks.check(edges == vec![(0, 1)], || {
                format!("tick {}: haversine edges {:?}, expected [(0, 1)]", tick, edges)
            });
        }

        (records, haversine_loop.stats().clone())
    }

    /// SIM-006: The H3-indexed builder reproduces the all-pairs edge set.
    async fn run_index_parity(
        &self,
        context: &Arc<SimContext>,
        checks: &mut Checks,
    ) -> (Vec<TickRecord>, LoopStats) {
        const LINK_KM: f64 = 600.0;
        let indexed = Self::haversine(LINK_KM).with_strategy(IndexStrategy::H3Grid);
        let mut refresh = self.scripted_loop(context, vec![], indexed);
        let records = self.drive(context, &mut refresh).await;

        let mut compared = 0;
        for (tick, record) in records.iter().enumerate() {
            let Some(graph) = &record.visible else {
                continue;
            };
            let naive = all_pairs(graph.positions(), DistanceMetric::Haversine, LINK_KM);
            checks.check(&naive == graph.edges(), || {
                format!(
                    "tick {}: indexed {} edges, all pairs {}",
                    tick,
                    graph.edges().len(),
                    naive.len()
                )
            });
            compared += 1;
        }
        checks.check(compared == records.len(), || {
            format!("only {} of {} ticks published", compared, records.len())
        });

        (records, refresh.stats().clone())
    }
}
