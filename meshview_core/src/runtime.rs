//! Refresh Runtime - drives the fetch → build → publish pipeline on a timer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        RefreshLoop                           │
//! │                                                              │
//! │  tick ──► PositionSource.fetch ──► ProximityGraphBuilder     │
//! │            (bounded by timeout)            │                 │
//! │                                            ▼                 │
//! │                                   LastGood (watch channel)   │
//! │                                            │                 │
//! └────────────────────────────────────────────┼─────────────────┘
//!                                              ▼
//!                                     SnapshotPresenter(s)
//! ```
//!
//! # Guarantees
//!
//! - At most one pass in flight. A tick whose deadline passes while a pass is
//!   still running is dropped, not queued.
//! - Only complete graphs are published. A failed, timed-out or empty fetch
//!   leaves the previous graph in place.
//! - Presenters read the last published graph at any time, including while a
//!   fetch is blocked on the network.

use chrono::{DateTime, Utc};
use meshview_env::MeshContext;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::proximity::ProximityGraphBuilder;
use crate::snapshot::{Graph, GraphStats};
use crate::source::PositionSource;

/// Timing and sizing knobs for the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSettings {
    /// Time between tick deadlines (default: 10s)
    pub interval: Duration,

    /// Upper bound on one fetch (default: 8s)
    pub fetch_timeout: Duration,

    /// Snapshot size cap (default: 300)
    pub max_satellites: usize,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(8),
            max_satellites: 300,
        }
    }
}

/// Why a pass did not replace the published graph.
#[derive(Debug, Clone, PartialEq)]
pub enum RetainReason {
    /// The source reported a whole-batch failure
    SourceUnavailable(String),

    /// The fetch exceeded `fetch_timeout` and was abandoned
    TimedOut,

    /// The source returned no positions
    EmptySnapshot,
}

/// Result of one pipeline pass.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    Published(GraphStats),
    Retained(RetainReason),
}

impl PassOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, PassOutcome::Published(_))
    }
}

/// Counters kept across passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoopStats {
    pub passes: u64,
    pub published: u64,
    pub source_failures: u64,
    pub timeouts: u64,
    pub empty: u64,
    pub ticks_dropped: u64,
    pub truncated: u64,
}

impl LoopStats {
    fn record(&mut self, outcome: &PassOutcome) {
        self.passes += 1;
        match outcome {
            PassOutcome::Published(_) => self.published += 1,
            PassOutcome::Retained(RetainReason::SourceUnavailable(_)) => self.source_failures += 1,
            PassOutcome::Retained(RetainReason::TimedOut) => self.timeouts += 1,
            PassOutcome::Retained(RetainReason::EmptySnapshot) => self.empty += 1,
        }
    }
}

/// Last successfully built graph, shared with presenters.
#[derive(Debug, Clone)]
pub struct LastGood {
    sender: Arc<watch::Sender<Option<Arc<Graph>>>>,
}

impl LastGood {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Replaces the published graph and notifies subscribers.
    pub fn publish(&self, graph: Graph) {
        self.sender.send_replace(Some(Arc::new(graph)));
    }

    /// The graph presenters currently see.
    pub fn current(&self) -> Option<Arc<Graph>> {
        self.sender.borrow().clone()
    }

    /// Receiver that wakes on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Graph>>> {
        self.sender.subscribe()
    }
}

impl Default for LastGood {
    fn default() -> Self {
        Self::new()
    }
}

/// The refresh loop.
///
/// Generic over the context and source so the same loop runs against tokio
/// and CelesTrak in production, or a virtual clock and scripted source in
/// simulation.
pub struct RefreshLoop<Ctx, Src>
where
    Ctx: MeshContext,
    Src: PositionSource,
{
    context: Arc<Ctx>,
    source: Arc<Src>,
    builder: ProximityGraphBuilder,
    settings: RefreshSettings,
    last_good: LastGood,
    stats: LoopStats,
}

impl<Ctx, Src> RefreshLoop<Ctx, Src>
where
    Ctx: MeshContext,
    Src: PositionSource,
{
    pub fn new(
        context: Arc<Ctx>,
        source: Arc<Src>,
        builder: ProximityGraphBuilder,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            context,
            source,
            builder,
            settings,
            last_good: LastGood::new(),
            stats: LoopStats::default(),
        }
    }

    /// Handle to the last-good cache, for presenters.
    pub fn last_good(&self) -> LastGood {
        self.last_good.clone()
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// Runs one pipeline pass for `instant`.
    pub async fn run_pass(&mut self, instant: DateTime<Utc>) -> PassOutcome {
        let fetch = self.source.fetch(instant);
        let fetched = self.context.timeout(self.settings.fetch_timeout, fetch).await;

        let outcome = match fetched {
            Err(_) => {
                warn!(
                    source = self.source.label(),
                    timeout_ms = self.settings.fetch_timeout.as_millis() as u64,
                    "Fetch timed out, keeping previous graph"
                );
                PassOutcome::Retained(RetainReason::TimedOut)
            }
            Ok(Err(e)) => {
                warn!(source = self.source.label(), "Error fetching positions: {}", e);
                PassOutcome::Retained(RetainReason::SourceUnavailable(e.to_string()))
            }
            Ok(Ok(mut snapshot)) => {
                let removed = snapshot.truncate_to(self.settings.max_satellites);
                if removed > 0 {
                    debug!(removed, cap = self.settings.max_satellites, "snapshot truncated");
                    self.stats.truncated += removed as u64;
                }

                let graph = self.builder.build(snapshot);
                if graph.snapshot().is_empty() {
                    warn!(source = self.source.label(), "Source returned no positions, keeping previous graph");
                    PassOutcome::Retained(RetainReason::EmptySnapshot)
                } else {
                    let stats = graph.stats();
                    self.last_good.publish(graph);
                    PassOutcome::Published(stats)
                }
            }
        };

        self.stats.record(&outcome);
        outcome
    }

    /// Runs passes on the interval until `shutdown` turns true or its sender drops.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> LoopStats {
        let interval = self.settings.interval;
        let start = self.context.now();
        let mut tick: u32 = 0;

        info!(
            interval_ms = interval.as_millis() as u64,
            metric = %self.builder.metric(),
            threshold = %self.builder.threshold(),
            "Refresh loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let deadline = start + interval * tick;
            let now = self.context.now();
            if deadline > now {
                tokio::select! {
                    _ = self.context.sleep(deadline - now) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }
            }

            let (_, next) = self.tick_pass(start, tick).await;
            tick = next;
        }

        info!(passes = self.stats.passes, published = self.stats.published, "Refresh loop stopped");
        self.stats.clone()
    }

    /// Runs the passes of the first `ticks` tick deadlines, without a shutdown signal.
    ///
    /// Dropped ticks are skipped exactly as in [`RefreshLoop::run`]. Returns the
    /// tick index and outcome of every pass that ran.
    pub async fn run_ticks(&mut self, ticks: u32) -> Vec<(u32, PassOutcome)> {
        let start = self.context.now();
        let mut outcomes = Vec::new();
        let mut tick = 0;

        while tick < ticks {
            let deadline = start + self.settings.interval * tick;
            let now = self.context.now();
            if deadline > now {
                self.context.sleep(deadline - now).await;
            }

            let (outcome, next) = self.tick_pass(start, tick).await;
            outcomes.push((tick, outcome));
            tick = next;
        }
        outcomes
    }

    /// One pass for `tick`, followed by dropped-tick accounting.
    async fn tick_pass(&mut self, start: Duration, tick: u32) -> (PassOutcome, u32) {
        let instant = self.context.utc_now();
        let outcome = self.run_pass(instant).await;
        debug!(tick, ?outcome, "pass complete");

        let elapsed = self.context.now().saturating_sub(start);
        let next = next_tick(elapsed, self.settings.interval, tick);
        let dropped = next - tick - 1;
        if dropped > 0 {
            warn!(dropped, "Pass overran the interval, skipping ticks");
            self.stats.ticks_dropped += dropped as u64;
        }
        (outcome, next)
    }
}

/// First tick index whose deadline is not already behind `elapsed`.
///
/// A deadline equal to `elapsed` is still due and runs immediately.
fn next_tick(elapsed: Duration, interval: Duration, current: u32) -> u32 {
    let interval_ns = interval.as_nanos().max(1);
    let due = elapsed.as_nanos().div_ceil(interval_ns);
    let due = u32::try_from(due).unwrap_or(u32::MAX);
    due.max(current.saturating_add(1))
}
