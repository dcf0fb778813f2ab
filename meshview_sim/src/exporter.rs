//! JSON exporter for simulation runs.
//!
//! One frame per executed tick: what the presenters would be showing after
//! that tick's pass, plus the pass outcome.

use meshview_core::{Graph, LoopStats, PassOutcome, RetainReason};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    pub tick: u32,

    /// Virtual time at the end of the pass, in seconds
    pub time_sec: f64,

    /// `published`, `source_unavailable`, `timed_out` or `empty_snapshot`
    pub outcome: String,

    /// True when the visible graph is older than this tick
    pub stale: bool,

    pub positions: Vec<FramePosition>,
    pub edges: Vec<(usize, usize)>,
}

/// Position as exported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramePosition {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub alt_km: f64,
}

impl SimFrame {
    /// Frame for a pass, showing `visible` (the last good graph, if any).
    pub fn new(tick: u32, time_sec: f64, outcome: &PassOutcome, visible: Option<&Graph>) -> Self {
        let (positions, edges) = match visible {
            Some(graph) => (
                graph
                    .positions()
                    .iter()
                    .map(|p| FramePosition {
                        name: p.name.clone(),
                        lat: p.latitude,
                        lon: p.longitude,
                        alt_km: p.altitude_km,
                    })
                    .collect(),
                graph.edge_pairs(),
            ),
            None => (Vec::new(), Vec::new()),
        };

        Self {
            tick,
            time_sec,
            outcome: outcome_label(outcome).to_string(),
            stale: !outcome.is_published() && visible.is_some(),
            positions,
            edges,
        }
    }
}

pub fn outcome_label(outcome: &PassOutcome) -> &'static str {
    match outcome {
        PassOutcome::Published(_) => "published",
        PassOutcome::Retained(RetainReason::SourceUnavailable(_)) => "source_unavailable",
        PassOutcome::Retained(RetainReason::TimedOut) => "timed_out",
        PassOutcome::Retained(RetainReason::EmptySnapshot) => "empty_snapshot",
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<LoopStats>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            stats: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, stats: LoopStats) {
        self.passed = passed;
        self.stats = Some(stats);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
