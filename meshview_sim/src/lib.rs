//! MeshView Deterministic Simulation Harness
//!
//! Runs the production refresh loop against a virtual clock and a scripted
//! feed, so every failure mode of the pipeline can be replayed from a seed.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances only through sleeps and tick deadlines
//! - **Feed**: Analytic Walker shells instead of live element sets
//! - **Randomness**: All entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │                                                             │
//! │  ┌──────────────┐   fetch   ┌───────────────────────────┐   │
//! │  │ RefreshLoop  │──────────►│ ScriptedSource            │   │
//! │  │ <SimContext> │           │  WalkerShell + script     │   │
//! │  └──────┬───────┘           │  (outage/slow/corrupt/..) │   │
//! │         │                   └───────────────────────────┘   │
//! │         ▼                                                   │
//! │    LastGood ──► SimFrame per tick ──► SimExport (JSON)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use meshview_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_ticks(12).run(ScenarioId::Outage).await;
//! assert!(result.passed);
//! ```

mod constellation;
mod context;
mod exporter;
mod runner;
mod source;
pub mod scenarios;

pub use constellation::WalkerShell;
pub use context::SimContext;
pub use exporter::{FramePosition, SimExport, SimFrame};
pub use runner::{ScenarioResult, ScenarioRunner, MIN_TICKS};
pub use source::{FeedBehavior, ScriptedSource};
