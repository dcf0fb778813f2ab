//! Scripted position source for deterministic fault injection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meshview_core::{PositionSource, Snapshot, SourceError};
use meshview_env::MeshContext;
use rand::seq::index::sample;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::constellation::WalkerShell;
use crate::context::SimContext;

/// What the feed does on one fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedBehavior {
    /// Every satellite of the shell
    Healthy,

    /// Whole-batch failure
    Outage,

    /// Succeeds with no positions
    Empty,

    /// Healthy, after consuming this much virtual time
    Slow(Duration),

    /// Healthy minus `k` entries dropped as malformed
    Corrupt(usize),
}

/// Serves a constellation through a per-fetch script.
///
/// Fetch `n` follows `script[n]`; fetches past the end of the script are
/// healthy.
pub struct ScriptedSource {
    context: Arc<SimContext>,
    shell: WalkerShell,
    script: Vec<FeedBehavior>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(context: Arc<SimContext>, shell: WalkerShell, script: Vec<FeedBehavior>) -> Self {
        Self {
            context,
            shell,
            script,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Number of fetches served so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Behavior of fetch number `n` (0-based).
    pub fn behavior(&self, n: usize) -> FeedBehavior {
        self.script.get(n).cloned().unwrap_or(FeedBehavior::Healthy)
    }
}

#[async_trait]
impl PositionSource for ScriptedSource {
    async fn fetch(&self, instant: DateTime<Utc>) -> Result<Snapshot, SourceError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior(n);
        debug!(fetch = n, ?behavior, "scripted fetch");

        match behavior {
            FeedBehavior::Healthy => Ok(Snapshot::new(instant, self.shell.positions(instant))),
            FeedBehavior::Outage => Err(SourceError::Network("scripted outage".to_string())),
            FeedBehavior::Empty => Ok(Snapshot::empty(instant)),
            FeedBehavior::Slow(delay) => {
                self.context.sleep(delay).await;
                Ok(Snapshot::new(instant, self.shell.positions(instant)))
            }
            FeedBehavior::Corrupt(k) => {
                let mut positions = self.shell.positions(instant);
                let k = k.min(positions.len());
                let mut dropped = self
                    .context
                    .with_rng(|rng| sample(rng, positions.len(), k).into_vec());
                dropped.sort_unstable_by(|a, b| b.cmp(a));
                for index in dropped {
                    positions.remove(index);
                }
                Ok(Snapshot::new(instant, positions).with_skipped(k))
            }
        }
    }

    fn label(&self) -> &str {
        "scripted"
    }
}
