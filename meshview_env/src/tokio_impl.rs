//! Production implementation of MeshContext using Tokio.

use crate::{EnvError, MeshContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Production context backed by Tokio and the system clock.
///
/// Monotonic time comes from `tokio::time::Instant`, so a paused Tokio
/// runtime (`start_paused = true`) drives it deterministically in tests.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MeshContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn timeout<F, T>(&self, limit: Duration, future: F) -> Result<T, EnvError>
    where
        F: Future<Output = T> + Send,
        T: Send,
    {
        tokio::time::timeout(limit, future)
            .await
            .map_err(|_| EnvError::timeout(limit))
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.to_string();
        tokio::spawn(async move {
            debug!(task = %name, "task started");
            future.await;
            debug!(task = %name, "task finished");
        });
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}
