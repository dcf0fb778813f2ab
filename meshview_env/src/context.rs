//! Core environment context trait for MeshView runtimes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

use crate::EnvError;

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the refresh pipeline can run
/// in both production (tokio) and simulation (virtual clock) environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and the system clock
/// - **Simulation**: `SimContext` (in `meshview_sim`) - manually advanced clock
#[async_trait]
pub trait MeshContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    ///
    /// Used for tick deadlines. In simulation, this is the virtual clock.
    fn now(&self) -> Duration;

    /// Returns the wall-clock instant used to stamp snapshots.
    fn utc_now(&self) -> DateTime<Utc>;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);

    /// Runs `future` under a deadline.
    ///
    /// Returns `EnvError::Timeout` when the future did not finish within
    /// `limit`; its result is discarded in that case.
    async fn timeout<F, T>(&self, limit: Duration, future: F) -> Result<T, EnvError>
    where
        F: Future<Output = T> + Send,
        T: Send;

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's seed (0 in production).
    fn seed(&self) -> u64;
}
