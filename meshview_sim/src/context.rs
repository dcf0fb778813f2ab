//! Simulation context implementing MeshContext for deterministic testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meshview_env::{EnvError, MeshContext};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Virtual time 0 maps to 2024-01-01 00:00:00 UTC.
pub const SIM_EPOCH_SECS: i64 = 1_704_067_200;

/// Simulation context backed by deterministic time and RNG.
///
/// This implements `MeshContext` using:
/// - A virtual clock that only moves when advanced or slept on
/// - A seeded ChaCha8 RNG shared by everything that needs randomness
/// - A timeout that measures the virtual time the future consumed
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,

    /// Deterministic RNG
    rng: Arc<Mutex<ChaCha8Rng>>,

    /// Wall-clock instant of virtual time 0
    epoch: DateTime<Utc>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            epoch: DateTime::from_timestamp(SIM_EPOCH_SECS, 0).unwrap_or_default(),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    fn clock(&self) -> MutexGuard<'_, u64> {
        self.virtual_time_ns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        *self.clock() += duration.as_nanos() as u64;
    }

    /// Moves virtual time forward to `target`; never moves it back.
    pub fn advance_to(&self, target: Duration) {
        let mut time = self.clock();
        *time = (*time).max(target.as_nanos() as u64);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.clock()
    }

    /// Wall-clock instant of virtual time 0.
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Runs `f` with exclusive access to the seeded RNG.
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut ChaCha8Rng) -> R) -> R {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            rng: Arc::clone(&self.rng),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl MeshContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn utc_now(&self) -> DateTime<Utc> {
        let offset = chrono::Duration::nanoseconds(self.time_ns() as i64);
        self.epoch + offset
    }

    async fn sleep(&self, duration: Duration) {
        self.advance_time(duration);
    }

    async fn timeout<F, T>(&self, limit: Duration, future: F) -> Result<T, EnvError>
    where
        F: Future<Output = T> + Send,
        T: Send,
    {
        let started = self.now();
        let value = future.await;

        // The future ran to completion in virtual time; if it overran, rewind
        // the clock to the moment it would have been abandoned.
        if self.now().saturating_sub(started) > limit {
            *self.clock() = (started + limit).as_nanos() as u64;
            return Err(EnvError::timeout(limit));
        }
        Ok(value)
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _name = name.to_string();
        tokio::spawn(future);
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
