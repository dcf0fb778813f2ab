//! MeshView Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the MeshView refresh
//! pipeline to run in both **Production** (tokio) and **Simulation** (virtual
//! clock) environments.
//!
//! # Core Concept
//!
//! Everything that makes a refresh pass non-deterministic goes through the
//! context:
//! - Time (`now()`, `utc_now()`, `sleep()`)
//! - Deadlines (`timeout()`)
//! - Background work (`spawn()`)
//!
//! # Example
//!
//! ```ignore
//! use meshview_env::{MeshContext, TokioContext};
//!
//! async fn refresh_loop<Ctx: MeshContext>(ctx: &Ctx) {
//!     loop {
//!         let instant = ctx.utc_now();
//!         run_pass(instant).await;
//!         ctx.sleep(Duration::from_secs(10)).await;
//!     }
//! }
//! ```

mod context;
mod error;
mod tokio_impl;

pub use context::MeshContext;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
