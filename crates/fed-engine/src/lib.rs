// SPDX-License-Identifier: MIT OR Apache-2.0
//! fed-engine
//!
//! The virtual client engine: a concurrent task-dispatch scheduler that
//! keeps per-node durable context across rounds, pulls instructions from
//! the state store, routes them through a bounded pool of isolated
//! executors running the client application, and writes results back.
//!
//! Responsibilities:
//! - expose the client-application surface (callable, mods, registry)
//! - size and run the actor pool
//! - couple store, context registry, pool, and strategy per round
//! - enforce message time-to-live and survive individual task failures

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Client-application callable, middleware mods, and the app registry.
pub mod app;
/// Cooperative shutdown signalling.
pub mod cancel;
/// Engine configuration and resource sizing.
pub mod config;
/// Atomic task counters.
pub mod metrics;
/// The bounded pool of isolated executors.
pub mod pool;
/// The strategy-driven round cycle.
pub mod round;
/// The pull/worker scheduler loops.
pub mod vce;

pub use app::{ClientApp, ClientAppCallable, ClientAppRegistry, Context, Mod};
pub use cancel::ShutdownSignal;
pub use config::{ConfigError, EngineConfig, Resources};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use pool::{ActorJob, ActorPool, JobHandle, PoolError};
pub use round::{RoundDriver, RoundOutcome};
pub use vce::VirtualClientEngine;

use fed_state::StateError;
use thiserror::Error;

/// Errors from engine construction and the round driver.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine configuration failed validation.
    #[error("invalid engine configuration")]
    Config(#[from] ConfigError),

    /// The configured client-application path is not registered.
    #[error("unknown client application: {path}")]
    UnknownApp {
        /// The path that was looked up.
        path: String,
    },

    /// The state store rejected an operation after bounded retries.
    #[error("state store operation failed")]
    Store(#[from] StateError),

    /// The bound partitioner cannot cover the configured node count.
    #[error("partitioner provides {partitions} partitions for {nodes} nodes")]
    PartitionShortfall {
        /// Partitions available.
        partitions: usize,
        /// Nodes configured.
        nodes: usize,
    },
}
