// SPDX-License-Identifier: MIT OR Apache-2.0
//! fed-strategy
//!
//! The pluggable aggregation layer: the per-round configure/aggregate
//! [`Strategy`] protocol, the [`FedAvg`] reference implementation, and a
//! server-side differential-privacy wrapper with fixed-norm clipping and
//! Gaussian noise.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Tensor blob codec (little-endian `f32`).
pub mod codec;
/// Strategy payloads ↔ record-set encoding.
pub mod compat;
/// Differential-privacy fixed-clipping wrapper.
pub mod dp;
/// Weighted-average reference strategy.
pub mod fedavg;

pub use dp::DpServerFixedClipping;
pub use fedavg::FedAvg;

use fed_record::{ConfigValue, MetricsValue};
use fed_task::Parameters;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

/// Metrics returned from an aggregation step.
pub type MetricsMap = BTreeMap<String, MetricsValue>;

/// Errors raised while decoding or aggregating strategy payloads.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    /// A tensor blob could not be interpreted.
    #[error("invalid tensor: {reason}")]
    InvalidTensor {
        /// What was wrong with the blob.
        reason: String,
    },

    /// A record set is missing a field the payload contract requires.
    #[error("malformed payload: {reason}")]
    MalformedPayload {
        /// What was missing or mistyped.
        reason: String,
    },
}

/// A strategy or wrapper was constructed with invalid settings.
///
/// Fatal: engine startup aborts on this error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid strategy configuration: {reason}")]
pub struct ConfigurationError {
    /// What was rejected.
    pub reason: String,
}

impl ConfigurationError {
    /// Build a configuration error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Fit instructions sent to one selected node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitIns {
    /// Global parameters to train from.
    pub parameters: Parameters,
    /// Per-round configuration values.
    pub config: BTreeMap<String, ConfigValue>,
}

/// Fit results returned by one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRes {
    /// Locally updated parameters.
    pub parameters: Parameters,
    /// Number of training examples used.
    pub num_examples: u64,
    /// Training metrics.
    pub metrics: MetricsMap,
}

/// Evaluate instructions sent to one selected node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateIns {
    /// Global parameters to evaluate.
    pub parameters: Parameters,
    /// Per-round configuration values.
    pub config: BTreeMap<String, ConfigValue>,
}

/// Evaluate results returned by one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateRes {
    /// Loss on the local partition.
    pub loss: f64,
    /// Number of evaluation examples used.
    pub num_examples: u64,
    /// Evaluation metrics.
    pub metrics: MetricsMap,
}

/// A client failure handed to the strategy's aggregate step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Node whose task failed.
    pub node_id: u64,
    /// Human-readable reason.
    pub reason: String,
}

/// Tracks available nodes and samples them for a round.
pub trait ClientManager: Send + Sync {
    /// Number of nodes currently registered.
    fn num_available(&self) -> usize;

    /// Sample up to `n` distinct node ids.
    fn sample(&self, n: usize) -> Vec<u64>;
}

/// The reference [`ClientManager`]: a registered node list with seeded
/// uniform sampling.
pub struct SimpleClientManager {
    nodes: Mutex<Vec<u64>>,
    rng: Mutex<StdRng>,
}

impl SimpleClientManager {
    /// Create an empty manager with the given sampling seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Register a node id; duplicates are ignored.
    pub fn register(&self, node_id: u64) {
        let mut nodes = self.nodes.lock().expect("node list lock poisoned");
        if !nodes.contains(&node_id) {
            nodes.push(node_id);
        }
    }
}

impl ClientManager for SimpleClientManager {
    fn num_available(&self) -> usize {
        self.nodes.lock().expect("node list lock poisoned").len()
    }

    fn sample(&self, n: usize) -> Vec<u64> {
        let nodes = self.nodes.lock().expect("node list lock poisoned");
        let mut rng = self.rng.lock().expect("rng lock poisoned");
        let mut sampled: Vec<u64> = nodes.choose_multiple(&mut *rng, n).copied().collect();
        sampled.sort_unstable();
        sampled
    }
}

/// The pluggable per-round policy: client selection, instruction
/// construction, and result aggregation.
pub trait Strategy: Send + Sync {
    /// Provide initial global parameters, if the strategy has them.
    ///
    /// Called once, before the first round.
    fn initialize_parameters(&self, client_manager: &dyn ClientManager) -> Option<Parameters>;

    /// Select nodes and build their fit instructions for `round`.
    fn configure_fit(
        &self,
        round: u64,
        parameters: &Parameters,
        client_manager: &dyn ClientManager,
    ) -> Vec<(u64, FitIns)>;

    /// Fold fit results into new global parameters.
    ///
    /// `None` parameters mean the round produced no global update; the
    /// failures list is the strategy's to interpret.
    fn aggregate_fit(
        &self,
        round: u64,
        results: Vec<(u64, FitRes)>,
        failures: Vec<FailureInfo>,
    ) -> (Option<Parameters>, MetricsMap);

    /// Select nodes and build their evaluate instructions for `round`.
    fn configure_evaluate(
        &self,
        round: u64,
        parameters: &Parameters,
        client_manager: &dyn ClientManager,
    ) -> Vec<(u64, EvaluateIns)>;

    /// Fold evaluate results into an aggregated loss.
    fn aggregate_evaluate(
        &self,
        round: u64,
        results: Vec<(u64, EvaluateRes)>,
        failures: Vec<FailureInfo>,
    ) -> (Option<f64>, MetricsMap);

    /// Optional server-side evaluation of the current global parameters.
    fn evaluate(&self, round: u64, parameters: &Parameters) -> Option<(f64, MetricsMap)>;
}
