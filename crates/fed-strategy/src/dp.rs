// SPDX-License-Identifier: MIT OR Apache-2.0
//! Server-side differential privacy with fixed-norm clipping.
//!
//! Wraps an inner strategy: per-client updates are clipped to a fixed L2
//! norm before the inner aggregation runs, and isotropic Gaussian noise is
//! added to the aggregated parameters afterwards.

use crate::codec::{parameters_to_vecs, vecs_to_parameters};
use crate::{
    ClientManager, ConfigurationError, EvaluateIns, EvaluateRes, FailureInfo, FitIns, FitRes,
    MetricsMap, Strategy,
};
use fed_task::Parameters;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::sync::Mutex;
use tracing::{info, warn};

/// L2 norm over a multi-tensor update.
#[must_use]
pub fn l2_norm(update: &[Vec<f32>]) -> f64 {
    update
        .iter()
        .flat_map(|t| t.iter())
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt()
}

/// Clip `update` in place so its L2 norm is at most `clipping_norm`.
///
/// Every element is scaled by `min(1, clipping_norm / ‖update‖₂)`; the
/// applied scaling factor is returned.
pub fn clip_l2_norm(update: &mut [Vec<f32>], clipping_norm: f64) -> f64 {
    let norm = l2_norm(update);
    let factor = if norm > clipping_norm {
        clipping_norm / norm
    } else {
        1.0
    };
    if factor < 1.0 {
        for tensor in update.iter_mut() {
            for v in tensor.iter_mut() {
                *v = (f64::from(*v) * factor) as f32;
            }
        }
    }
    factor
}

/// A [`Strategy`] wrapper adding server-side fixed clipping and Gaussian
/// noise around an inner aggregation.
///
/// On `aggregate_fit` each client's update `Δᵢ = clientᵢ − current` is
/// clipped to `clipping_norm`, the sanitized parameters `current + Δᵢ` are
/// handed to the inner strategy, and noise with standard deviation
/// `noise_multiplier · clipping_norm / num_sampled_clients` is added to
/// the aggregate. Configure/evaluate calls delegate unchanged.
pub struct DpServerFixedClipping<S> {
    inner: S,
    noise_multiplier: f64,
    clipping_norm: f64,
    num_sampled_clients: u64,
    current_params: Mutex<Option<Vec<Vec<f32>>>>,
    rng: Mutex<StdRng>,
}

impl<S: Strategy> DpServerFixedClipping<S> {
    /// Wrap `inner` with fixed clipping and Gaussian noise.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] unless `noise_multiplier >= 0`,
    /// `clipping_norm > 0`, and `num_sampled_clients > 0`.
    pub fn new(
        inner: S,
        noise_multiplier: f64,
        clipping_norm: f64,
        num_sampled_clients: u64,
    ) -> Result<Self, ConfigurationError> {
        if !(noise_multiplier >= 0.0) {
            return Err(ConfigurationError::new(
                "noise_multiplier must be non-negative",
            ));
        }
        if !(clipping_norm > 0.0) {
            return Err(ConfigurationError::new("clipping_norm must be positive"));
        }
        if num_sampled_clients == 0 {
            return Err(ConfigurationError::new(
                "num_sampled_clients must be positive",
            ));
        }
        Ok(Self {
            inner,
            noise_multiplier,
            clipping_norm,
            num_sampled_clients,
            current_params: Mutex::new(None),
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Use a fixed seed for the noise RNG.
    #[must_use]
    pub fn with_noise_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    fn noise_stddev(&self) -> f64 {
        self.noise_multiplier * self.clipping_norm / self.num_sampled_clients as f64
    }

    fn add_noise(&self, params: &mut [Vec<f32>]) {
        let stddev = self.noise_stddev();
        if stddev == 0.0 {
            return;
        }
        let normal = Normal::new(0.0, stddev).expect("stddev is finite and non-negative");
        let mut rng = self.rng.lock().expect("noise rng lock poisoned");
        for tensor in params.iter_mut() {
            for v in tensor.iter_mut() {
                *v = (f64::from(*v) + normal.sample(&mut *rng)) as f32;
            }
        }
    }
}

impl<S: Strategy> Strategy for DpServerFixedClipping<S> {
    fn initialize_parameters(&self, client_manager: &dyn ClientManager) -> Option<Parameters> {
        self.inner.initialize_parameters(client_manager)
    }

    fn configure_fit(
        &self,
        round: u64,
        parameters: &Parameters,
        client_manager: &dyn ClientManager,
    ) -> Vec<(u64, FitIns)> {
        // Remember the round's global parameters: clipping is relative to
        // them at aggregate time.
        match parameters_to_vecs(parameters) {
            Ok(vecs) => {
                *self
                    .current_params
                    .lock()
                    .expect("current params lock poisoned") = Some(vecs);
            }
            Err(e) => {
                warn!(target: "fed.strategy", round, error = %e, "global parameters undecodable");
            }
        }
        self.inner.configure_fit(round, parameters, client_manager)
    }

    fn aggregate_fit(
        &self,
        round: u64,
        results: Vec<(u64, FitRes)>,
        failures: Vec<FailureInfo>,
    ) -> (Option<Parameters>, MetricsMap) {
        let current = self
            .current_params
            .lock()
            .expect("current params lock poisoned")
            .clone();
        let Some(current) = current else {
            warn!(
                target: "fed.strategy",
                round,
                "no recorded global parameters, aggregating without clipping"
            );
            return self.inner.aggregate_fit(round, results, failures);
        };

        let mut sanitized = Vec::with_capacity(results.len());
        let mut decode_failures = failures;
        for (node_id, mut res) in results {
            let client = match parameters_to_vecs(&res.parameters) {
                Ok(v) if shapes_match(&v, &current) => v,
                Ok(_) => {
                    decode_failures.push(FailureInfo {
                        node_id,
                        reason: "result shape differs from global parameters".into(),
                    });
                    continue;
                }
                Err(e) => {
                    decode_failures.push(FailureInfo {
                        node_id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let mut delta: Vec<Vec<f32>> = client
                .iter()
                .zip(&current)
                .map(|(c, g)| c.iter().zip(g).map(|(c, g)| c - g).collect())
                .collect();
            let factor = clip_l2_norm(&mut delta, self.clipping_norm);
            info!(
                target: "fed.strategy",
                round,
                node_id,
                factor,
                "clipped client update"
            );

            let restored: Vec<Vec<f32>> = current
                .iter()
                .zip(&delta)
                .map(|(g, d)| g.iter().zip(d).map(|(g, d)| g + d).collect())
                .collect();
            res.parameters = vecs_to_parameters(&restored);
            sanitized.push((node_id, res));
        }

        let (aggregated, metrics) = self.inner.aggregate_fit(round, sanitized, decode_failures);
        let aggregated = aggregated.and_then(|params| match parameters_to_vecs(&params) {
            Ok(mut vecs) => {
                self.add_noise(&mut vecs);
                Some(vecs_to_parameters(&vecs))
            }
            Err(e) => {
                warn!(target: "fed.strategy", round, error = %e, "aggregate undecodable, dropping");
                None
            }
        });
        (aggregated, metrics)
    }

    fn configure_evaluate(
        &self,
        round: u64,
        parameters: &Parameters,
        client_manager: &dyn ClientManager,
    ) -> Vec<(u64, EvaluateIns)> {
        self.inner
            .configure_evaluate(round, parameters, client_manager)
    }

    fn aggregate_evaluate(
        &self,
        round: u64,
        results: Vec<(u64, EvaluateRes)>,
        failures: Vec<FailureInfo>,
    ) -> (Option<f64>, MetricsMap) {
        self.inner.aggregate_evaluate(round, results, failures)
    }

    fn evaluate(&self, round: u64, parameters: &Parameters) -> Option<(f64, MetricsMap)> {
        self.inner.evaluate(round, parameters)
    }
}

fn shapes_match(a: &[Vec<f32>], b: &[Vec<f32>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.len() == y.len())
}
