// SPDX-License-Identifier: MIT OR Apache-2.0
//! Weighted-average reference strategy.

use crate::codec::{parameters_to_vecs, vecs_to_parameters};
use crate::{
    ClientManager, EvaluateIns, EvaluateRes, FailureInfo, FitIns, FitRes, MetricsMap, Strategy,
};
use fed_record::MetricsValue;
use fed_task::Parameters;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Federated averaging: samples a fraction of available nodes each round
/// and folds their results into an example-weighted mean.
pub struct FedAvg {
    fraction_fit: f64,
    fraction_evaluate: f64,
    min_fit_nodes: usize,
    min_evaluate_nodes: usize,
    initial_parameters: Option<Parameters>,
}

impl FedAvg {
    /// Create a strategy that samples every available node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fraction_fit: 1.0,
            fraction_evaluate: 1.0,
            min_fit_nodes: 1,
            min_evaluate_nodes: 1,
            initial_parameters: None,
        }
    }

    /// Fraction of available nodes sampled for fit rounds.
    #[must_use]
    pub fn with_fraction_fit(mut self, fraction: f64) -> Self {
        self.fraction_fit = fraction;
        self
    }

    /// Fraction of available nodes sampled for evaluate rounds.
    #[must_use]
    pub fn with_fraction_evaluate(mut self, fraction: f64) -> Self {
        self.fraction_evaluate = fraction;
        self
    }

    /// Lower bound on nodes sampled for fit rounds.
    #[must_use]
    pub fn with_min_fit_nodes(mut self, min: usize) -> Self {
        self.min_fit_nodes = min;
        self
    }

    /// Lower bound on nodes sampled for evaluate rounds.
    #[must_use]
    pub fn with_min_evaluate_nodes(mut self, min: usize) -> Self {
        self.min_evaluate_nodes = min;
        self
    }

    /// Initial global parameters handed out before the first round.
    #[must_use]
    pub fn with_initial_parameters(mut self, parameters: Parameters) -> Self {
        self.initial_parameters = Some(parameters);
        self
    }

    fn sample_size(&self, available: usize, fraction: f64, min: usize) -> usize {
        let by_fraction = (available as f64 * fraction).floor() as usize;
        by_fraction.max(min).min(available)
    }
}

impl Default for FedAvg {
    fn default() -> Self {
        Self::new()
    }
}

/// Example-weighted elementwise mean over decoded tensor vectors.
///
/// Entries whose tensors fail to decode or whose layer count disagrees
/// with the first result are skipped with a warning.
fn weighted_average(results: &[(u64, FitRes)]) -> Option<Vec<Vec<f32>>> {
    let mut accumulated: Option<Vec<Vec<f64>>> = None;
    let mut total_weight = 0.0f64;

    for (node_id, res) in results {
        let vecs = match parameters_to_vecs(&res.parameters) {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "fed.strategy", node_id, error = %e, "skipping undecodable result");
                continue;
            }
        };
        let weight = res.num_examples as f64;
        match &mut accumulated {
            None => {
                accumulated = Some(
                    vecs.iter()
                        .map(|t| t.iter().map(|v| f64::from(*v) * weight).collect())
                        .collect(),
                );
            }
            Some(acc) => {
                if acc.len() != vecs.len()
                    || acc.iter().zip(&vecs).any(|(a, b)| a.len() != b.len())
                {
                    warn!(target: "fed.strategy", node_id, "skipping shape-mismatched result");
                    continue;
                }
                for (acc_t, t) in acc.iter_mut().zip(&vecs) {
                    for (a, v) in acc_t.iter_mut().zip(t) {
                        *a += f64::from(*v) * weight;
                    }
                }
            }
        }
        total_weight += weight;
    }

    let acc = accumulated?;
    if total_weight <= 0.0 {
        return None;
    }
    Some(
        acc.into_iter()
            .map(|t| t.into_iter().map(|v| (v / total_weight) as f32).collect())
            .collect(),
    )
}

impl Strategy for FedAvg {
    fn initialize_parameters(&self, _client_manager: &dyn ClientManager) -> Option<Parameters> {
        self.initial_parameters.clone()
    }

    fn configure_fit(
        &self,
        round: u64,
        parameters: &Parameters,
        client_manager: &dyn ClientManager,
    ) -> Vec<(u64, FitIns)> {
        let n = self.sample_size(
            client_manager.num_available(),
            self.fraction_fit,
            self.min_fit_nodes,
        );
        let sampled = client_manager.sample(n);
        info!(target: "fed.strategy", round, sampled = sampled.len(), "configured fit");
        sampled
            .into_iter()
            .map(|node_id| {
                (
                    node_id,
                    FitIns {
                        parameters: parameters.clone(),
                        config: BTreeMap::new(),
                    },
                )
            })
            .collect()
    }

    fn aggregate_fit(
        &self,
        round: u64,
        results: Vec<(u64, FitRes)>,
        failures: Vec<FailureInfo>,
    ) -> (Option<Parameters>, MetricsMap) {
        if !failures.is_empty() {
            warn!(
                target: "fed.strategy",
                round,
                failures = failures.len(),
                "aggregating with client failures"
            );
        }
        if results.is_empty() {
            return (None, MetricsMap::new());
        }

        let total_examples: u64 = results.iter().map(|(_, r)| r.num_examples).sum();
        let aggregated = weighted_average(&results).map(|vecs| vecs_to_parameters(&vecs));

        let mut metrics = MetricsMap::new();
        metrics.insert(
            "num_results".to_string(),
            MetricsValue::Int(results.len() as i64),
        );
        metrics.insert(
            "num_examples_total".to_string(),
            MetricsValue::Int(total_examples as i64),
        );
        (aggregated, metrics)
    }

    fn configure_evaluate(
        &self,
        round: u64,
        parameters: &Parameters,
        client_manager: &dyn ClientManager,
    ) -> Vec<(u64, EvaluateIns)> {
        let n = self.sample_size(
            client_manager.num_available(),
            self.fraction_evaluate,
            self.min_evaluate_nodes,
        );
        let sampled = client_manager.sample(n);
        info!(target: "fed.strategy", round, sampled = sampled.len(), "configured evaluate");
        sampled
            .into_iter()
            .map(|node_id| {
                (
                    node_id,
                    EvaluateIns {
                        parameters: parameters.clone(),
                        config: BTreeMap::new(),
                    },
                )
            })
            .collect()
    }

    fn aggregate_evaluate(
        &self,
        round: u64,
        results: Vec<(u64, EvaluateRes)>,
        failures: Vec<FailureInfo>,
    ) -> (Option<f64>, MetricsMap) {
        if !failures.is_empty() {
            warn!(
                target: "fed.strategy",
                round,
                failures = failures.len(),
                "aggregating evaluation with client failures"
            );
        }
        if results.is_empty() {
            return (None, MetricsMap::new());
        }
        let total: u64 = results.iter().map(|(_, r)| r.num_examples).sum();
        if total == 0 {
            return (None, MetricsMap::new());
        }
        let loss = results
            .iter()
            .map(|(_, r)| r.loss * r.num_examples as f64)
            .sum::<f64>()
            / total as f64;

        let mut metrics = MetricsMap::new();
        metrics.insert(
            "num_results".to_string(),
            MetricsValue::Int(results.len() as i64),
        );
        (Some(loss), metrics)
    }

    fn evaluate(&self, _round: u64, _parameters: &Parameters) -> Option<(f64, MetricsMap)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimpleClientManager;

    fn fit_res(vecs: &[Vec<f32>], num_examples: u64) -> FitRes {
        FitRes {
            parameters: vecs_to_parameters(vecs),
            num_examples,
            metrics: MetricsMap::new(),
        }
    }

    #[test]
    fn equal_weights_give_plain_mean() {
        let strategy = FedAvg::new();
        let results = vec![
            (1, fit_res(&[vec![0.0, 2.0]], 10)),
            (2, fit_res(&[vec![2.0, 4.0]], 10)),
        ];
        let (params, metrics) = strategy.aggregate_fit(1, results, vec![]);
        let vecs = parameters_to_vecs(&params.unwrap()).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 3.0]]);
        assert_eq!(metrics.get("num_results"), Some(&MetricsValue::Int(2)));
    }

    #[test]
    fn weighting_follows_example_counts() {
        let strategy = FedAvg::new();
        let results = vec![
            (1, fit_res(&[vec![0.0]], 30)),
            (2, fit_res(&[vec![4.0]], 10)),
        ];
        let (params, _) = strategy.aggregate_fit(1, results, vec![]);
        let vecs = parameters_to_vecs(&params.unwrap()).unwrap();
        assert!((vecs[0][0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn no_results_means_no_update() {
        let strategy = FedAvg::new();
        let (params, _) = strategy.aggregate_fit(
            1,
            vec![],
            vec![FailureInfo {
                node_id: 3,
                reason: "timeout".into(),
            }],
        );
        assert!(params.is_none());
    }

    #[test]
    fn configure_fit_respects_fraction_and_min() {
        let cm = SimpleClientManager::new(1);
        for id in 1..=10 {
            cm.register(id);
        }
        let strategy = FedAvg::new().with_fraction_fit(0.3).with_min_fit_nodes(2);
        let configured = strategy.configure_fit(1, &Parameters::default(), &cm);
        assert_eq!(configured.len(), 3);

        let strategy = FedAvg::new().with_fraction_fit(0.05).with_min_fit_nodes(2);
        let configured = strategy.configure_fit(1, &Parameters::default(), &cm);
        assert_eq!(configured.len(), 2);
    }

    #[test]
    fn evaluate_loss_is_example_weighted() {
        let strategy = FedAvg::new();
        let results = vec![
            (
                1,
                EvaluateRes {
                    loss: 1.0,
                    num_examples: 10,
                    metrics: MetricsMap::new(),
                },
            ),
            (
                2,
                EvaluateRes {
                    loss: 3.0,
                    num_examples: 30,
                    metrics: MetricsMap::new(),
                },
            ),
        ];
        let (loss, _) = strategy.aggregate_evaluate(1, results, vec![]);
        assert!((loss.unwrap() - 2.5).abs() < 1e-9);
    }
}
