// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dirichlet-balanced label partitioning.

use crate::{PartitionError, PartitionSource, Partitioner};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Dirichlet, Distribution};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// How many full re-draws to attempt before giving up on
/// `min_partition_size`.
const MAX_SAMPLE_ATTEMPTS: usize = 10;

/// Concentration parameter: a scalar replicated over all partitions, or an
/// explicit per-partition vector.
#[derive(Debug, Clone, PartialEq)]
pub enum Alpha {
    /// One value, replicated `num_partitions` times.
    Scalar(f64),
    /// One value per partition.
    PerPartition(Vec<f64>),
}

impl From<f64> for Alpha {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<Vec<f64>> for Alpha {
    fn from(v: Vec<f64>) -> Self {
        Self::PerPartition(v)
    }
}

/// Partitions rows by sampling per-class Dirichlet proportions over a
/// label column.
///
/// For every class present in `partition_by`, a proportion vector is drawn
/// from `Dirichlet(alpha)` and the class's row indices are sliced
/// accordingly. Sampling repeats until every partition holds at least
/// `min_partition_size` rows. Given the same source, seed, alpha, and
/// flags the assignment is reproducible.
pub struct DirichletPartitioner {
    source: Arc<dyn PartitionSource>,
    num_partitions: usize,
    alpha: Vec<f64>,
    partition_by: String,
    min_partition_size: usize,
    self_balancing: bool,
    shuffle: bool,
    seed: u64,
    materialized: Mutex<Option<Arc<Vec<Vec<usize>>>>>,
}

impl DirichletPartitioner {
    /// Bind a partitioner to a source.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionError::InvalidConfig`] when `num_partitions < 2`,
    /// when an alpha value is not strictly positive, or when a
    /// per-partition alpha vector has the wrong length.
    pub fn new(
        source: Arc<dyn PartitionSource>,
        num_partitions: usize,
        alpha: impl Into<Alpha>,
        partition_by: impl Into<String>,
    ) -> Result<Self, PartitionError> {
        if num_partitions < 2 {
            return Err(PartitionError::InvalidConfig {
                reason: "dirichlet partitioning needs at least two partitions".into(),
            });
        }
        let alpha = match alpha.into() {
            Alpha::Scalar(v) => vec![v; num_partitions],
            Alpha::PerPartition(v) => {
                if v.len() != num_partitions {
                    return Err(PartitionError::InvalidConfig {
                        reason: format!(
                            "alpha vector has {} entries for {} partitions",
                            v.len(),
                            num_partitions
                        ),
                    });
                }
                v
            }
        };
        if alpha.iter().any(|a| !a.is_finite() || *a <= 0.0) {
            return Err(PartitionError::InvalidConfig {
                reason: "alpha values must be strictly positive".into(),
            });
        }
        Ok(Self {
            source,
            num_partitions,
            alpha,
            partition_by: partition_by.into(),
            min_partition_size: 10,
            self_balancing: false,
            shuffle: true,
            seed: 42,
            materialized: Mutex::new(None),
        })
    }

    /// Require every partition to hold at least `min` rows.
    #[must_use]
    pub fn with_min_partition_size(mut self, min: usize) -> Self {
        self.min_partition_size = min;
        self
    }

    /// Zero the proportion of partitions already over the average target
    /// size `N / P` before applying a class's draw.
    #[must_use]
    pub fn with_self_balancing(mut self, on: bool) -> Self {
        self.self_balancing = on;
        self
    }

    /// Shuffle within-partition index order after assignment.
    #[must_use]
    pub fn with_shuffle(mut self, on: bool) -> Self {
        self.shuffle = on;
        self
    }

    /// Seed for the partitioner's RNG.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn table(&self) -> Result<Arc<Vec<Vec<usize>>>, PartitionError> {
        let mut guard = self.materialized.lock().expect("partition lock poisoned");
        if let Some(table) = guard.as_ref() {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(self.sample_assignment()?);
        *guard = Some(Arc::clone(&table));
        Ok(table)
    }

    fn sample_assignment(&self) -> Result<Vec<Vec<usize>>, PartitionError> {
        let column =
            self.source
                .column(&self.partition_by)
                .ok_or_else(|| PartitionError::UnknownColumn {
                    column: self.partition_by.clone(),
                })?;

        // Group row indices by class, keyed deterministically.
        let mut classes: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (idx, label) in column.iter().enumerate() {
            classes.entry(label).or_default().push(idx);
        }

        let avg_size = self.source.num_rows() / self.num_partitions;
        let dirichlet =
            Dirichlet::new(self.alpha.as_slice()).map_err(|e| PartitionError::InvalidConfig {
            reason: format!("dirichlet rejected alpha: {e}"),
        })?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        'attempt: for attempt in 1..=MAX_SAMPLE_ATTEMPTS {
            let mut partitions: Vec<Vec<usize>> = vec![Vec::new(); self.num_partitions];

            for indices in classes.values() {
                let mut proportions: Vec<f64> = dirichlet.sample(&mut rng);

                if self.self_balancing {
                    for (p, partition) in partitions.iter().enumerate() {
                        if partition.len() >= avg_size {
                            proportions[p] = 0.0;
                        }
                    }
                    let total: f64 = proportions.iter().sum();
                    if total <= 0.0 {
                        // Every eligible partition was zeroed out; the
                        // draw carries no information, so retry it.
                        warn!(
                            target: "fed.partition",
                            attempt,
                            "all balanced proportions zero, re-drawing"
                        );
                        continue 'attempt;
                    }
                    for p in &mut proportions {
                        *p /= total;
                    }
                }

                split_by_proportions(indices, &proportions, &mut partitions);
            }

            if partitions
                .iter()
                .all(|p| p.len() >= self.min_partition_size)
            {
                if self.shuffle {
                    for partition in &mut partitions {
                        partition.shuffle(&mut rng);
                    }
                }
                return Ok(partitions);
            }
            warn!(
                target: "fed.partition",
                attempt,
                min = self.min_partition_size,
                "partition under minimum size, re-drawing"
            );
        }

        Err(PartitionError::MinPartitionSize {
            min_partition_size: self.min_partition_size,
            attempts: MAX_SAMPLE_ATTEMPTS,
        })
    }
}

/// Slice `indices` over the partitions by cumulative proportion.
fn split_by_proportions(indices: &[usize], proportions: &[f64], partitions: &mut [Vec<usize>]) {
    let n = indices.len();
    let mut cumulative = 0.0;
    let mut start = 0usize;
    for (p, proportion) in proportions.iter().enumerate() {
        cumulative += proportion;
        // The final boundary lands exactly on n so no index is dropped.
        let end = if p + 1 == proportions.len() {
            n
        } else {
            ((cumulative * n as f64).floor() as usize).min(n)
        };
        partitions[p].extend_from_slice(&indices[start..end]);
        start = end;
    }
}

impl Partitioner for DirichletPartitioner {
    fn num_partitions(&self) -> Result<usize, PartitionError> {
        Ok(self.num_partitions)
    }

    fn load_partition(&self, partition_id: usize) -> Result<Vec<usize>, PartitionError> {
        let table = self.table()?;
        table
            .get(partition_id)
            .cloned()
            .ok_or(PartitionError::OutOfRange {
                partition_id,
                num_partitions: self.num_partitions,
            })
    }

    fn partition_sizes(&self) -> Result<Vec<usize>, PartitionError> {
        Ok(self.table()?.iter().map(Vec::len).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryTable;
    use std::collections::BTreeSet;

    fn balanced_binary_source(rows: usize) -> Arc<InMemoryTable> {
        let labels = (0..rows).map(|i| (i % 2).to_string()).collect();
        Arc::new(
            InMemoryTable::new(rows)
                .with_column("label", labels)
                .unwrap(),
        )
    }

    #[test]
    fn coverage_is_exact_and_disjoint() {
        let p = DirichletPartitioner::new(balanced_binary_source(30), 3, 0.5, "label")
            .unwrap()
            .with_min_partition_size(5);
        let mut seen = BTreeSet::new();
        for id in 0..3 {
            for idx in p.load_partition(id).unwrap() {
                assert!(seen.insert(idx), "index {idx} assigned twice");
            }
        }
        assert_eq!(seen, (0..30).collect());
    }

    #[test]
    fn min_partition_size_holds_on_success() {
        let p = DirichletPartitioner::new(balanced_binary_source(30), 3, 0.5, "label")
            .unwrap()
            .with_min_partition_size(5);
        for size in p.partition_sizes().unwrap() {
            assert!(size >= 5, "partition of {size} rows under the minimum");
        }
    }

    #[test]
    fn same_seed_reproduces_assignment() {
        let make = || {
            DirichletPartitioner::new(balanced_binary_source(40), 4, 0.3, "label")
                .unwrap()
                .with_min_partition_size(1)
                .with_seed(7)
        };
        let a = make();
        let b = make();
        for id in 0..4 {
            assert_eq!(a.load_partition(id).unwrap(), b.load_partition(id).unwrap());
        }
    }

    #[test]
    fn unreachable_min_size_errors_after_bounded_attempts() {
        // 4 partitions x min 10 needs 40 rows; only 12 exist.
        let p = DirichletPartitioner::new(balanced_binary_source(12), 4, 0.5, "label")
            .unwrap()
            .with_min_partition_size(10);
        let err = p.partition_sizes().unwrap_err();
        assert!(matches!(err, PartitionError::MinPartitionSize { .. }));
    }

    #[test]
    fn self_balancing_caps_partition_spread() {
        let p = DirichletPartitioner::new(balanced_binary_source(100), 4, 0.2, "label")
            .unwrap()
            .with_min_partition_size(1)
            .with_self_balancing(true);
        let sizes = p.partition_sizes().unwrap();
        assert_eq!(sizes.iter().sum::<usize>(), 100);
        // With balancing on, nothing runs away far beyond the 25-row target:
        // a partition stops receiving whole classes once it crosses it.
        for size in sizes {
            assert!(size <= 75, "partition of {size} rows despite balancing");
        }
    }

    #[test]
    fn invalid_alpha_is_rejected() {
        let src = balanced_binary_source(10);
        assert!(DirichletPartitioner::new(src.clone(), 2, 0.0, "label").is_err());
        assert!(DirichletPartitioner::new(src.clone(), 2, vec![0.5], "label").is_err());
        assert!(DirichletPartitioner::new(src, 1, 0.5, "label").is_err());
    }

    #[test]
    fn missing_column_surfaces() {
        let p = DirichletPartitioner::new(balanced_binary_source(10), 2, 0.5, "wrong").unwrap();
        let err = p.partition_sizes().unwrap_err();
        assert!(matches!(err, PartitionError::UnknownColumn { .. }));
    }
}
