// SPDX-License-Identifier: MIT OR Apache-2.0
//! Contiguous balanced (IID) partitioning.

use crate::{PartitionError, PartitionSource, Partitioner};
use std::sync::{Arc, OnceLock};

/// Splits row indices into `num_partitions` contiguous chunks.
///
/// The remainder of an uneven split is spread over the first partitions,
/// so partition sizes differ by at most one.
pub struct IidPartitioner {
    source: Arc<dyn PartitionSource>,
    num_partitions: usize,
    materialized: OnceLock<Vec<Vec<usize>>>,
}

impl IidPartitioner {
    /// Bind a partitioner to a source.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionError::InvalidConfig`] when `num_partitions`
    /// is zero.
    pub fn new(
        source: Arc<dyn PartitionSource>,
        num_partitions: usize,
    ) -> Result<Self, PartitionError> {
        if num_partitions == 0 {
            return Err(PartitionError::InvalidConfig {
                reason: "num_partitions must be positive".into(),
            });
        }
        Ok(Self {
            source,
            num_partitions,
            materialized: OnceLock::new(),
        })
    }

    fn table(&self) -> &Vec<Vec<usize>> {
        self.materialized.get_or_init(|| {
            let n = self.source.num_rows();
            let base = n / self.num_partitions;
            let remainder = n % self.num_partitions;
            let mut partitions = Vec::with_capacity(self.num_partitions);
            let mut next = 0usize;
            for p in 0..self.num_partitions {
                let size = base + usize::from(p < remainder);
                partitions.push((next..next + size).collect());
                next += size;
            }
            partitions
        })
    }
}

impl Partitioner for IidPartitioner {
    fn num_partitions(&self) -> Result<usize, PartitionError> {
        Ok(self.num_partitions)
    }

    fn load_partition(&self, partition_id: usize) -> Result<Vec<usize>, PartitionError> {
        let table = self.table();
        table
            .get(partition_id)
            .cloned()
            .ok_or(PartitionError::OutOfRange {
                partition_id,
                num_partitions: self.num_partitions,
            })
    }

    fn partition_sizes(&self) -> Result<Vec<usize>, PartitionError> {
        Ok(self.table().iter().map(Vec::len).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryTable;

    #[test]
    fn chunks_cover_all_rows_disjointly() {
        let source = Arc::new(InMemoryTable::new(10));
        let p = IidPartitioner::new(source, 3).unwrap();
        let mut seen = vec![false; 10];
        for id in 0..3 {
            for idx in p.load_partition(id).unwrap() {
                assert!(!seen[idx], "index {idx} assigned twice");
                seen[idx] = true;
            }
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn remainder_goes_to_the_first_partitions() {
        let source = Arc::new(InMemoryTable::new(10));
        let p = IidPartitioner::new(source, 3).unwrap();
        assert_eq!(p.partition_sizes().unwrap(), vec![4, 3, 3]);
    }

    #[test]
    fn out_of_range_partition_errors() {
        let source = Arc::new(InMemoryTable::new(4));
        let p = IidPartitioner::new(source, 2).unwrap();
        let err = p.load_partition(2).unwrap_err();
        assert!(matches!(err, PartitionError::OutOfRange { .. }));
    }

    #[test]
    fn zero_partitions_is_invalid() {
        let source = Arc::new(InMemoryTable::new(4));
        assert!(IidPartitioner::new(source, 0).is_err());
    }
}
