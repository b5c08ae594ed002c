// SPDX-License-Identifier: MIT OR Apache-2.0
//! One partition per distinct column value.

use crate::{PartitionError, PartitionSource, Partitioner};
use std::sync::{Arc, Mutex};

/// Groups rows by the value of a column, one partition per distinct value
/// in first-appearance order.
pub struct NaturalIdPartitioner {
    source: Arc<dyn PartitionSource>,
    partition_by: String,
    materialized: Mutex<Option<Arc<Vec<Vec<usize>>>>>,
}

impl NaturalIdPartitioner {
    /// Bind a partitioner to a source and grouping column.
    #[must_use]
    pub fn new(source: Arc<dyn PartitionSource>, partition_by: impl Into<String>) -> Self {
        Self {
            source,
            partition_by: partition_by.into(),
            materialized: Mutex::new(None),
        }
    }

    fn table(&self) -> Result<Arc<Vec<Vec<usize>>>, PartitionError> {
        let mut guard = self.materialized.lock().expect("partition lock poisoned");
        if let Some(table) = guard.as_ref() {
            return Ok(Arc::clone(table));
        }
        let column =
            self.source
                .column(&self.partition_by)
                .ok_or_else(|| PartitionError::UnknownColumn {
                    column: self.partition_by.clone(),
                })?;

        let mut order: Vec<&str> = Vec::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (idx, value) in column.iter().enumerate() {
            match order.iter().position(|v| v == value) {
                Some(pos) => groups[pos].push(idx),
                None => {
                    order.push(value);
                    groups.push(vec![idx]);
                }
            }
        }

        let table = Arc::new(groups);
        *guard = Some(Arc::clone(&table));
        Ok(table)
    }
}

impl Partitioner for NaturalIdPartitioner {
    fn num_partitions(&self) -> Result<usize, PartitionError> {
        Ok(self.table()?.len())
    }

    fn load_partition(&self, partition_id: usize) -> Result<Vec<usize>, PartitionError> {
        let table = self.table()?;
        table
            .get(partition_id)
            .cloned()
            .ok_or(PartitionError::OutOfRange {
                partition_id,
                num_partitions: table.len(),
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

    fn source() -> Arc<InMemoryTable> {
        Arc::new(
            InMemoryTable::new(6)
                .with_column(
                    "writer",
                    ["bob", "alice", "bob", "carol", "alice", "bob"]
                        .map(String::from)
                        .to_vec(),
                )
                .unwrap(),
        )
    }

    #[test]
    fn one_partition_per_distinct_value() {
        let p = NaturalIdPartitioner::new(source(), "writer");
        assert_eq!(p.num_partitions().unwrap(), 3);
        assert_eq!(p.load_partition(0).unwrap(), vec![0, 2, 5]); // bob
        assert_eq!(p.load_partition(1).unwrap(), vec![1, 4]); // alice
        assert_eq!(p.load_partition(2).unwrap(), vec![3]); // carol
    }

    #[test]
    fn missing_column_surfaces() {
        let p = NaturalIdPartitioner::new(source(), "reader");
        let err = p.num_partitions().unwrap_err();
        assert!(matches!(err, PartitionError::UnknownColumn { column } if column == "reader"));
    }
}
