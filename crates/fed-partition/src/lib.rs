// SPDX-License-Identifier: MIT OR Apache-2.0
//! fed-partition
//!
//! Assignment of dataset row indices to node partitions. A partitioner
//! binds to a [`PartitionSource`], materializes the full node→indices
//! table lazily on first access, and is immutable once materialized.
//! Every index appears in exactly one partition; given the same source,
//! seed, and configuration the assignment is reproducible.
//!
//! Dataset loading itself is out of scope — [`PartitionSource`] is the
//! seam, with [`InMemoryTable`] as the reference implementation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Dirichlet-balanced label partitioning.
pub mod dirichlet;
/// Contiguous balanced (IID) partitioning.
pub mod iid;
/// One partition per distinct column value.
pub mod natural_id;

pub use dirichlet::{Alpha, DirichletPartitioner};
pub use iid::IidPartitioner;
pub use natural_id::NaturalIdPartitioner;

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised by partitioner configuration and materialization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PartitionError {
    /// The partitioner was constructed with inconsistent settings.
    #[error("invalid partitioner config: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },

    /// The configured `partition_by` column does not exist in the source.
    #[error("unknown column: {column}")]
    UnknownColumn {
        /// The missing column name.
        column: String,
    },

    /// A partition id outside `0..num_partitions` was requested.
    #[error("partition {partition_id} out of range (have {num_partitions})")]
    OutOfRange {
        /// The requested partition id.
        partition_id: usize,
        /// Number of partitions available.
        num_partitions: usize,
    },

    /// Repeated sampling could not satisfy the minimum partition size.
    #[error(
        "could not reach min partition size {min_partition_size} within {attempts} attempts"
    )]
    MinPartitionSize {
        /// The configured minimum.
        min_partition_size: usize,
        /// How many draws were tried.
        attempts: usize,
    },
}

/// Read-only view of the dataset a partitioner binds to.
pub trait PartitionSource: Send + Sync {
    /// Number of rows in the dataset.
    fn num_rows(&self) -> usize;

    /// Column values by name, one per row, or `None` if absent.
    fn column(&self, name: &str) -> Option<&[String]>;
}

/// A small in-memory table: the reference [`PartitionSource`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryTable {
    num_rows: usize,
    columns: BTreeMap<String, Vec<String>>,
}

impl InMemoryTable {
    /// Create a table with `num_rows` rows and no columns.
    #[must_use]
    pub fn new(num_rows: usize) -> Self {
        Self {
            num_rows,
            columns: BTreeMap::new(),
        }
    }

    /// Attach a column.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionError::InvalidConfig`] when the column length
    /// does not match the row count.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<String>,
    ) -> Result<Self, PartitionError> {
        if values.len() != self.num_rows {
            return Err(PartitionError::InvalidConfig {
                reason: format!(
                    "column has {} values but the table has {} rows",
                    values.len(),
                    self.num_rows
                ),
            });
        }
        self.columns.insert(name.into(), values);
        Ok(self)
    }
}

impl PartitionSource for InMemoryTable {
    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn column(&self, name: &str) -> Option<&[String]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

/// Assigns dataset row indices to node partitions.
///
/// Materialization happens once, on the first call that needs the table;
/// afterwards the assignment is immutable.
pub trait Partitioner: Send + Sync {
    /// Number of partitions.
    ///
    /// # Errors
    ///
    /// May materialize; surfaces the same errors as
    /// [`load_partition`](Self::load_partition).
    fn num_partitions(&self) -> Result<usize, PartitionError>;

    /// Row indices assigned to `partition_id`, in partition order.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionError::OutOfRange`] for an unknown partition id,
    /// or a materialization error on first access.
    fn load_partition(&self, partition_id: usize) -> Result<Vec<usize>, PartitionError>;

    /// Sizes of all partitions (materializes on first access).
    ///
    /// # Errors
    ///
    /// Surfaces the same errors as [`load_partition`](Self::load_partition).
    fn partition_sizes(&self) -> Result<Vec<usize>, PartitionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rejects_mismatched_column_length() {
        let err = InMemoryTable::new(3)
            .with_column("label", vec!["a".into()])
            .unwrap_err();
        assert!(matches!(err, PartitionError::InvalidConfig { .. }));
    }

    #[test]
    fn table_exposes_columns() {
        let table = InMemoryTable::new(2)
            .with_column("label", vec!["x".into(), "y".into()])
            .unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column("label").unwrap().len(), 2);
        assert!(table.column("other").is_none());
    }
}
