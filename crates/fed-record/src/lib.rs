// SPDX-License-Identifier: MIT OR Apache-2.0
//! fed-record
//!
//! The typed data model carried by every message in the runtime.
//!
//! A [`RecordSet`] bundles three kinds of records, all built on the same
//! insertion-ordered mapping primitive:
//! - [`ParametersRecord`]: named [`Array`]s (model layers),
//! - [`MetricsRecord`]: numeric values and numeric sequences,
//! - [`ConfigsRecord`]: the metrics set plus strings, bytes, and booleans.
//!
//! Each record enforces its value-type restriction at insertion and rejects
//! anything outside its allowed set with [`RecordError::TypeViolation`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Tensor-like byte payloads with dtype/shape descriptors.
pub mod array;
/// Insertion-ordered string-keyed mapping primitive.
pub mod dict;
/// The three record kinds and the [`RecordSet`] bundle.
pub mod records;
/// Scalar value universe and the restricted per-record value sets.
pub mod scalar;

pub use array::Array;
pub use dict::OrderedDict;
pub use records::{ConfigsRecord, MetricsRecord, ParametersRecord, RecordSet};
pub use scalar::{ConfigValue, MetricsValue, Scalar};

use thiserror::Error;

/// Errors raised by record construction and mutation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    /// A value outside the record's allowed type set was rejected at insertion.
    #[error("value for key '{key}' rejected: expected {expected}, found {found}")]
    TypeViolation {
        /// Key the caller tried to insert under.
        key: String,
        /// Description of the allowed type set.
        expected: &'static str,
        /// Kind of the rejected value.
        found: &'static str,
    },

    /// A lookup or removal referenced a key that is not present.
    #[error("key not found: {key}")]
    KeyMissing {
        /// The missing key.
        key: String,
    },

    /// An [`Array`] blob length disagrees with its dtype and shape.
    #[error("array blob is {actual} bytes but dtype '{dtype}' x shape implies {expected}")]
    InconsistentArray {
        /// Declared element dtype tag.
        dtype: String,
        /// Byte length implied by dtype and shape.
        expected: usize,
        /// Actual blob length.
        actual: usize,
    },
}

impl RecordError {
    /// Replace the key recorded in a [`RecordError::TypeViolation`].
    ///
    /// Conversions from [`Scalar`] cannot know the destination key; the
    /// record fills it in at the insertion site.
    #[must_use]
    pub fn with_key(self, key: impl Into<String>) -> Self {
        match self {
            Self::TypeViolation {
                expected, found, ..
            } => Self::TypeViolation {
                key: key.into(),
                expected,
                found,
            },
            other => other,
        }
    }
}
