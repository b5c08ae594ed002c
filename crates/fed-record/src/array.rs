// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tensor-like byte payloads with dtype, shape, and serialization-format tags.

use crate::RecordError;
use serde::{Deserialize, Serialize};

/// A named tensor payload: an opaque byte blob plus three descriptors.
///
/// `dtype` and `shape` describe how to reconstruct the tensor; `stype` tags
/// the serialization format of the blob (e.g. `"f32.le"` for raw
/// little-endian floats). Either descriptor may be empty, in which case
/// reconstruction requires out-of-band knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array {
    /// Declared element dtype tag (`"f32"`, `"i64"`, …); may be empty.
    pub dtype: String,
    /// Tensor shape; may be empty when unknown.
    pub shape: Vec<u32>,
    /// Serialization-format tag for the blob.
    pub stype: String,
    /// The opaque byte blob.
    pub data: Vec<u8>,
}

/// Byte width of a known dtype tag, or `None` for tags this crate does not
/// interpret.
fn element_size(dtype: &str) -> Option<usize> {
    match dtype {
        "u8" | "i8" | "bool" => Some(1),
        "f32" | "i32" | "u32" => Some(4),
        "f64" | "i64" | "u64" => Some(8),
        _ => None,
    }
}

impl Array {
    /// Build an array, enforcing blob-length consistency.
    ///
    /// The length check only applies when both `dtype` (a known tag) and
    /// `shape` are specified; an empty descriptor opts out.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InconsistentArray`] when the blob length does
    /// not equal `element_size(dtype) * product(shape)`.
    pub fn new(
        dtype: impl Into<String>,
        shape: Vec<u32>,
        stype: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Self, RecordError> {
        let dtype = dtype.into();
        if !shape.is_empty() {
            if let Some(width) = element_size(&dtype) {
                let elements: usize = shape.iter().map(|d| *d as usize).product();
                let expected = elements * width;
                if data.len() != expected {
                    return Err(RecordError::InconsistentArray {
                        dtype,
                        expected,
                        actual: data.len(),
                    });
                }
            }
        }
        Ok(Self {
            dtype,
            shape,
            stype: stype.into(),
            data,
        })
    }

    /// Build an array from a raw blob with no dtype/shape descriptors.
    #[must_use]
    pub fn from_blob(stype: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            dtype: String::new(),
            shape: Vec::new(),
            stype: stype.into(),
            data,
        }
    }

    /// Number of elements implied by the shape, if a shape is present.
    #[must_use]
    pub fn num_elements(&self) -> Option<usize> {
        if self.shape.is_empty() {
            None
        } else {
            Some(self.shape.iter().map(|d| *d as usize).product())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistent_array_is_accepted() {
        let a = Array::new("f32", vec![2, 3], "f32.le", vec![0u8; 24]).unwrap();
        assert_eq!(a.num_elements(), Some(6));
    }

    #[test]
    fn inconsistent_blob_length_is_rejected() {
        let err = Array::new("f64", vec![4], "f64.le", vec![0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            RecordError::InconsistentArray {
                expected: 32,
                actual: 16,
                ..
            }
        ));
    }

    #[test]
    fn empty_descriptors_skip_the_check() {
        // No shape: any blob length goes through.
        Array::new("f32", vec![], "f32.le", vec![0u8; 7]).unwrap();
        // Unknown dtype tag: blob is treated as opaque.
        Array::new("framework.tensor", vec![3], "framework", vec![0u8; 7]).unwrap();
    }

    #[test]
    fn from_blob_has_empty_descriptors() {
        let a = Array::from_blob("f32.le", vec![1, 2, 3, 4]);
        assert!(a.dtype.is_empty());
        assert!(a.shape.is_empty());
        assert_eq!(a.num_elements(), None);
    }
}
