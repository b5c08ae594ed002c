// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tensor blob codec.
//!
//! Aggregation interprets tensor blobs as little-endian `f32` sequences,
//! tagged [`TENSOR_TYPE_F32`]. Blobs carrying any other tag are opaque to
//! this crate and rejected at decode time.

use crate::StrategyError;
use fed_task::Parameters;

/// Serialization-format tag for raw little-endian `f32` blobs.
pub const TENSOR_TYPE_F32: &str = "f32.le";

/// Decode one blob into `f32` values.
///
/// # Errors
///
/// Returns [`StrategyError::InvalidTensor`] when the length is not a
/// multiple of four bytes.
pub fn bytes_to_f32s(blob: &[u8]) -> Result<Vec<f32>, StrategyError> {
    if blob.len() % 4 != 0 {
        return Err(StrategyError::InvalidTensor {
            reason: format!("blob of {} bytes is not a whole number of f32s", blob.len()),
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Encode `f32` values into a blob.
#[must_use]
pub fn f32s_to_bytes(values: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(values.len() * 4);
    for v in values {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Decode all tensors of a [`Parameters`] into `f32` vectors.
///
/// # Errors
///
/// Returns [`StrategyError::InvalidTensor`] on any malformed blob.
pub fn parameters_to_vecs(parameters: &Parameters) -> Result<Vec<Vec<f32>>, StrategyError> {
    parameters
        .tensors
        .iter()
        .map(|t| bytes_to_f32s(t))
        .collect()
}

/// Encode `f32` vectors into [`Parameters`] tagged [`TENSOR_TYPE_F32`].
#[must_use]
pub fn vecs_to_parameters(vecs: &[Vec<f32>]) -> Parameters {
    Parameters::new(
        vecs.iter().map(|v| f32s_to_bytes(v)).collect(),
        TENSOR_TYPE_F32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_is_exact() {
        let vecs = vec![vec![1.0f32, -2.5, 0.0], vec![f32::MAX]];
        let params = vecs_to_parameters(&vecs);
        assert_eq!(params.tensor_type, TENSOR_TYPE_F32);
        assert_eq!(parameters_to_vecs(&params).unwrap(), vecs);
    }

    #[test]
    fn ragged_blob_is_rejected() {
        let err = bytes_to_f32s(&[0, 1, 2]).unwrap_err();
        assert!(matches!(err, StrategyError::InvalidTensor { .. }));
    }
}
