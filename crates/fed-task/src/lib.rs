// SPDX-License-Identifier: MIT OR Apache-2.0
//! fed-task
//!
//! Message and task envelopes: the in-memory [`Message`] with its
//! [`Metadata`], the store-resident [`TaskIns`]/[`TaskRes`] counterparts,
//! flattened [`Parameters`], and the conversions between all of them.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Record↔parameters and message↔task conversions.
pub mod convert;
/// In-memory messages and their metadata envelope.
pub mod message;
/// Store-resident task instruction and result envelopes.
pub mod task;

pub use convert::{
    message_from_task_ins, parameters_into_parameters_record, parameters_record_into_parameters,
    parameters_record_to_parameters, parameters_to_parameters_record, task_res_from_message,
};
pub use message::{Message, MessageType, Metadata};
pub use task::{Status, StatusCode, TaskIns, TaskRes, embed_status, extract_status};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by envelope construction and conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    /// A message-type tag did not match any known variant.
    #[error("unknown message type: {tag}")]
    UnknownMessageType {
        /// The unrecognized tag.
        tag: String,
    },

    /// A task envelope was structurally invalid.
    #[error("invalid task: {reason}")]
    InvalidTask {
        /// What was wrong with it.
        reason: String,
    },
}

/// Model parameters flattened to a list of opaque tensor blobs.
///
/// The common `tensor_type` tag describes how every blob is serialized;
/// per-tensor dtype and shape are not carried here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Parameters {
    /// Tensor blobs, in layer order.
    pub tensors: Vec<Vec<u8>>,
    /// Serialization-format tag shared by all blobs.
    pub tensor_type: String,
}

impl Parameters {
    /// Create parameters from blobs and a common tensor-type tag.
    #[must_use]
    pub fn new(tensors: Vec<Vec<u8>>, tensor_type: impl Into<String>) -> Self {
        Self {
            tensors,
            tensor_type: tensor_type.into(),
        }
    }
}
