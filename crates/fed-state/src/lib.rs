// SPDX-License-Identifier: MIT OR Apache-2.0
//! fed-state
//!
//! In-process durable state for the coordination runtime: a concurrent
//! FIFO store of task instructions keyed by destination node, a result
//! sink keyed by originating instruction, and the per-node context
//! registry preserved across rounds. Nothing here survives a process
//! restart.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Per-node durable context registry.
pub mod context;
/// The in-memory task instruction/result store.
pub mod store;

pub use context::NodeContextRegistry;
pub use store::{InMemoryState, StateStore};

use thiserror::Error;

/// Errors raised by state store operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    /// An instruction referenced a node id the store never allocated.
    #[error("unknown node: {node_id}")]
    UnknownNode {
        /// The unrecognized node id.
        node_id: u64,
    },

    /// A task envelope failed store-side validation.
    #[error("invalid task: {reason}")]
    InvalidTask {
        /// What was wrong with it.
        reason: String,
    },
}
