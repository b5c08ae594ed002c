// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-node durable context registry.

use fed_record::RecordSet;
use std::collections::HashMap;
use std::sync::Mutex;

/// Mutable per-node state preserved across rounds.
///
/// Contexts are keyed by `(node_id, run_id)`, created empty on first
/// reference, replaced atomically after every task execution, and never
/// evicted during the engine's lifetime. Callers treat the retrieved
/// context as a value carried with the message; isolation is not part of
/// the contract.
#[derive(Default)]
pub struct NodeContextRegistry {
    contexts: Mutex<HashMap<(u64, u64), RecordSet>>,
}

impl NodeContextRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty context for `(node_id, run_id)` if none exists.
    pub fn register_context(&self, node_id: u64, run_id: u64) {
        let mut contexts = self.contexts.lock().expect("context lock poisoned");
        contexts.entry((node_id, run_id)).or_default();
    }

    /// Return a copy of the context for `(node_id, run_id)`, registering
    /// it first if absent.
    #[must_use]
    pub fn retrieve_context(&self, node_id: u64, run_id: u64) -> RecordSet {
        let mut contexts = self.contexts.lock().expect("context lock poisoned");
        contexts.entry((node_id, run_id)).or_default().clone()
    }

    /// Atomically replace the context for `(node_id, run_id)`.
    pub fn update_context(&self, node_id: u64, run_id: u64, context: RecordSet) {
        let mut contexts = self.contexts.lock().expect("context lock poisoned");
        contexts.insert((node_id, run_id), context);
    }

    /// Number of registered contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.lock().expect("context lock poisoned").len()
    }

    /// Returns `true` when no context has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
