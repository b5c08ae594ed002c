// SPDX-License-Identifier: MIT OR Apache-2.0
//! The in-memory task instruction/result store.

use crate::StateError;
use fed_task::{TaskIns, TaskRes};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Durable-in-process task state shared by the coordinator and the engine.
///
/// Instructions are delivered per-consumer in FIFO order and at most once;
/// results are delivered at most once per satisfied instruction.
pub trait StateStore: Send + Sync {
    /// Allocate a fresh node identifier, unique within this store.
    fn create_node(&self) -> u64;

    /// Append a task instruction.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownNode`] when the consumer node was never
    /// allocated by [`create_node`](Self::create_node).
    fn store_task_ins(&self, task: TaskIns) -> Result<Uuid, StateError>;

    /// Return up to `limit` pending instructions addressed to `node_id`,
    /// oldest first, marking them delivered.
    fn get_task_ins(&self, node_id: u64, limit: usize) -> Vec<TaskIns>;

    /// Append a task result.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidTask`] when the result does not
    /// reference a stored instruction.
    fn store_task_res(&self, res: TaskRes) -> Result<Uuid, StateError>;

    /// Return up to `limit` undelivered results answering any of `ins_ids`,
    /// marking them delivered.
    fn get_task_res(&self, ins_ids: &[Uuid], limit: usize) -> Vec<TaskRes>;

    /// Number of instructions not yet delivered.
    fn num_task_ins(&self) -> usize;

    /// Number of results not yet delivered.
    fn num_task_res(&self) -> usize;
}

#[derive(Default)]
struct StateInner {
    next_node_id: u64,
    nodes: HashSet<u64>,
    task_ins: Vec<(TaskIns, bool)>,
    task_res: Vec<(TaskRes, bool)>,
}

/// The reference [`StateStore`]: a `Mutex`-guarded in-memory table.
///
/// Safe under concurrent callers; not durable across restarts.
#[derive(Default)]
pub struct InMemoryState {
    inner: Mutex<StateInner>,
}

impl InMemoryState {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryState {
    fn create_node(&self) -> u64 {
        let mut inner = self.inner.lock().expect("state lock poisoned");
        inner.next_node_id += 1;
        let node_id = inner.next_node_id;
        inner.nodes.insert(node_id);
        debug!(target: "fed.state", node_id, "node created");
        node_id
    }

    fn store_task_ins(&self, task: TaskIns) -> Result<Uuid, StateError> {
        let mut inner = self.inner.lock().expect("state lock poisoned");
        if !inner.nodes.contains(&task.consumer_node_id) {
            return Err(StateError::UnknownNode {
                node_id: task.consumer_node_id,
            });
        }
        let task_id = task.task_id;
        debug!(
            target: "fed.state",
            %task_id,
            consumer = task.consumer_node_id,
            "task instruction stored"
        );
        inner.task_ins.push((task, false));
        Ok(task_id)
    }

    fn get_task_ins(&self, node_id: u64, limit: usize) -> Vec<TaskIns> {
        let mut inner = self.inner.lock().expect("state lock poisoned");
        let mut out = Vec::new();
        for (task, delivered) in &mut inner.task_ins {
            if out.len() == limit {
                break;
            }
            if !*delivered && task.consumer_node_id == node_id {
                *delivered = true;
                out.push(task.clone());
            }
        }
        out
    }

    fn store_task_res(&self, res: TaskRes) -> Result<Uuid, StateError> {
        let mut inner = self.inner.lock().expect("state lock poisoned");
        if !inner
            .task_ins
            .iter()
            .any(|(ins, _)| ins.task_id == res.reply_to)
        {
            return Err(StateError::InvalidTask {
                reason: format!("result replies to unknown instruction {}", res.reply_to),
            });
        }
        let task_id = res.task_id;
        debug!(
            target: "fed.state",
            %task_id,
            reply_to = %res.reply_to,
            "task result stored"
        );
        inner.task_res.push((res, false));
        Ok(task_id)
    }

    fn get_task_res(&self, ins_ids: &[Uuid], limit: usize) -> Vec<TaskRes> {
        let wanted: HashSet<Uuid> = ins_ids.iter().copied().collect();
        let mut inner = self.inner.lock().expect("state lock poisoned");
        let mut out = Vec::new();
        for (res, delivered) in &mut inner.task_res {
            if out.len() == limit {
                break;
            }
            if !*delivered && wanted.contains(&res.reply_to) {
                *delivered = true;
                out.push(res.clone());
            }
        }
        out
    }

    fn num_task_ins(&self) -> usize {
        let inner = self.inner.lock().expect("state lock poisoned");
        inner.task_ins.iter().filter(|(_, d)| !d).count()
    }

    fn num_task_res(&self) -> usize {
        let inner = self.inner.lock().expect("state lock poisoned");
        inner.task_res.iter().filter(|(_, d)| !d).count()
    }
}
