// SPDX-License-Identifier: MIT OR Apache-2.0
//! The pull/worker scheduler loops.
//!
//! Two cooperating loops around a bounded channel: the pull loop polls the
//! store for at most one pending instruction per node and enqueues it; one
//! worker per actor dequeues, resolves the node's context, substitutes the
//! partition index into the message, executes via the pool, and writes the
//! result (or a synthesized failure) back to the store.

use crate::app::{ClientAppRegistry, Context};
use crate::cancel::ShutdownSignal;
use crate::config::EngineConfig;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::pool::{ActorJob, ActorPool, PoolError};
use crate::EngineError;
use fed_partition::Partitioner;
use fed_state::{NodeContextRegistry, StateStore};
use fed_strategy::compat::failure_recordset;
use fed_task::{
    message_from_task_ins, task_res_from_message, MessageType, StatusCode, TaskIns, TaskRes,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// How often a failed result write is retried before the task is given up.
const STORE_WRITE_ATTEMPTS: usize = 3;

/// Record-name prefix a result status is embedded under, per task type.
fn result_name(task_type: MessageType) -> &'static str {
    match task_type {
        MessageType::Fit => "fitres",
        MessageType::Evaluate => "evaluateres",
        MessageType::GetParameters => "getparametersres",
        MessageType::GetProperties => "getpropertiesres",
    }
}

/// The virtual client engine.
///
/// Construction registers the nodes and sizes the pool;
/// [`run`](Self::run) drives the loops until shutdown.
pub struct VirtualClientEngine {
    config: EngineConfig,
    state: Arc<dyn StateStore>,
    contexts: Arc<NodeContextRegistry>,
    pool: Arc<ActorPool>,
    node_ids: Vec<u64>,
    partition_of: Arc<HashMap<u64, u64>>,
    metrics: Arc<EngineMetrics>,
}

impl VirtualClientEngine {
    /// Register `num_supernodes` nodes and build the actor pool.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the configuration fails
    /// validation and [`EngineError::UnknownApp`] when the configured app
    /// path is not registered.
    pub fn new(
        config: EngineConfig,
        state: Arc<dyn StateStore>,
        contexts: Arc<NodeContextRegistry>,
        apps: &ClientAppRegistry,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let factory = apps
            .load(&config.app_path)
            .ok_or_else(|| EngineError::UnknownApp {
                path: config.app_path.clone(),
            })?;

        // Node ids come from the store; the partition index of a node is
        // its position in registration order, fixed for the engine's
        // lifetime.
        let node_ids: Vec<u64> = (0..config.num_supernodes)
            .map(|_| state.create_node())
            .collect();
        let partition_of: HashMap<u64, u64> = node_ids
            .iter()
            .enumerate()
            .map(|(idx, node)| (*node, idx as u64))
            .collect();

        let capacity = config.resources.actors_capacity();
        let pool = ActorPool::new(factory, capacity);
        let added = pool.add_actors(capacity);
        info!(
            target: "fed.engine",
            nodes = node_ids.len(),
            actors = added,
            "engine constructed"
        );

        Ok(Self {
            config,
            state,
            contexts,
            pool: Arc::new(pool),
            node_ids,
            partition_of: Arc::new(partition_of),
            metrics: Arc::new(EngineMetrics::new()),
        })
    }

    /// The registered node ids, in partition order.
    #[must_use]
    pub fn node_ids(&self) -> &[u64] {
        &self.node_ids
    }

    /// Number of actors in the pool.
    #[must_use]
    pub fn num_actors(&self) -> usize {
        self.pool.num_actors()
    }

    /// Check that `partitioner` can cover every registered node.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PartitionShortfall`] when it cannot.
    pub fn check_partitioner(&self, partitioner: &dyn Partitioner) -> Result<(), EngineError> {
        let partitions = partitioner
            .num_partitions()
            .map_err(|e| EngineError::Config(crate::config::ConfigError::ValidationError {
                reasons: vec![format!("partitioner failed to materialize: {e}")],
            }))?;
        if partitions < self.node_ids.len() {
            return Err(EngineError::PartitionShortfall {
                partitions,
                nodes: self.node_ids.len(),
            });
        }
        Ok(())
    }

    /// Run the pull loop and one worker per actor until `shutdown` fires,
    /// then drain and return the final counters.
    pub async fn run(self, shutdown: ShutdownSignal) -> MetricsSnapshot {
        let (tx, rx) = mpsc::channel::<TaskIns>(self.config.queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let in_flight: Arc<Mutex<HashSet<u64>>> = Arc::new(Mutex::new(HashSet::new()));

        let mut workers = Vec::with_capacity(self.pool.num_actors());
        for worker_id in 0..self.pool.num_actors() {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&rx),
                Arc::clone(&self.pool),
                Arc::clone(&self.state),
                Arc::clone(&self.contexts),
                Arc::clone(&self.partition_of),
                Arc::clone(&in_flight),
                Arc::clone(&self.metrics),
                shutdown.clone(),
            )));
        }

        let puller = tokio::spawn(pull_loop(
            tx,
            Arc::clone(&self.state),
            self.node_ids.clone(),
            Arc::clone(&in_flight),
            self.config.poll_interval(),
            shutdown.clone(),
        ));

        if let Err(e) = puller.await {
            error!(target: "fed.engine", error = %e, "pull loop aborted");
        }
        for worker in workers {
            if let Err(e) = worker.await {
                error!(target: "fed.engine", error = %e, "worker aborted");
            }
        }

        let snapshot = self.metrics.snapshot();
        info!(
            target: "fed.engine",
            dispatched = snapshot.dispatched,
            completed = snapshot.completed,
            failed = snapshot.failed,
            expired = snapshot.expired,
            "engine stopped"
        );
        snapshot
    }
}

/// Poll the store for pending instructions and feed the internal channel.
///
/// A node with a task already in flight is skipped until its result lands;
/// the store's per-node FIFO keeps deferred instructions in order.
async fn pull_loop(
    tx: mpsc::Sender<TaskIns>,
    state: Arc<dyn StateStore>,
    node_ids: Vec<u64>,
    in_flight: Arc<Mutex<HashSet<u64>>>,
    poll_interval: std::time::Duration,
    shutdown: ShutdownSignal,
) {
    loop {
        for node_id in &node_ids {
            if shutdown.is_triggered() {
                break;
            }
            let busy = in_flight
                .lock()
                .expect("in-flight lock poisoned")
                .contains(node_id);
            if busy {
                continue;
            }
            let Some(task) = state.get_task_ins(*node_id, 1).into_iter().next() else {
                continue;
            };
            in_flight
                .lock()
                .expect("in-flight lock poisoned")
                .insert(*node_id);
            debug!(target: "fed.engine", node_id, task_id = %task.task_id, "instruction pulled");
            // Suspends when the channel is full: backpressure on the poll
            // rate.
            if tx.send(task).await.is_err() {
                warn!(target: "fed.engine", "internal channel closed, stopping pull loop");
                return;
            }
        }

        tokio::select! {
            () = tokio::time::sleep(poll_interval) => {}
            () = shutdown.triggered() => {
                debug!(target: "fed.engine", "pull loop observed shutdown");
                return;
            }
        }
    }
}

/// One worker per actor: dequeue, execute, persist.
#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<TaskIns>>>,
    pool: Arc<ActorPool>,
    state: Arc<dyn StateStore>,
    contexts: Arc<NodeContextRegistry>,
    partition_of: Arc<HashMap<u64, u64>>,
    in_flight: Arc<Mutex<HashSet<u64>>>,
    metrics: Arc<EngineMetrics>,
    shutdown: ShutdownSignal,
) {
    loop {
        let task = {
            let mut rx = rx.lock().await;
            tokio::select! {
                task = rx.recv() => task,
                () = shutdown.triggered() => {
                    // Drain whatever is already queued before exiting.
                    rx.try_recv().ok()
                }
            }
        };
        let Some(task) = task else {
            debug!(target: "fed.engine", worker_id, "worker exiting");
            return;
        };

        let node_id = task.consumer_node_id;
        execute_task(
            worker_id, &task, &pool, &state, &contexts, &partition_of, &metrics,
        )
        .await;
        in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&node_id);
    }
}

/// Execute one instruction and write its result (or failure) back.
///
/// Task failures never tear the worker down: every outcome becomes a
/// stored [`TaskRes`], successful or not.
async fn execute_task(
    worker_id: usize,
    task: &TaskIns,
    pool: &ActorPool,
    state: &Arc<dyn StateStore>,
    contexts: &NodeContextRegistry,
    partition_of: &HashMap<u64, u64>,
    metrics: &EngineMetrics,
) {
    let node_id = task.consumer_node_id;
    let partition_id = partition_of.get(&node_id).copied().unwrap_or(node_id);

    contexts.register_context(node_id, task.run_id);
    let mut context = Context::new(task.run_id, node_id);
    context.state = contexts.retrieve_context(node_id, task.run_id);

    // The partition index replaces the node id in the metadata; this is
    // how an identically-coded client selects its data slice.
    let message = message_from_task_ins(task, Some(partition_id));
    let job = ActorJob { message, context };

    // One worker per actor and one job per worker, so a free actor is an
    // invariant here.
    let handle = match pool.submit_if_actor_is_free(job) {
        Ok(handle) => handle,
        Err(_job) => {
            error!(target: "fed.engine", worker_id, "no free actor despite 1:1 worker mapping");
            metrics.record_failed();
            let res = failure_res(task, StatusCode::ExecutionFailed, "no executor available");
            store_with_retry(state, res).await;
            return;
        }
    };
    metrics.record_dispatched();

    match handle.fetch().await {
        Ok((reply, updated)) => {
            contexts.update_context(node_id, task.run_id, updated.state);
            let res = task_res_from_message(reply, task.task_id, node_id);
            metrics.record_completed();
            store_with_retry(state, res).await;
        }
        Err(PoolError::TtlExpired { ttl }) => {
            warn!(target: "fed.engine", worker_id, node_id, ?ttl, "task expired");
            metrics.record_expired();
            let res = failure_res(
                task,
                StatusCode::TtlExpired,
                &format!("execution exceeded ttl of {ttl:?}"),
            );
            store_with_retry(state, res).await;
        }
        Err(PoolError::AppFailed(e)) => {
            warn!(target: "fed.engine", worker_id, node_id, error = %e, "task failed");
            metrics.record_failed();
            let res = failure_res(task, StatusCode::ExecutionFailed, &e.to_string());
            store_with_retry(state, res).await;
        }
    }
}

/// Synthesize a failure result for `task` carrying only a status record.
fn failure_res(task: &TaskIns, code: StatusCode, detail: &str) -> TaskRes {
    let recordset = failure_recordset(result_name(task.task_type), code, detail);
    let reply = message_from_task_ins(task, None).reply(recordset);
    task_res_from_message(reply, task.task_id, task.consumer_node_id)
}

/// Write a result with bounded retries; the last failure is surfaced in
/// the log only, since dropping the result is already the failure mode.
async fn store_with_retry(state: &Arc<dyn StateStore>, res: TaskRes) {
    for attempt in 1..=STORE_WRITE_ATTEMPTS {
        match state.store_task_res(res.clone()) {
            Ok(_) => return,
            Err(e) if attempt < STORE_WRITE_ATTEMPTS => {
                warn!(target: "fed.engine", attempt, error = %e, "result write failed, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(10 * attempt as u64)).await;
            }
            Err(e) => {
                error!(target: "fed.engine", error = %e, "result write failed, giving up");
            }
        }
    }
}
