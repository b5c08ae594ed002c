// SPDX-License-Identifier: MIT OR Apache-2.0
//! The strategy-driven round cycle.
//!
//! One round is: configure fit → persist one instruction per selected
//! node → await all results → aggregate fit → the symmetric evaluate
//! phase → optional server-side evaluation. Every instruction write
//! completes before aggregation is invoked, and individual client
//! failures never abort the round.

use crate::EngineError;
use fed_state::StateStore;
use fed_strategy::compat::{
    evaluate_ins_to_recordset, fit_ins_to_recordset, recordset_to_evaluate_res,
    recordset_to_fit_res,
};
use fed_strategy::{ClientManager, FailureInfo, MetricsMap, Strategy};
use fed_task::{extract_status, MessageType, Parameters, StatusCode, TaskIns, TaskRes};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// How often collected results are polled while a round is waiting.
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Summary of one completed round.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    /// The round index.
    pub round: u64,
    /// Whether aggregation produced new global parameters.
    pub parameters_updated: bool,
    /// Fit metrics from the strategy.
    pub fit_metrics: MetricsMap,
    /// Aggregated evaluation loss, when the evaluate phase produced one.
    pub loss: Option<f64>,
    /// Evaluate metrics from the strategy.
    pub evaluate_metrics: MetricsMap,
    /// Client failures observed across both phases.
    pub failures: usize,
}

/// Drives the strategy against the state store, round by round.
pub struct RoundDriver {
    strategy: Arc<dyn Strategy>,
    state: Arc<dyn StateStore>,
    client_manager: Arc<dyn ClientManager>,
    run_id: u64,
    task_ttl: Option<Duration>,
    round_timeout: Duration,
    parameters: Parameters,
}

impl RoundDriver {
    /// Create a driver; initial parameters come from the strategy, or
    /// default to empty.
    #[must_use]
    pub fn new(
        strategy: Arc<dyn Strategy>,
        state: Arc<dyn StateStore>,
        client_manager: Arc<dyn ClientManager>,
        run_id: u64,
    ) -> Self {
        let parameters = strategy
            .initialize_parameters(client_manager.as_ref())
            .unwrap_or_default();
        Self {
            strategy,
            state,
            client_manager,
            run_id,
            task_ttl: None,
            round_timeout: Duration::from_secs(30),
            parameters,
        }
    }

    /// Attach a TTL to every emitted instruction.
    #[must_use]
    pub fn with_task_ttl(mut self, ttl: Duration) -> Self {
        self.task_ttl = Some(ttl);
        self
    }

    /// Deadline for collecting one phase's results.
    #[must_use]
    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = timeout;
        self
    }

    /// The current global parameters.
    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Run one full round.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when an instruction cannot be
    /// persisted; collection and aggregation themselves never fail the
    /// round.
    pub async fn run_round(&mut self, round: u64) -> Result<RoundOutcome, EngineError> {
        // -- fit phase --
        let configured =
            self.strategy
                .configure_fit(round, &self.parameters, self.client_manager.as_ref());
        let dispatched = self.dispatch(
            round,
            MessageType::Fit,
            configured
                .iter()
                .map(|(node, ins)| (*node, fit_ins_to_recordset(ins)))
                .collect(),
        )?;
        let (replies, mut failures) = self.collect(&dispatched).await;

        let mut fit_results = Vec::new();
        for (node_id, res) in replies {
            match decode_fit(&res) {
                Ok(fit_res) => fit_results.push((node_id, fit_res)),
                Err(reason) => failures.push(FailureInfo { node_id, reason }),
            }
        }
        let fit_failures = failures.len();
        let (new_parameters, fit_metrics) =
            self.strategy.aggregate_fit(round, fit_results, failures);
        let parameters_updated = new_parameters.is_some();
        match new_parameters {
            Some(p) => self.parameters = p,
            None => {
                // No global update this round; keep the previous
                // parameters and carry on.
                warn!(target: "fed.engine", round, "fit aggregation produced no parameters");
            }
        }

        // -- evaluate phase --
        let configured = self.strategy.configure_evaluate(
            round,
            &self.parameters,
            self.client_manager.as_ref(),
        );
        let dispatched = self.dispatch(
            round,
            MessageType::Evaluate,
            configured
                .iter()
                .map(|(node, ins)| (*node, evaluate_ins_to_recordset(ins)))
                .collect(),
        )?;
        let (replies, mut failures) = self.collect(&dispatched).await;

        let mut evaluate_results = Vec::new();
        for (node_id, res) in replies {
            match decode_evaluate(&res) {
                Ok(eval_res) => evaluate_results.push((node_id, eval_res)),
                Err(reason) => failures.push(FailureInfo { node_id, reason }),
            }
        }
        let evaluate_failures = failures.len();
        let (loss, evaluate_metrics) =
            self.strategy
                .aggregate_evaluate(round, evaluate_results, failures);

        if let Some((server_loss, _)) = self.strategy.evaluate(round, &self.parameters) {
            info!(target: "fed.engine", round, server_loss, "server-side evaluation");
        }

        info!(
            target: "fed.engine",
            round,
            parameters_updated,
            ?loss,
            failures = fit_failures + evaluate_failures,
            "round complete"
        );
        Ok(RoundOutcome {
            round,
            parameters_updated,
            fit_metrics,
            loss,
            evaluate_metrics,
            failures: fit_failures + evaluate_failures,
        })
    }

    /// Persist one instruction per entry; all writes complete before this
    /// returns, so aggregation can never observe a half-dispatched round.
    fn dispatch(
        &self,
        round: u64,
        task_type: MessageType,
        payloads: Vec<(u64, fed_record::RecordSet)>,
    ) -> Result<Vec<(Uuid, u64)>, EngineError> {
        let mut dispatched = Vec::with_capacity(payloads.len());
        for (node_id, recordset) in payloads {
            let task = TaskIns::new(
                self.run_id,
                round.to_string(),
                0,
                node_id,
                task_type,
                self.task_ttl,
                recordset,
            );
            let task_id = self.state.store_task_ins(task)?;
            dispatched.push((task_id, node_id));
        }
        Ok(dispatched)
    }

    /// Poll the store until every dispatched instruction has a result or
    /// the round deadline passes; missing results become failures.
    async fn collect(&self, dispatched: &[(Uuid, u64)]) -> (Vec<(u64, TaskRes)>, Vec<FailureInfo>) {
        let ins_ids: Vec<Uuid> = dispatched.iter().map(|(id, _)| *id).collect();
        let deadline = Instant::now() + self.round_timeout;
        let mut collected: Vec<TaskRes> = Vec::new();

        while collected.len() < ins_ids.len() && Instant::now() < deadline {
            let got = self
                .state
                .get_task_res(&ins_ids, ins_ids.len() - collected.len());
            collected.extend(got);
            if collected.len() < ins_ids.len() {
                tokio::time::sleep(RESULT_POLL_INTERVAL).await;
            }
        }

        let mut replies = Vec::new();
        let mut failures = Vec::new();
        for (ins_id, node_id) in dispatched {
            match collected.iter().find(|res| res.reply_to == *ins_id) {
                Some(res) => replies.push((*node_id, res.clone())),
                None => failures.push(FailureInfo {
                    node_id: *node_id,
                    reason: "no result before the round deadline".into(),
                }),
            }
        }
        (replies, failures)
    }
}

/// Decode a fit reply, turning an embedded failure status into an error
/// string.
fn decode_fit(res: &TaskRes) -> Result<fed_strategy::FitRes, String> {
    if let Some(status) = extract_status(&res.recordset, "fitres") {
        if status.code != StatusCode::Ok {
            return Err(format!("{}: {}", status.code.as_str(), status.message));
        }
    }
    recordset_to_fit_res(&res.recordset).map_err(|e| e.to_string())
}

/// Decode an evaluate reply, turning an embedded failure status into an
/// error string.
fn decode_evaluate(res: &TaskRes) -> Result<fed_strategy::EvaluateRes, String> {
    if let Some(status) = extract_status(&res.recordset, "evaluateres") {
        if status.code != StatusCode::Ok {
            return Err(format!("{}: {}", status.code.as_str(), status.message));
        }
    }
    recordset_to_evaluate_res(&res.recordset).map_err(|e| e.to_string())
}
