// SPDX-License-Identifier: MIT OR Apache-2.0
//! Store-resident task instruction and result envelopes.

use crate::message::MessageType;
use chrono::{DateTime, Utc};
use fed_record::{ConfigValue, ConfigsRecord, RecordSet};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Outcome classification for a completed (or failed) task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// The task completed normally.
    Ok,
    /// The client application raised an error.
    ExecutionFailed,
    /// The task exceeded its time-to-live.
    TtlExpired,
}

impl StatusCode {
    /// Canonical string tag for this code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::ExecutionFailed => "execution_failed",
            Self::TtlExpired => "ttl_expired",
        }
    }
}

/// A status code with a human-readable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Machine-readable outcome.
    pub code: StatusCode,
    /// Human-readable detail.
    pub message: String,
}

impl Status {
    /// Build a status.
    #[must_use]
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// An `Ok` status with an empty message.
    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }
}

/// Embed a [`Status`] into `recordset` under `<result_name>.status`.
pub fn embed_status(recordset: &mut RecordSet, result_name: &str, status: &Status) {
    let mut rec = ConfigsRecord::new();
    rec.insert("code", status.code.as_str());
    rec.insert("message", status.message.clone());
    recordset
        .configs_records
        .insert(format!("{result_name}.status"), rec);
}

/// Read a [`Status`] embedded by [`embed_status`], if present.
#[must_use]
pub fn extract_status(recordset: &RecordSet, result_name: &str) -> Option<Status> {
    let rec = recordset
        .configs_records
        .get(&format!("{result_name}.status"))?;
    let code = match rec.get("code")? {
        ConfigValue::Str(s) => match s.as_str() {
            "ok" => StatusCode::Ok,
            "execution_failed" => StatusCode::ExecutionFailed,
            "ttl_expired" => StatusCode::TtlExpired,
            _ => return None,
        },
        _ => return None,
    };
    let message = match rec.get("message") {
        Some(ConfigValue::Str(s)) => s.clone(),
        _ => String::new(),
    };
    Some(Status { code, message })
}

/// A task instruction as persisted in the state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskIns {
    /// Unique task identifier.
    pub task_id: Uuid,
    /// Round bucket (group) identifier.
    pub group_id: String,
    /// Run the task belongs to.
    pub run_id: u64,
    /// Node that produced the instruction (the coordinator).
    pub producer_node_id: u64,
    /// Node that must consume the instruction.
    pub consumer_node_id: u64,
    /// When the instruction was created.
    pub created_at: DateTime<Utc>,
    /// Time-to-live for executing the instruction.
    pub ttl: Option<Duration>,
    /// What the consumer is asked to do.
    pub task_type: MessageType,
    /// Typed payload.
    pub recordset: RecordSet,
}

impl TaskIns {
    /// Build a new instruction addressed to `consumer_node_id`.
    #[must_use]
    pub fn new(
        run_id: u64,
        group_id: impl Into<String>,
        producer_node_id: u64,
        consumer_node_id: u64,
        task_type: MessageType,
        ttl: Option<Duration>,
        recordset: RecordSet,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            group_id: group_id.into(),
            run_id,
            producer_node_id,
            consumer_node_id,
            created_at: Utc::now(),
            ttl,
            task_type,
            recordset,
        }
    }
}

/// A task result as persisted in the state store.
///
/// Carries a reference (`reply_to`) to the [`TaskIns`] it satisfies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRes {
    /// Unique result identifier.
    pub task_id: Uuid,
    /// Identifier of the instruction this result satisfies.
    pub reply_to: Uuid,
    /// Round bucket (group) identifier.
    pub group_id: String,
    /// Run the result belongs to.
    pub run_id: u64,
    /// Node that produced the result.
    pub producer_node_id: u64,
    /// Node the result is addressed to (the coordinator).
    pub consumer_node_id: u64,
    /// When the result was created.
    pub created_at: DateTime<Utc>,
    /// Task type the result answers.
    pub task_type: MessageType,
    /// Typed payload.
    pub recordset: RecordSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_embeds_and_extracts() {
        let mut rs = RecordSet::new();
        let status = Status::new(StatusCode::ExecutionFailed, "client app panicked");
        embed_status(&mut rs, "fitres", &status);

        assert!(rs.configs_records.contains_key("fitres.status"));
        let back = extract_status(&rs, "fitres").unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn extract_status_on_missing_record_is_none() {
        let rs = RecordSet::new();
        assert!(extract_status(&rs, "fitres").is_none());
    }

    #[test]
    fn task_ins_carries_envelope_fields() {
        let ins = TaskIns::new(
            1,
            "round-0",
            0,
            9,
            MessageType::Fit,
            Some(Duration::from_secs(10)),
            RecordSet::new(),
        );
        assert_eq!(ins.consumer_node_id, 9);
        assert_eq!(ins.producer_node_id, 0);
        assert_eq!(ins.task_type, MessageType::Fit);
        assert_eq!(ins.ttl, Some(Duration::from_secs(10)));
    }
}
