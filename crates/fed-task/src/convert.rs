// SPDX-License-Identifier: MIT OR Apache-2.0
//! Conversions between records, flattened parameters, messages, and tasks.
//!
//! The record→parameters round trip is lossy in metadata but exact in
//! bytes: blob order and content survive, per-tensor dtype and shape do
//! not.

use crate::message::{Message, Metadata};
use crate::task::{TaskIns, TaskRes};
use crate::Parameters;
use chrono::Utc;
use fed_record::{Array, ParametersRecord};
use uuid::Uuid;

/// Flatten a [`ParametersRecord`] into [`Parameters`], cloning the blobs.
///
/// Blobs appear in insertion order. The common tensor-type tag is copied
/// from the first array's `stype`; an empty record yields an empty tag.
#[must_use]
pub fn parameters_record_to_parameters(record: &ParametersRecord) -> Parameters {
    let tensor_type = record
        .iter()
        .next()
        .map(|(_, array)| array.stype.clone())
        .unwrap_or_default();
    Parameters {
        tensors: record.iter().map(|(_, array)| array.data.clone()).collect(),
        tensor_type,
    }
}

/// Consuming variant of [`parameters_record_to_parameters`]: drains the
/// record, avoiding blob copies.
#[must_use]
pub fn parameters_record_into_parameters(mut record: ParametersRecord) -> Parameters {
    let tensor_type = record
        .iter()
        .next()
        .map(|(_, array)| array.stype.clone())
        .unwrap_or_default();
    let mut tensors = Vec::with_capacity(record.len());
    while let Some((_, array)) = record.pop_first() {
        tensors.push(array.data);
    }
    Parameters {
        tensors,
        tensor_type,
    }
}

/// Rebuild a [`ParametersRecord`] from flattened [`Parameters`].
///
/// Keys are the stringified indices `"0"`, `"1"`, …; every array receives
/// the common tensor-type tag as its `stype`; dtype and shape are empty
/// (unrecoverable).
#[must_use]
pub fn parameters_to_parameters_record(parameters: &Parameters) -> ParametersRecord {
    parameters_into_parameters_record(parameters.clone())
}

/// Consuming variant of [`parameters_to_parameters_record`]: drains the
/// tensor list from the front.
#[must_use]
pub fn parameters_into_parameters_record(parameters: Parameters) -> ParametersRecord {
    let Parameters {
        tensors,
        tensor_type,
    } = parameters;
    tensors
        .into_iter()
        .enumerate()
        .map(|(idx, data)| {
            (
                idx.to_string(),
                Array::from_blob(tensor_type.clone(), data),
            )
        })
        .collect()
}

/// Turn a stored [`TaskIns`] into an in-memory [`Message`].
///
/// When `override_node_id` is set it replaces the destination node id in
/// the metadata; the scheduler passes the destination's **partition index**
/// here so an identically-coded client selects its data slice.
#[must_use]
pub fn message_from_task_ins(task: &TaskIns, override_node_id: Option<u64>) -> Message {
    Message {
        metadata: Metadata {
            run_id: task.run_id,
            message_id: task.task_id,
            group_id: task.group_id.clone(),
            src_node_id: task.producer_node_id,
            dst_node_id: override_node_id.unwrap_or(task.consumer_node_id),
            ttl: task.ttl,
            message_type: task.task_type,
        },
        content: task.recordset.clone(),
    }
}

/// Embed a reply [`Message`] into a [`TaskRes`] answering `reply_to`.
///
/// `producer_node_id` stamps the node that actually executed the task;
/// the message's destination (the coordinator after the reply swap)
/// becomes the result's consumer.
#[must_use]
pub fn task_res_from_message(message: Message, reply_to: Uuid, producer_node_id: u64) -> TaskRes {
    TaskRes {
        task_id: Uuid::new_v4(),
        reply_to,
        group_id: message.metadata.group_id,
        run_id: message.metadata.run_id,
        producer_node_id,
        consumer_node_id: message.metadata.dst_node_id,
        created_at: Utc::now(),
        task_type: message.metadata.message_type,
        recordset: message.content,
    }
}
