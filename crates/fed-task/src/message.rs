// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory messages and their metadata envelope.

use crate::TaskError;
use fed_record::RecordSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// What a message asks the receiving client application to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Train on the local partition and return updated parameters.
    Fit,
    /// Evaluate the given parameters on the local partition.
    Evaluate,
    /// Return the client's current parameters.
    GetParameters,
    /// Return client properties.
    GetProperties,
}

impl MessageType {
    /// Canonical string tag for this message type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fit => "fit",
            Self::Evaluate => "evaluate",
            Self::GetParameters => "get_parameters",
            Self::GetProperties => "get_properties",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fit" => Ok(Self::Fit),
            "evaluate" => Ok(Self::Evaluate),
            "get_parameters" => Ok(Self::GetParameters),
            "get_properties" => Ok(Self::GetProperties),
            other => Err(TaskError::UnknownMessageType {
                tag: other.to_string(),
            }),
        }
    }
}

/// Envelope fields attached to every [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Run this message belongs to.
    pub run_id: u64,
    /// Unique message identifier.
    pub message_id: Uuid,
    /// Round bucket (group) identifier.
    pub group_id: String,
    /// Node that produced the message.
    pub src_node_id: u64,
    /// Node the message is addressed to.
    ///
    /// Before a message is handed to an actor the scheduler substitutes the
    /// destination's **partition index** here; an identically-coded client
    /// application reads this field to select its data slice.
    pub dst_node_id: u64,
    /// Time-to-live for processing this message.
    pub ttl: Option<Duration>,
    /// What the receiver is asked to do.
    pub message_type: MessageType,
}

/// A unit of communication between the coordinator and a client application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Envelope fields.
    pub metadata: Metadata,
    /// Typed payload.
    pub content: RecordSet,
}

impl Message {
    /// Create a message from metadata and content.
    #[must_use]
    pub fn new(metadata: Metadata, content: RecordSet) -> Self {
        Self { metadata, content }
    }

    /// Build a reply to this message carrying `content`.
    ///
    /// Source and destination nodes are swapped; run, group, ttl, and
    /// message type are inherited; a fresh message id is assigned.
    #[must_use]
    pub fn reply(&self, content: RecordSet) -> Self {
        Self {
            metadata: Metadata {
                run_id: self.metadata.run_id,
                message_id: Uuid::new_v4(),
                group_id: self.metadata.group_id.clone(),
                src_node_id: self.metadata.dst_node_id,
                dst_node_id: self.metadata.src_node_id,
                ttl: self.metadata.ttl,
                message_type: self.metadata.message_type,
            },
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_tags_roundtrip() {
        for mt in [
            MessageType::Fit,
            MessageType::Evaluate,
            MessageType::GetParameters,
            MessageType::GetProperties,
        ] {
            assert_eq!(mt.as_str().parse::<MessageType>().unwrap(), mt);
        }
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let err = "train".parse::<MessageType>().unwrap_err();
        assert!(matches!(err, TaskError::UnknownMessageType { tag } if tag == "train"));
    }

    #[test]
    fn metadata_serde_roundtrip() {
        let metadata = Metadata {
            run_id: 2,
            message_id: Uuid::new_v4(),
            group_id: "round-1".into(),
            src_node_id: 0,
            dst_node_id: 5,
            ttl: Some(Duration::from_millis(250)),
            message_type: MessageType::Evaluate,
        };
        let json = serde_json::to_string(&metadata).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn reply_swaps_endpoints_and_keeps_envelope() {
        let msg = Message::new(
            Metadata {
                run_id: 7,
                message_id: Uuid::new_v4(),
                group_id: "round-3".into(),
                src_node_id: 0,
                dst_node_id: 42,
                ttl: Some(Duration::from_secs(30)),
                message_type: MessageType::Fit,
            },
            RecordSet::new(),
        );
        let reply = msg.reply(RecordSet::new());
        assert_eq!(reply.metadata.src_node_id, 42);
        assert_eq!(reply.metadata.dst_node_id, 0);
        assert_eq!(reply.metadata.run_id, 7);
        assert_eq!(reply.metadata.group_id, "round-3");
        assert_eq!(reply.metadata.message_type, MessageType::Fit);
        assert_ne!(reply.metadata.message_id, msg.metadata.message_id);
    }
}
