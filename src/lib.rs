// SPDX-License-Identifier: MIT OR Apache-2.0
//! fedsim
//!
//! A federated learning coordination runtime: a single-process engine
//! that schedules simulated client nodes over disjoint data partitions,
//! coordinated by a pluggable aggregation strategy across rounds.
//!
//! This facade re-exports the member crates:
//! - [`record`]: typed record containers ([`record::RecordSet`] and friends)
//! - [`task`]: message and task envelopes
//! - [`state`]: the in-memory task store and context registry
//! - [`partition`]: dataset partitioners
//! - [`strategy`]: the aggregation protocol, FedAvg, and the DP wrapper
//! - [`engine`]: the virtual client engine and round driver

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use fed_engine as engine;
pub use fed_partition as partition;
pub use fed_record as record;
pub use fed_state as state;
pub use fed_strategy as strategy;
pub use fed_task as task;

pub use fed_engine::{
    ClientApp, ClientAppCallable, ClientAppRegistry, Context, EngineConfig, RoundDriver,
    ShutdownSignal, VirtualClientEngine,
};
pub use fed_record::RecordSet;
pub use fed_state::{InMemoryState, NodeContextRegistry, StateStore};
pub use fed_strategy::{DpServerFixedClipping, FedAvg, Strategy};
pub use fed_task::{Message, MessageType, Parameters};
