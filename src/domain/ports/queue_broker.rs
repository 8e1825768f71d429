//! Queue broker port.
//!
//! The broker owns transient queue state; vigil only ever submits entries and
//! probes for their existence. Implementations pool connections internally but
//! expose this narrow contract so the core is testable without a live broker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::QueueClass;

/// Broker-side state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Waiting for a worker
    Waiting,
    /// Picked up by a worker
    Active,
    /// Scheduled for later
    Delayed,
    /// Finished; the broker will garbage-collect it
    Completed,
    /// Failed broker-side
    Failed,
    /// The broker reported a state this crate does not model
    Unknown,
}

impl EntryState {
    /// Whether an entry in this state counts as alive for reconciliation and
    /// capacity accounting.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Waiting | Self::Active | Self::Delayed)
    }
}

/// Result of one existence probe in one queue class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryProbe {
    /// Whether the class knows the entry at all
    pub found: bool,
    /// The entry's state when found
    pub state: EntryState,
}

impl EntryProbe {
    /// A definitive "this class does not hold the entry".
    pub fn absent() -> Self {
        Self {
            found: false,
            state: EntryState::Unknown,
        }
    }

    pub fn in_state(state: EntryState) -> Self {
        Self { found: true, state }
    }

    /// Whether the probe saw a live entry.
    pub fn is_live(&self) -> bool {
        self.found && self.state.is_live()
    }
}

/// Broker response to a successful submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// State the entry landed in
    pub state: EntryState,
    /// Queue position, for brokers with a reservation concept
    pub position: Option<i64>,
}

/// Payload handed to the broker for one run.
///
/// Script bodies here are already resolved; the payload exists only in memory
/// and on the broker, never in the run store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePayload {
    /// Run id, doubling as the broker message id
    pub run_id: Uuid,
    /// Owning job
    pub job_id: Uuid,
    /// Engine the workers should execute with
    pub engine: String,
    /// Resolved script bodies, in execution order
    pub scripts: Vec<QueueScript>,
    /// Location routing hint
    pub location: Option<String>,
}

/// One resolved script inside a queue payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueScript {
    pub id: Uuid,
    pub name: String,
    pub body: String,
    pub declared_type: Option<String>,
}

/// Errors from broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The class ceiling was hit during the atomic enqueue check.
    /// Surfaced to callers as a retryable capacity condition, never a 500.
    #[error("queue {class} at capacity: {reason}")]
    CapacityExceeded { class: QueueClass, reason: String },

    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("broker request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("broker protocol error: {0}")]
    Protocol(String),
}

impl BrokerError {
    /// Whether the error indicates the broker could not be consulted at all,
    /// as opposed to answering definitively.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_))
    }
}

/// Port to the queue broker.
#[async_trait]
pub trait QueueBroker: Send + Sync {
    /// Enqueue a payload onto a class.
    ///
    /// When `ceiling` is set the broker must enforce it atomically with the
    /// enqueue: a check-then-enqueue that is not atomic races under
    /// concurrent load. Returns `BrokerError::CapacityExceeded` on rejection.
    async fn submit(
        &self,
        payload: &QueuePayload,
        class: &QueueClass,
        ceiling: Option<u64>,
    ) -> Result<SubmitReceipt, BrokerError>;

    /// Probe one class for an entry. A clean `found: false` answer is
    /// definitive for that class; transport errors are not.
    async fn probe(&self, run_id: Uuid, class: &QueueClass) -> Result<EntryProbe, BrokerError>;

    /// Outstanding (waiting + active + delayed) entries in a class.
    async fn outstanding(&self, class: &QueueClass) -> Result<u64, BrokerError>;

    /// Every queue class this broker currently routes. The reconciler fans
    /// probes out across all of them since a run's class may be stale.
    async fn classes(&self) -> Result<Vec<QueueClass>, BrokerError>;
}
