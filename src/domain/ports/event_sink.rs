//! Run completion event port.
//!
//! Every terminal transition is published here so external consumers
//! (notification delivery, the owning job's record) can observe completions
//! without polling the run table.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{Run, RunStatus};

/// Why a run reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSource {
    /// A worker reported an execution outcome
    Worker,
    /// The dispatch path failed before or during submission
    Dispatch,
    /// The reconciler detected broker-side loss
    Reconciler,
}

/// One run-completion event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCompleted {
    pub run_id: Uuid,
    pub job_id: Uuid,
    pub status: RunStatus,
    pub source: CompletionSource,
    pub error_detail: Option<String>,
}

impl RunCompleted {
    /// Build an event from a finalized run.
    pub fn from_run(run: &Run, source: CompletionSource) -> Self {
        Self {
            run_id: run.id,
            job_id: run.job_id,
            status: run.status,
            source,
            error_detail: run.error_detail.clone(),
        }
    }
}

/// Port for publishing completion events. Delivery is fire-and-forget; sinks
/// must not fail the transition that produced the event.
#[async_trait]
pub trait RunEventSink: Send + Sync {
    async fn run_completed(&self, event: RunCompleted);
}
