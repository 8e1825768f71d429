//! Run domain model.
//!
//! A run is the durable record of one execution attempt of a check. Runs are
//! created at submission time, finalized exactly once, and never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::check::{QueueClass, TriggerSource};

/// Status of a run in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run record exists but the broker has not accepted the task into the
    /// worker pool yet
    Queued,
    /// Task is on the queue or actively executing
    Running,
    /// Worker reported success for every script in the task
    Passed,
    /// A valid execution asserted negatively (at least one script failed)
    Failed,
    /// Execution could not be evaluated at all (platform-side failure)
    Error,
    /// No completion signal within the platform execution window
    Timeout,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "error" => Some(Self::Error),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }

    /// Check if this is a terminal state. Terminal states are sinks.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Error | Self::Timeout)
    }

    /// Valid transitions from this status.
    ///
    /// `Queued -> Failed` is allowed so that admission rejections and broker
    /// submission failures never strand a record that looks alive.
    pub fn valid_transitions(&self) -> Vec<RunStatus> {
        match self {
            Self::Queued => vec![Self::Running, Self::Failed],
            Self::Running => vec![Self::Passed, Self::Failed, Self::Error, Self::Timeout],
            Self::Passed | Self::Failed | Self::Error | Self::Timeout => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Verdict reported by an execution engine for a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// All scripts passed
    Passed,
    /// At least one script execution failed its assertions
    Failed,
    /// The engine could not evaluate the scripts at all
    Error,
}

impl RunOutcome {
    /// The terminal status this outcome maps to.
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Passed => RunStatus::Passed,
            Self::Failed => RunStatus::Failed,
            Self::Error => RunStatus::Error,
        }
    }
}

/// The durable record of one execution attempt.
///
/// The broker message identifier is the run id: a queue entry and its run are
/// addressable by the same UUID. At most one run is ever non-terminal for a
/// given id, enforced by guarded status updates in the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier, also used as the broker message id
    pub id: Uuid,
    /// The job (check definition) this run belongs to
    pub job_id: Uuid,
    /// Current lifecycle status
    pub status: RunStatus,
    /// What initiated the run
    pub trigger: TriggerSource,
    /// Queue class the task was routed to
    pub queue_class: QueueClass,
    /// Broker-assigned queue position, when the broker reports one
    pub queue_position: Option<i64>,
    /// Execution engine metadata (e.g. "browser", "loadtest")
    pub engine: Option<String>,
    /// Geographic location the task was routed to
    pub location: Option<String>,
    /// Failure detail for terminal non-passed runs
    pub error_detail: Option<String>,
    /// When the run was submitted
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration, set together with `completed_at`
    pub duration_ms: Option<i64>,
}

impl Run {
    /// Create a new queued run for a job.
    pub fn new(job_id: Uuid, queue_class: QueueClass, trigger: TriggerSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            status: RunStatus::default(),
            trigger,
            queue_class,
            queue_position: None,
            engine: None,
            location: None,
            error_detail: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        }
    }

    /// Set the execution engine metadata.
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    /// Set the location metadata.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn can_transition_to(&self, new_status: RunStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Apply a status transition in memory.
    ///
    /// Terminal transitions set `completed_at` and the computed duration.
    /// Persistence-side writes additionally guard on the prior status; this
    /// method is the in-memory mirror used before a write.
    pub fn transition_to(&mut self, new_status: RunStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "cannot transition run from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }

        self.status = new_status;
        if new_status.is_terminal() {
            let now = Utc::now();
            self.completed_at = Some(now);
            self.duration_ms = Some((now - self.started_at).num_milliseconds());
        }
        Ok(())
    }

    /// Check if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Age of the run relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.started_at
    }
}
