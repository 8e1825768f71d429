//! Completion event sinks.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::ports::{RunCompleted, RunEventSink};

/// Default sink: structured log lines. External delivery (email, webhooks)
/// subscribes to these events out-of-process.
#[derive(Debug, Default, Clone)]
pub struct LogEventSink;

#[async_trait]
impl RunEventSink for LogEventSink {
    async fn run_completed(&self, event: RunCompleted) {
        tracing::info!(
            run_id = %event.run_id,
            job_id = %event.job_id,
            status = event.status.as_str(),
            source = ?event.source,
            error_detail = event.error_detail.as_deref().unwrap_or(""),
            "run completed"
        );
    }
}

/// Test sink that records every event it receives.
#[derive(Debug, Default, Clone)]
pub struct CaptureEventSink {
    events: Arc<Mutex<Vec<RunCompleted>>>,
}

impl CaptureEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub async fn events(&self) -> Vec<RunCompleted> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl RunEventSink for CaptureEventSink {
    async fn run_completed(&self, event: RunCompleted) {
        self.events.lock().await.push(event);
    }
}
