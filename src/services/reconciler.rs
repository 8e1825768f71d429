//! Queue-State Reconciler.
//!
//! Audits every run recorded as `running` against live broker state and
//! repairs records whose broker-side entry has silently disappeared. The
//! queue and the database fail independently, so neither absence signal is
//! trusted alone: a run is only declared lost when no partition reports it
//! live, at least one partition answered definitively, and the run is older
//! than its execution window. A fully unreachable broker changes nothing.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::{QueueClass, ReconcilerConfig, Run, RunStatus};
use crate::domain::ports::{
    CompletionSource, Finalization, QueueBroker, RunCompleted, RunEventSink, RunRepository,
};

/// Detail recorded on runs whose queue entry vanished.
pub const LOST_DETAIL: &str = "not found in execution queue";

/// Detail recorded on runs still queued broker-side past the window.
pub const TIMEOUT_DETAIL: &str = "no completion signal within execution window";

/// Counts reported by one reconciliation pass, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Runs in `running` at the start of the pass
    pub inspected: usize,
    /// Runs moved to a terminal state by this pass
    pub corrected: usize,
}

/// What the probe fan-out concluded about one run.
enum AuditVerdict {
    /// Some partition reported the entry waiting/active/delayed
    Live,
    /// No live sighting, and at least one partition answered definitively
    Absent,
    /// Every probe errored or the deadline passed with no definitive answer
    Inconclusive,
}

/// Audits `running` records against broker state.
pub struct QueueReconciler {
    runs: Arc<dyn RunRepository>,
    broker: Arc<dyn QueueBroker>,
    events: Arc<dyn RunEventSink>,
    config: ReconcilerConfig,
}

impl QueueReconciler {
    pub fn new(
        runs: Arc<dyn RunRepository>,
        broker: Arc<dyn QueueBroker>,
        events: Arc<dyn RunEventSink>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            runs,
            broker,
            events,
            config,
        }
    }

    /// One reconciliation pass.
    #[instrument(skip(self), err)]
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let running = self
            .runs
            .list_by_status(RunStatus::Running)
            .await
            .context("Failed to fetch running runs")?;

        if running.is_empty() {
            return Ok(ReconcileReport::default());
        }
        let inspected = running.len();

        // A run's recorded class can be stale (queues get re-partitioned),
        // so probes fan out across everything the broker currently routes.
        let classes = match self.broker.classes().await {
            Ok(classes) => classes,
            Err(err) => {
                warn!(%err, inspected, "broker unreachable, reconciliation pass fails open");
                return Ok(ReconcileReport {
                    inspected,
                    corrected: 0,
                });
            }
        };

        let now = Utc::now();
        let classes = &classes;
        let verdicts: Vec<(Run, AuditVerdict)> = stream::iter(running)
            .map(|run| async move {
                let verdict = self.audit_run(&run, classes).await;
                (run, verdict)
            })
            .buffer_unordered(self.config.audit_concurrency.max(1))
            .collect()
            .await;

        let mut lost: Vec<Uuid> = Vec::new();
        let mut overdue_live: Vec<Uuid> = Vec::new();
        for (run, verdict) in verdicts {
            let window = self.config.execution_window_for(run.queue_class.as_str());
            let overdue = run.age(now) > window;
            match verdict {
                AuditVerdict::Live if overdue => overdue_live.push(run.id),
                AuditVerdict::Live => {}
                AuditVerdict::Absent if overdue => lost.push(run.id),
                AuditVerdict::Absent => {
                    // Young and missing: a probe race or broker restart, not
                    // proof of loss. The next overdue pass will catch it.
                    debug!(run_id = %run.id, "entry missing but run below age gate");
                }
                AuditVerdict::Inconclusive => {
                    warn!(run_id = %run.id, "no definitive probe answer, leaving run untouched");
                }
            }
        }

        let mut corrected = 0;
        corrected += self
            .correct(&lost, RunStatus::Error, LOST_DETAIL)
            .await
            .context("Failed to finalize lost runs")?;
        corrected += self
            .correct(&overdue_live, RunStatus::Timeout, TIMEOUT_DETAIL)
            .await
            .context("Failed to finalize timed-out runs")?;

        if corrected > 0 {
            info!(inspected, corrected, "reconciliation corrected diverged runs");
        }
        Ok(ReconcileReport {
            inspected,
            corrected,
        })
    }

    /// Reconcile on a fixed interval until the task is aborted.
    pub async fn run_forever(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.reconcile().await {
                Ok(report) if report.inspected > 0 => {
                    debug!(
                        inspected = report.inspected,
                        corrected = report.corrected,
                        "reconciliation pass finished"
                    );
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "reconciliation pass failed"),
            }
        }
    }

    /// Probe every plausible partition for one run, first live sighting wins.
    ///
    /// The fan-out shares a result latch: the first positive probe returns
    /// immediately and the remaining futures are dropped (cancelled). The
    /// whole race is bounded by the configured probe deadline so one
    /// unreachable partition cannot stall the pass.
    async fn audit_run(&self, run: &Run, classes: &[QueueClass]) -> AuditVerdict {
        let mut probe_classes: Vec<QueueClass> = classes.to_vec();
        if !probe_classes.contains(&run.queue_class) {
            probe_classes.push(run.queue_class.clone());
        }

        let definitive = AtomicBool::new(false);
        let race = async {
            let mut probes: FuturesUnordered<_> = probe_classes
                .iter()
                .map(|class| self.broker.probe(run.id, class))
                .collect();

            while let Some(result) = probes.next().await {
                match result {
                    Ok(probe) if probe.is_live() => return true,
                    Ok(_) => {
                        definitive.store(true, Ordering::Relaxed);
                    }
                    Err(err) => {
                        debug!(run_id = %run.id, %err, "probe failed");
                    }
                }
            }
            false
        };

        match tokio::time::timeout(self.config.probe_timeout(), race).await {
            Ok(true) => AuditVerdict::Live,
            Ok(false) | Err(_) => {
                if definitive.load(Ordering::Relaxed) {
                    AuditVerdict::Absent
                } else {
                    AuditVerdict::Inconclusive
                }
            }
        }
    }

    /// Batched, guarded correction: one statement moves every id still in
    /// `running`; rows a worker settled mid-pass are skipped by the guard.
    async fn correct(&self, ids: &[Uuid], status: RunStatus, detail: &str) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let finalization = Finalization::new(status, Some(detail.to_string()));
        let moved = self.runs.finalize_batch(ids, &finalization).await? as usize;

        for id in ids {
            match self.runs.get(*id).await {
                // Publish only for rows this pass actually moved; anything
                // else was settled by a racing writer that already published.
                Ok(Some(run)) if run.status == status => {
                    self.events
                        .run_completed(RunCompleted::from_run(&run, CompletionSource::Reconciler))
                        .await;
                }
                Ok(_) => {}
                Err(err) => warn!(run_id = %id, %err, "failed to load corrected run"),
            }
        }

        Ok(moved)
    }
}
