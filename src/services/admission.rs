//! Capacity Admission Controller.
//!
//! Read-only check of broker load against a per-class ceiling. The decision
//! is advisory: the enforcing check runs atomically inside the broker's
//! enqueue, since check-then-enqueue without atomicity races under concurrent
//! load. This controller exists to reject obviously-full classes before a
//! payload is built, and to give callers a position estimate.

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::domain::models::{CapacityConfig, QueueClass};
use crate::domain::ports::{BrokerError, QueueBroker};

/// Outcome of an admission check. Ephemeral: consumed once by the dispatcher,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Room in the class; `position` is the depth the entry would land at.
    Admitted { position: u64 },
    /// Class at or above its ceiling. Retryable, client-visible.
    Rejected { reason: String },
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

/// Checks outstanding load for a queue class against its configured ceiling.
pub struct AdmissionController {
    broker: Arc<dyn QueueBroker>,
    capacity: CapacityConfig,
}

impl AdmissionController {
    pub fn new(broker: Arc<dyn QueueBroker>, capacity: CapacityConfig) -> Self {
        Self { broker, capacity }
    }

    /// Ceiling configured for a class.
    pub fn ceiling_for(&self, class: &QueueClass) -> u64 {
        self.capacity.ceiling_for(class.as_str())
    }

    /// Compare current outstanding load (queued + active) against the class
    /// ceiling. Never admits at or above the ceiling.
    #[instrument(skip(self), fields(class = %class), err)]
    pub async fn admit(&self, class: &QueueClass) -> Result<AdmissionDecision, BrokerError> {
        let ceiling = self.ceiling_for(class);
        let outstanding = self.broker.outstanding(class).await?;

        if outstanding >= ceiling {
            debug!(outstanding, ceiling, "admission rejected");
            return Ok(AdmissionDecision::Rejected {
                reason: format!(
                    "queue {class} has {outstanding} outstanding runs (ceiling {ceiling})"
                ),
            });
        }

        Ok(AdmissionDecision::Admitted {
            position: outstanding + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::broker::InMemoryBroker;
    use crate::domain::ports::QueuePayload;
    use uuid::Uuid;

    fn capacity(default_ceiling: u64) -> CapacityConfig {
        CapacityConfig {
            default_ceiling,
            per_class: std::collections::HashMap::new(),
        }
    }

    fn payload() -> QueuePayload {
        QueuePayload {
            run_id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            engine: "browser".to_string(),
            scripts: vec![],
            location: None,
        }
    }

    #[tokio::test]
    async fn test_admits_below_ceiling() {
        let broker = Arc::new(InMemoryBroker::new([QueueClass::browser()]));
        let controller = AdmissionController::new(broker, capacity(5));

        let decision = controller.admit(&QueueClass::browser()).await.unwrap();
        assert_eq!(decision, AdmissionDecision::Admitted { position: 1 });
    }

    #[tokio::test]
    async fn test_rejects_at_ceiling() {
        let broker = Arc::new(InMemoryBroker::new([QueueClass::browser()]));
        broker
            .submit(&payload(), &QueueClass::browser(), None)
            .await
            .unwrap();

        let controller = AdmissionController::new(broker, capacity(1));
        let decision = controller.admit(&QueueClass::browser()).await.unwrap();

        match decision {
            AdmissionDecision::Rejected { reason } => {
                assert!(reason.contains("ceiling 1"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_per_class_ceiling_override() {
        let class = QueueClass::load_test(Some("eu-west"));
        let broker = Arc::new(InMemoryBroker::new([class.clone()]));
        broker.submit(&payload(), &class, None).await.unwrap();

        let mut config = capacity(64);
        config.per_class.insert(class.as_str().to_string(), 1);
        let controller = AdmissionController::new(broker, config);

        let decision = controller.admit(&class).await.unwrap();
        assert!(!decision.is_admitted());
    }

    #[tokio::test]
    async fn test_broker_failure_propagates() {
        let broker = Arc::new(InMemoryBroker::new([QueueClass::browser()]));
        broker.set_unreachable(true).await;

        let controller = AdmissionController::new(broker, capacity(5));
        assert!(controller.admit(&QueueClass::browser()).await.is_err());
    }
}
