//! In-memory queue broker.
//!
//! Backs local development and the integration tests. The capacity ceiling is
//! enforced under the same lock as the enqueue, which is exactly the atomicity
//! the port contract demands. Test helpers can flip entry states, drop entries
//! (simulating broker garbage collection or loss), and take the whole broker
//! offline.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::models::QueueClass;
use crate::domain::ports::{
    BrokerError, EntryProbe, EntryState, QueueBroker, QueuePayload, SubmitReceipt,
};

struct StoredEntry {
    state: EntryState,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<QueueClass, HashMap<Uuid, StoredEntry>>,
    next_position: HashMap<QueueClass, i64>,
    unreachable: bool,
}

/// In-memory broker with atomic capacity enforcement.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    /// State newly accepted entries land in. `Active` models a broker
    /// without a reservation concept; `Waiting` models one with positions.
    accept_state: EntryState,
}

impl InMemoryBroker {
    pub fn new(classes: impl IntoIterator<Item = QueueClass>) -> Self {
        let mut state = BrokerState::default();
        for class in classes {
            state.queues.entry(class).or_default();
        }
        Self {
            state: Arc::new(Mutex::new(state)),
            accept_state: EntryState::Active,
        }
    }

    /// Accept entries into `Waiting` with a queue position instead of
    /// straight into `Active`.
    pub fn with_reservation(mut self) -> Self {
        self.accept_state = EntryState::Waiting;
        self
    }

    /// Simulate total broker outage; every operation fails with
    /// `BrokerError::Unreachable` until restored.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().await.unreachable = unreachable;
    }

    /// Move an entry to a new state wherever it lives.
    pub async fn set_entry_state(&self, run_id: Uuid, new_state: EntryState) {
        let mut state = self.state.lock().await;
        for queue in state.queues.values_mut() {
            if let Some(entry) = queue.get_mut(&run_id) {
                entry.state = new_state;
            }
        }
    }

    /// Drop an entry entirely, as the broker does once it garbage-collects
    /// a finished job (or silently loses one).
    pub async fn remove_entry(&self, run_id: Uuid) {
        let mut state = self.state.lock().await;
        for queue in state.queues.values_mut() {
            queue.remove(&run_id);
        }
    }

    async fn guard_reachable(&self) -> Result<tokio::sync::MutexGuard<'_, BrokerState>, BrokerError>
    {
        let state = self.state.lock().await;
        if state.unreachable {
            return Err(BrokerError::Unreachable(
                "in-memory broker taken offline".to_string(),
            ));
        }
        Ok(state)
    }
}

fn live_count(queue: &HashMap<Uuid, StoredEntry>) -> u64 {
    queue.values().filter(|e| e.state.is_live()).count() as u64
}

#[async_trait]
impl QueueBroker for InMemoryBroker {
    async fn submit(
        &self,
        payload: &QueuePayload,
        class: &QueueClass,
        ceiling: Option<u64>,
    ) -> Result<SubmitReceipt, BrokerError> {
        let mut state = self.guard_reachable().await?;

        let queue = state.queues.entry(class.clone()).or_default();
        let outstanding = live_count(queue);
        if let Some(ceiling) = ceiling {
            if outstanding >= ceiling {
                return Err(BrokerError::CapacityExceeded {
                    class: class.clone(),
                    reason: format!("{outstanding} of {ceiling} slots taken"),
                });
            }
        }

        let position = {
            let counter = state.next_position.entry(class.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        let accept_state = self.accept_state;
        state
            .queues
            .entry(class.clone())
            .or_default()
            .insert(payload.run_id, StoredEntry { state: accept_state });

        Ok(SubmitReceipt {
            state: accept_state,
            position: (accept_state == EntryState::Waiting).then_some(position),
        })
    }

    async fn probe(&self, run_id: Uuid, class: &QueueClass) -> Result<EntryProbe, BrokerError> {
        let state = self.guard_reachable().await?;
        let probe = state
            .queues
            .get(class)
            .and_then(|queue| queue.get(&run_id))
            .map_or_else(EntryProbe::absent, |entry| EntryProbe::in_state(entry.state));
        Ok(probe)
    }

    async fn outstanding(&self, class: &QueueClass) -> Result<u64, BrokerError> {
        let state = self.guard_reachable().await?;
        Ok(state.queues.get(class).map_or(0, live_count))
    }

    async fn classes(&self) -> Result<Vec<QueueClass>, BrokerError> {
        let state = self.guard_reachable().await?;
        Ok(state.queues.keys().cloned().collect())
    }
}
