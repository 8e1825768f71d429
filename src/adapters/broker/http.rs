//! HTTP client for a queue daemon.
//!
//! Talks to the broker's REST surface. Submits are never retried (the daemon
//! enforces the capacity ceiling atomically per request); read-only probes
//! and stats retry briefly on transport failures since the reconciler treats
//! a clean answer very differently from an unreachable partition.

use std::time::Duration;

use backoff::ExponentialBackoff;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use async_trait::async_trait;

use crate::domain::models::{BrokerConfig, QueueClass};
use crate::domain::ports::{
    BrokerError, EntryProbe, EntryState, QueueBroker, QueuePayload, SubmitReceipt,
};

#[derive(Debug, Clone)]
pub struct HttpQueueBroker {
    http: Client,
    base_url: String,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    payload: &'a QueuePayload,
    ceiling: Option<u64>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    state: EntryState,
    position: Option<i64>,
}

#[derive(Deserialize)]
struct CapacityResponse {
    reason: String,
}

#[derive(Deserialize)]
struct ProbeResponse {
    found: bool,
    state: Option<EntryState>,
}

#[derive(Deserialize)]
struct StatsResponse {
    outstanding: u64,
}

#[derive(Deserialize)]
struct ClassesResponse {
    classes: Vec<String>,
}

impl HttpQueueBroker {
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BrokerError::Protocol(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
        })
    }

    fn map_transport(&self, err: reqwest::Error) -> BrokerError {
        if err.is_timeout() {
            BrokerError::Timeout(self.request_timeout)
        } else if err.is_connect() {
            BrokerError::Unreachable(err.to_string())
        } else {
            BrokerError::Protocol(err.to_string())
        }
    }

    /// Short retry loop for read-only requests. Transport errors are retried,
    /// definitive answers and protocol errors are not.
    async fn get_with_retry<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
    ) -> Result<Option<T>, BrokerError> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_elapsed_time: Some(Duration::from_secs(2)),
            ..ExponentialBackoff::default()
        };

        backoff::future::retry(policy, || async {
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| match self.map_transport(e) {
                    err if err.is_transport() => backoff::Error::transient(err),
                    err => backoff::Error::permanent(err),
                })?;

            match response.status() {
                StatusCode::NOT_FOUND => Ok(None),
                status if status.is_success() => {
                    let body = response.json::<T>().await.map_err(|e| {
                        backoff::Error::permanent(BrokerError::Protocol(e.to_string()))
                    })?;
                    Ok(Some(body))
                }
                status => Err(backoff::Error::permanent(BrokerError::Protocol(format!(
                    "unexpected status {status} from {url}"
                )))),
            }
        })
        .await
    }
}

#[async_trait]
impl QueueBroker for HttpQueueBroker {
    async fn submit(
        &self,
        payload: &QueuePayload,
        class: &QueueClass,
        ceiling: Option<u64>,
    ) -> Result<SubmitReceipt, BrokerError> {
        let url = format!("{}/queues/{}/entries", self.base_url, class);
        let response = self
            .http
            .post(&url)
            .json(&SubmitRequest { payload, ceiling })
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let reason = response
                    .json::<CapacityResponse>()
                    .await
                    .map(|c| c.reason)
                    .unwrap_or_else(|_| "queue at capacity".to_string());
                Err(BrokerError::CapacityExceeded {
                    class: class.clone(),
                    reason,
                })
            }
            status if status.is_success() => {
                let body = response
                    .json::<SubmitResponse>()
                    .await
                    .map_err(|e| BrokerError::Protocol(e.to_string()))?;
                Ok(SubmitReceipt {
                    state: body.state,
                    position: body.position,
                })
            }
            status => Err(BrokerError::Protocol(format!(
                "unexpected status {status} from {url}"
            ))),
        }
    }

    async fn probe(&self, run_id: Uuid, class: &QueueClass) -> Result<EntryProbe, BrokerError> {
        let url = format!("{}/queues/{}/entries/{}", self.base_url, class, run_id);
        match self.get_with_retry::<ProbeResponse>(url).await? {
            // 404 from a healthy daemon is a definitive "not here".
            None => Ok(EntryProbe::absent()),
            Some(body) if body.found => Ok(EntryProbe::in_state(
                body.state.unwrap_or(EntryState::Unknown),
            )),
            Some(_) => Ok(EntryProbe::absent()),
        }
    }

    async fn outstanding(&self, class: &QueueClass) -> Result<u64, BrokerError> {
        let url = format!("{}/queues/{}/stats", self.base_url, class);
        match self.get_with_retry::<StatsResponse>(url).await? {
            Some(stats) => Ok(stats.outstanding),
            None => Ok(0),
        }
    }

    async fn classes(&self) -> Result<Vec<QueueClass>, BrokerError> {
        let url = format!("{}/queues", self.base_url);
        match self.get_with_retry::<ClassesResponse>(url).await? {
            Some(body) => Ok(body
                .classes
                .iter()
                .map(|c| QueueClass::parse(c))
                .collect()),
            None => Ok(vec![]),
        }
    }
}
