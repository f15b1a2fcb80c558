//! Response correlation loop
//!
//! A single long-lived consumer drains the shared response stream and
//! attaches each result to its originating request. Malformed messages
//! and persistence failures are logged and dropped; neither stops the
//! loop.

use async_nats::jetstream::{self, consumer::PullConsumer};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::client::BrokerClient;
use crate::broker::messages::{CheckResult, RESPONSE_CONSUMER, RESPONSE_STREAM, RESPONSE_SUBJECT};
use crate::store::CheckStore;
use crate::types::{NetcheckError, Result};

/// Messages pulled per fetch
const BATCH_SIZE: usize = 32;

/// Parse raw response bytes and persist them under their originating
/// request, returning the request id they were attached to
pub fn record_response(store: &CheckStore, payload: &[u8]) -> Result<Uuid> {
    let result: CheckResult = serde_json::from_slice(payload)
        .map_err(|e| NetcheckError::BadRequest(format!("Malformed check response: {}", e)))?;

    let request_id = result.request_id;
    store.upsert_response(result)?;
    Ok(request_id)
}

/// Controller-side consumer of the shared response stream
pub struct ResponseCorrelator {
    jetstream: jetstream::Context,
    store: Arc<CheckStore>,
    running: Arc<RwLock<bool>>,
}

impl ResponseCorrelator {
    pub fn new(client: &BrokerClient, store: Arc<CheckStore>) -> Self {
        Self {
            jetstream: client.jetstream().clone(),
            store,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Run the correlation loop until stopped
    pub async fn run(&self) -> Result<()> {
        *self.running.write().await = true;

        let consumer = self.ensure_consumer().await?;

        info!("Response correlator started");

        while *self.running.read().await {
            match self.process_batch(&consumer).await {
                Ok(count) => {
                    if count > 0 {
                        debug!("Correlated {} responses", count);
                    }
                }
                Err(e) => {
                    error!("Error processing response batch: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!("Response correlator stopped");
        Ok(())
    }

    /// Stop the loop after the current batch
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    async fn ensure_consumer(&self) -> Result<PullConsumer> {
        let stream = self.jetstream.get_stream(RESPONSE_STREAM).await.map_err(|e| {
            NetcheckError::Broker(format!(
                "Failed to look up stream {}: {}",
                RESPONSE_STREAM, e
            ))
        })?;

        let consumer = stream
            .get_or_create_consumer(
                RESPONSE_CONSUMER,
                jetstream::consumer::pull::Config {
                    durable_name: Some(RESPONSE_CONSUMER.to_string()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    filter_subject: RESPONSE_SUBJECT.to_string(),
                    max_ack_pending: (BATCH_SIZE * 2) as i64,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| NetcheckError::Broker(format!("Failed to create consumer: {}", e)))?;

        Ok(consumer)
    }

    async fn process_batch(&self, consumer: &PullConsumer) -> Result<usize> {
        let mut messages = consumer
            .fetch()
            .max_messages(BATCH_SIZE)
            .expires(Duration::from_secs(5))
            .messages()
            .await
            .map_err(|e| NetcheckError::Broker(format!("Failed to fetch responses: {}", e)))?;

        let mut count = 0;

        while let Some(msg_result) = messages.next().await {
            match msg_result {
                Ok(msg) => {
                    count += 1;
                    self.process_message(msg).await;
                }
                Err(e) => {
                    warn!("Error receiving response: {}", e);
                }
            }
        }

        Ok(count)
    }

    /// Handle one raw response; failures are logged and the message is
    /// acknowledged anyway so it never blocks the stream
    async fn process_message(&self, msg: jetstream::Message) {
        match record_response(&self.store, &msg.payload) {
            Ok(request_id) => debug!(request_id = %request_id, "Response recorded"),
            Err(e) => error!("Dropping response: {}", e),
        }

        if let Err(e) = msg.ack().await {
            warn!("Failed to ack response: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::messages::RequestType;
    use chrono::Utc;

    fn result_payload(request_id: Uuid, agent_id: Uuid) -> Vec<u8> {
        let result = CheckResult {
            request_id,
            agent_id,
            success: true,
            error: None,
            result: serde_json::json!({ "status_code": 200 }),
            latency_ms: Some(52.3),
            timestamp: Utc::now(),
        };
        serde_json::to_vec(&result).unwrap()
    }

    #[test]
    fn test_malformed_bytes_rejected_without_panic() {
        let store = CheckStore::new();
        assert!(record_response(&store, b"not json at all").is_err());
        assert!(record_response(&store, br#"{"request_id": 7}"#).is_err());
        assert!(record_response(&store, b"").is_err());
    }

    #[test]
    fn test_valid_response_recorded() {
        let store = CheckStore::new();
        let record = store.create(RequestType::Http, "example.com", None);
        let agent_id = Uuid::new_v4();

        let recorded =
            record_response(&store, &result_payload(record.request_id, agent_id)).unwrap();
        assert_eq!(recorded, record.request_id);

        let (_, responses) = store.get(record.request_id).unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].agent_id, agent_id);
    }

    #[test]
    fn test_duplicate_delivery_keeps_single_row() {
        let store = CheckStore::new();
        let record = store.create(RequestType::Http, "example.com", None);
        let agent_id = Uuid::new_v4();
        let payload = result_payload(record.request_id, agent_id);

        record_response(&store, &payload).unwrap();
        record_response(&store, &payload).unwrap();

        let (_, responses) = store.get(record.request_id).unwrap();
        assert_eq!(responses.len(), 1);
    }

    #[test]
    fn test_malformed_message_does_not_block_later_ones() {
        let store = CheckStore::new();
        let record = store.create(RequestType::Http, "example.com", None);

        record_response(&store, &result_payload(record.request_id, Uuid::new_v4())).unwrap();
        assert!(record_response(&store, b"garbage in the stream").is_err());
        record_response(&store, &result_payload(record.request_id, Uuid::new_v4())).unwrap();

        let (_, responses) = store.get(record.request_id).unwrap();
        assert_eq!(responses.len(), 2);
    }

    #[test]
    fn test_response_for_unknown_request_rejected() {
        let store = CheckStore::new();
        let err = record_response(&store, &result_payload(Uuid::new_v4(), Uuid::new_v4()))
            .unwrap_err();
        assert!(matches!(err, NetcheckError::NotFound(_)));
    }
}
