//! Check execution worker
//!
//! Each worker binds the agent's durable consumer and pulls dispatches
//! in small batches. Workers share one consumer, so the stream splits
//! between them and the durable cursor survives agent restarts.

use async_nats::jetstream::{self, consumer::pull, consumer::Consumer};
use bytes::Bytes;
use chrono::Utc;
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::messages::{BrokerCredentials, CheckDispatch, CheckResult};
use crate::broker::{BrokerClient, DISPATCH_STREAM};
use crate::checker::{run_check, CheckerSet};
use crate::types::{NetcheckError, Result};

/// Dispatches pulled per batch
const BATCH_SIZE: usize = 8;

/// How long a fetch waits when the queue is empty
const FETCH_EXPIRES: Duration = Duration::from_secs(5);

/// Execute one dispatch payload, if it is executable
///
/// Malformed payloads and types with no checker yield no result; the
/// caller still acks so the message is not redelivered forever.
pub(crate) async fn handle_dispatch(
    checkers: &CheckerSet,
    agent_id: Uuid,
    check_timeout: Duration,
    payload: &[u8],
) -> Option<CheckResult> {
    let dispatch: CheckDispatch = match serde_json::from_slice(payload) {
        Ok(dispatch) => dispatch,
        Err(e) => {
            error!(error = %e, "Dropping malformed check dispatch");
            return None;
        }
    };

    let checker = match checkers.resolve(dispatch.request_type) {
        Ok(checker) => checker,
        Err(e) => {
            warn!(request_id = %dispatch.request_id, error = %e, "Dropping check");
            return None;
        }
    };

    let (outcome, latency_ms) = run_check(checker, &dispatch, check_timeout).await;

    Some(CheckResult {
        request_id: dispatch.request_id,
        agent_id,
        success: outcome.success,
        error: outcome.error,
        result: outcome.result.unwrap_or(Value::Null),
        latency_ms,
        timestamp: Utc::now(),
    })
}

pub struct CheckWorker {
    worker_id: usize,
    agent_id: Uuid,
    consumer_name: String,
    response_subject: String,
    broker: BrokerClient,
    checkers: Arc<CheckerSet>,
    check_timeout: Duration,
    running: Arc<RwLock<bool>>,
}

impl CheckWorker {
    pub fn new(
        worker_id: usize,
        agent_id: Uuid,
        credentials: &BrokerCredentials,
        broker: BrokerClient,
        checkers: Arc<CheckerSet>,
        check_timeout: Duration,
        running: Arc<RwLock<bool>>,
    ) -> Self {
        Self {
            worker_id,
            agent_id,
            consumer_name: credentials.consumer_name.clone(),
            response_subject: credentials.response_subject.clone(),
            broker,
            checkers,
            check_timeout,
            running,
        }
    }

    /// Pull and execute dispatches until the agent shuts down
    pub async fn run(&self) -> Result<()> {
        let consumer = self.bind_consumer().await?;
        info!(
            worker_id = self.worker_id,
            consumer = %self.consumer_name,
            "Check worker started"
        );

        while *self.running.read().await {
            match self.process_batch(&consumer).await {
                Ok(_) => {}
                Err(e) => {
                    error!(worker_id = self.worker_id, error = %e, "Batch processing error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!(worker_id = self.worker_id, "Check worker stopped");
        Ok(())
    }

    async fn bind_consumer(&self) -> Result<Consumer<pull::Config>> {
        let stream = self
            .broker
            .jetstream()
            .get_stream(DISPATCH_STREAM)
            .await
            .map_err(|e| NetcheckError::Broker(format!("Failed to open dispatch stream: {}", e)))?;

        stream
            .get_consumer(&self.consumer_name)
            .await
            .map_err(|e| {
                NetcheckError::Broker(format!(
                    "Failed to bind consumer {}: {}",
                    self.consumer_name, e
                ))
            })
    }

    async fn process_batch(&self, consumer: &Consumer<pull::Config>) -> Result<()> {
        let mut messages = consumer
            .fetch()
            .max_messages(BATCH_SIZE)
            .expires(FETCH_EXPIRES)
            .messages()
            .await
            .map_err(|e| NetcheckError::Broker(format!("Failed to fetch dispatches: {}", e)))?;

        while let Some(msg_result) = messages.next().await {
            match msg_result {
                Ok(msg) => self.process_message(msg).await,
                Err(e) => {
                    error!(worker_id = self.worker_id, error = %e, "Error receiving dispatch")
                }
            }
        }

        Ok(())
    }

    async fn process_message(&self, msg: jetstream::Message) {
        if let Some(result) =
            handle_dispatch(&self.checkers, self.agent_id, self.check_timeout, &msg.payload).await
        {
            debug!(
                worker_id = self.worker_id,
                request_id = %result.request_id,
                success = result.success,
                "Check executed"
            );
            self.publish_result(&result).await;
        }

        if let Err(e) = msg.ack().await {
            warn!(worker_id = self.worker_id, error = %e, "Failed to ack dispatch");
        }
    }

    async fn publish_result(&self, result: &CheckResult) {
        let payload = match serde_json::to_vec(result) {
            Ok(payload) => payload,
            Err(e) => {
                error!(worker_id = self.worker_id, error = %e, "Failed to serialize check result");
                return;
            }
        };

        if let Err(e) = self
            .broker
            .publish(&self.response_subject, Bytes::from(payload))
            .await
        {
            error!(worker_id = self.worker_id, error = %e, "Failed to publish check result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::messages::RequestType;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_malformed_dispatch_yields_no_result() {
        let checkers = CheckerSet::new().unwrap();
        let out =
            handle_dispatch(&checkers, Uuid::new_v4(), Duration::from_secs(5), b"not json").await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_type_yields_no_result() {
        let checkers = CheckerSet::new().unwrap();
        let dispatch = CheckDispatch {
            request_id: Uuid::new_v4(),
            request_type: RequestType::Info,
            host: "http://example.com".to_string(),
            port: None,
        };
        let payload = serde_json::to_vec(&dispatch).unwrap();

        let out =
            handle_dispatch(&checkers, Uuid::new_v4(), Duration::from_secs(5), &payload).await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_tcp_dispatch_produces_result() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let agent_id = Uuid::new_v4();

        let dispatch = CheckDispatch {
            request_id: Uuid::new_v4(),
            request_type: RequestType::TcpConnect,
            host: "http://127.0.0.1".to_string(),
            port: Some(port),
        };
        let payload = serde_json::to_vec(&dispatch).unwrap();

        let checkers = CheckerSet::new().unwrap();
        let result = handle_dispatch(&checkers, agent_id, Duration::from_secs(5), &payload)
            .await
            .unwrap();

        assert_eq!(result.request_id, dispatch.request_id);
        assert_eq!(result.agent_id, agent_id);
        assert!(result.success);
        assert_eq!(result.result["connected"], true);
        assert!(result.latency_ms.is_some());
    }
}
