//! Fanout publishing of check requests

use async_nats::jetstream;
use bytes::Bytes;
use tracing::debug;

use crate::broker::client::BrokerClient;
use crate::broker::messages::{CheckDispatch, DISPATCH_SUBJECT};
use crate::types::{NetcheckError, Result};

/// Publishes check requests onto the dispatch stream
///
/// Each request is published exactly once; the stream fans it out to
/// every agent consumer currently bound. No per-agent delivery
/// acknowledgment is surfaced to the caller, only the stream's own
/// acceptance of the message.
#[derive(Clone)]
pub struct CheckPublisher {
    jetstream: jetstream::Context,
}

impl CheckPublisher {
    pub fn new(client: &BrokerClient) -> Self {
        Self {
            jetstream: client.jetstream().clone(),
        }
    }

    /// Publish one check request to the fleet
    pub async fn publish(&self, dispatch: &CheckDispatch) -> Result<()> {
        let payload = serde_json::to_vec(dispatch)?;

        let ack = self
            .jetstream
            .publish(DISPATCH_SUBJECT, Bytes::from(payload))
            .await
            .map_err(|e| NetcheckError::Broker(format!("Failed to publish check: {}", e)))?;

        ack.await
            .map_err(|e| NetcheckError::Broker(format!("Check publish not acknowledged: {}", e)))?;

        debug!(
            request_id = %dispatch.request_id,
            request_type = %dispatch.request_type,
            "Check dispatched"
        );
        Ok(())
    }
}
