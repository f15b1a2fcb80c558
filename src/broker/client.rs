//! NATS JetStream client wrapper
//!
//! Provides connection management for the controller and for probe
//! agents, with a JetStream context for stream and consumer access.

use async_nats::jetstream;
use async_nats::{Client, ConnectOptions};
use bytes::Bytes;
use std::time::Duration;
use tracing::info;

use crate::config::NatsArgs;
use crate::types::NetcheckError;

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// NATS client wrapper with JetStream support
#[derive(Clone)]
pub struct BrokerClient {
    /// Underlying NATS client
    client: Client,
    /// JetStream context over the same connection
    jetstream: jetstream::Context,
    /// Client name for logging
    name: String,
}

impl BrokerClient {
    /// Connect using controller configuration
    pub async fn connect(args: &NatsArgs, name: &str) -> Result<Self, NetcheckError> {
        Self::connect_with(
            &args.nats_url,
            args.nats_user.clone(),
            args.nats_password.clone(),
            name,
        )
        .await
    }

    /// Connect with the per-agent credentials handed out at registration
    pub async fn connect_with_credentials(
        url: &str,
        username: &str,
        password: &str,
        name: &str,
    ) -> Result<Self, NetcheckError> {
        Self::connect_with(
            url,
            Some(username.to_string()),
            Some(password.to_string()),
            name,
        )
        .await
    }

    async fn connect_with(
        url: &str,
        user: Option<String>,
        password: Option<String>,
        name: &str,
    ) -> Result<Self, NetcheckError> {
        info!("Connecting to NATS at {}", url);

        // Don't use retry_on_initial_connect() - we want fast failure if NATS isn't available
        // Reconnection will still work after initial successful connection
        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (user, password) {
            options = options.user_and_password(user, pass);
        }

        let client = options
            .connect(url)
            .await
            .map_err(|e| NetcheckError::Broker(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", url);

        let jetstream = jetstream::new(client.clone());

        Ok(Self {
            client,
            jetstream,
            name: name.to_string(),
        })
    }

    /// Get the underlying NATS client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the JetStream context
    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    /// Whether the connection to the broker is currently established
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    /// Publish a message to a subject
    pub async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), NetcheckError> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| NetcheckError::Broker(format!("Publish failed: {}", e)))
    }

    /// Flush pending messages
    pub async fn flush(&self) -> Result<(), NetcheckError> {
        self.client
            .flush()
            .await
            .map_err(|e| NetcheckError::Broker(format!("Flush failed: {}", e)))
    }

    /// Get the client name
    pub fn name(&self) -> &str {
        &self.name
    }
}
