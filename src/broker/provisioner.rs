//! Broker credential provisioning
//!
//! Creates an isolated messaging identity per agent: a dedicated durable
//! consumer on the dispatch stream, a broker user with a random password,
//! and a permission grant restricting that user to its own consumer plus
//! the shared response subject.
//!
//! ## Permission Model
//!
//! Agents can:
//! - Publish: the shared response subject, plus the JetStream API calls
//!   needed to fetch from their own consumer and acknowledge deliveries
//! - Subscribe: their own reply inboxes only
//!
//! Everything else is denied by the broker's default-deny model.

use async_nats::jetstream::{self, stream::Stream};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::broker::admin::BrokerAdminClient;
use crate::broker::client::BrokerClient;
use crate::broker::messages::{
    BrokerCredentials, DISPATCH_STREAM, DISPATCH_SUBJECT, RESPONSE_STREAM, RESPONSE_SUBJECT,
};
use crate::types::{NetcheckError, Result};

/// How long undelivered messages stay buffered in the streams
const STREAM_MAX_AGE: Duration = Duration::from_secs(3600);

/// Cap on buffered bytes per stream
const STREAM_MAX_BYTES: i64 = 64 * 1024 * 1024;

/// Outstanding unacknowledged deliveries allowed per agent consumer
const MAX_ACK_PENDING: i64 = 64;

/// Length of generated broker passwords
const PASSWORD_LENGTH: usize = 20;

/// Characters drawn on for generated broker passwords
const PASSWORD_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()-_=+";

/// Restrict an agent name to characters safe for broker resource names
pub fn sanitize_agent_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Broker username for a sanitized agent name
pub fn agent_username(sanitized: &str) -> String {
    format!("agent_{}", sanitized)
}

/// Durable consumer name for a sanitized agent name
pub fn agent_consumer_name(sanitized: &str) -> String {
    format!("agent-{}", sanitized)
}

/// Generate a random broker password
pub fn generate_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())] as char)
        .collect()
}

/// Permission grant installed for a provisioned agent user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPermissions {
    pub publish: PublishPermissions,
    pub subscribe: SubscribePermissions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishPermissions {
    /// Patterns the agent can publish to
    pub allow: Vec<String>,
    /// Patterns the agent cannot publish to
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribePermissions {
    /// Patterns the agent can subscribe to
    pub allow: Vec<String>,
    /// Patterns the agent cannot subscribe to
    pub deny: Vec<String>,
}

impl AgentPermissions {
    /// Grant scoping an agent to its own consumer and the shared
    /// response subject
    pub fn for_consumer(consumer_name: &str) -> Self {
        Self {
            publish: PublishPermissions {
                allow: vec![
                    RESPONSE_SUBJECT.to_string(),
                    format!("$JS.API.STREAM.INFO.{}", DISPATCH_STREAM),
                    format!("$JS.API.CONSUMER.INFO.{}.{}", DISPATCH_STREAM, consumer_name),
                    format!(
                        "$JS.API.CONSUMER.MSG.NEXT.{}.{}",
                        DISPATCH_STREAM, consumer_name
                    ),
                    format!("$JS.ACK.{}.{}.>", DISPATCH_STREAM, consumer_name),
                ],
                deny: vec![],
            },
            subscribe: SubscribePermissions {
                allow: vec!["_INBOX.>".to_string()],
                deny: vec![],
            },
        }
    }
}

/// Messaging identity created for one agent
#[derive(Debug, Clone)]
pub struct ProvisionedIdentity {
    pub username: String,
    pub password: String,
    pub consumer_name: String,
}

/// Provisions and tears down per-agent broker identities
pub struct CredentialProvisioner {
    /// JetStream context for stream and consumer administration
    jetstream: jetstream::Context,
    /// Client for the broker's user-admin API
    admin: BrokerAdminClient,
    /// Broker URL advertised to agents in registration responses
    server_url: String,
}

impl CredentialProvisioner {
    /// Create a new provisioner
    pub fn new(client: &BrokerClient, admin: BrokerAdminClient, server_url: String) -> Self {
        Self {
            jetstream: client.jetstream().clone(),
            admin,
            server_url,
        }
    }

    /// Ensure both shared streams exist; safe to call repeatedly
    pub async fn ensure_streams(&self) -> Result<()> {
        self.ensure_dispatch_stream().await?;
        self.ensure_response_stream().await?;
        Ok(())
    }

    /// Provision the full messaging identity for an agent
    ///
    /// Order: streams, dedicated consumer, broker user, permission
    /// grant. Any failure aborts provisioning and surfaces to the
    /// caller; partially created resources are left for a retried
    /// provision (every step is an upsert) or a later deprovision.
    pub async fn provision(&self, agent_name: &str) -> Result<ProvisionedIdentity> {
        let sanitized = sanitize_agent_name(agent_name);
        let username = agent_username(&sanitized);
        let consumer_name = agent_consumer_name(&sanitized);
        let password = generate_password(PASSWORD_LENGTH);

        info!(agent = %agent_name, username = %username, "Provisioning broker identity");

        let stream = self.ensure_dispatch_stream().await?;

        stream
            .get_or_create_consumer(
                &consumer_name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(consumer_name.clone()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    filter_subject: DISPATCH_SUBJECT.to_string(),
                    max_ack_pending: MAX_ACK_PENDING,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                NetcheckError::Provisioning(format!(
                    "Failed to create consumer {}: {}",
                    consumer_name, e
                ))
            })?;

        self.admin.put_user(&username, &password).await?;
        self.admin
            .put_permissions(&username, &AgentPermissions::for_consumer(&consumer_name))
            .await?;

        info!(agent = %agent_name, consumer = %consumer_name, "Broker identity provisioned");

        Ok(ProvisionedIdentity {
            username,
            password,
            consumer_name,
        })
    }

    /// Tear down an agent's messaging identity
    ///
    /// Consumer first, then user, mirroring provisioning in reverse.
    /// Resources that are already gone count as success so deletion can
    /// be repeated safely.
    pub async fn deprovision(&self, agent_name: &str) -> Result<()> {
        let sanitized = sanitize_agent_name(agent_name);
        let username = agent_username(&sanitized);
        let consumer_name = agent_consumer_name(&sanitized);

        info!(agent = %agent_name, "Deprovisioning broker identity");

        match self.jetstream.get_stream(DISPATCH_STREAM).await {
            Ok(stream) => match stream.delete_consumer(&consumer_name).await {
                Ok(_) => debug!(consumer = %consumer_name, "Consumer deleted"),
                Err(e) if is_not_found(&e.to_string()) => {
                    debug!(consumer = %consumer_name, "Consumer already absent")
                }
                Err(e) => {
                    return Err(NetcheckError::Provisioning(format!(
                        "Failed to delete consumer {}: {}",
                        consumer_name, e
                    )))
                }
            },
            Err(e) if is_not_found(&e.to_string()) => {
                debug!("Dispatch stream absent, nothing to delete")
            }
            Err(e) => {
                return Err(NetcheckError::Broker(format!(
                    "Failed to look up stream {}: {}",
                    DISPATCH_STREAM, e
                )))
            }
        }

        self.admin.delete_user(&username).await?;

        info!(agent = %agent_name, "Broker identity deprovisioned");
        Ok(())
    }

    /// Assemble the connection details handed to an agent at registration
    pub fn credentials(
        &self,
        username: &str,
        password: &str,
        consumer_name: &str,
    ) -> BrokerCredentials {
        BrokerCredentials {
            server_url: self.server_url.clone(),
            username: username.to_string(),
            password: password.to_string(),
            stream: DISPATCH_STREAM.to_string(),
            consumer_name: consumer_name.to_string(),
            response_subject: RESPONSE_SUBJECT.to_string(),
        }
    }

    async fn ensure_dispatch_stream(&self) -> Result<Stream> {
        let stream = self
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: DISPATCH_STREAM.to_string(),
                subjects: vec![DISPATCH_SUBJECT.to_string()],
                max_age: STREAM_MAX_AGE,
                max_bytes: STREAM_MAX_BYTES,
                storage: jetstream::stream::StorageType::Memory,
                ..Default::default()
            })
            .await
            .map_err(|e| {
                NetcheckError::Broker(format!("Failed to create stream {}: {}", DISPATCH_STREAM, e))
            })?;

        Ok(stream)
    }

    async fn ensure_response_stream(&self) -> Result<Stream> {
        let stream = self
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: RESPONSE_STREAM.to_string(),
                subjects: vec![RESPONSE_SUBJECT.to_string()],
                max_age: STREAM_MAX_AGE,
                max_bytes: STREAM_MAX_BYTES,
                storage: jetstream::stream::StorageType::Memory,
                ..Default::default()
            })
            .await
            .map_err(|e| {
                NetcheckError::Broker(format!("Failed to create stream {}: {}", RESPONSE_STREAM, e))
            })?;

        Ok(stream)
    }
}

fn is_not_found(message: &str) -> bool {
    message.to_ascii_lowercase().contains("not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_agent_name() {
        assert_eq!(sanitize_agent_name("eu-west-1"), "eu_west_1");
        assert_eq!(sanitize_agent_name("probe 2 (lab)"), "probe_2__lab_");
        assert_eq!(sanitize_agent_name("already_clean_42"), "already_clean_42");
    }

    #[test]
    fn test_naming_from_sanitized() {
        assert_eq!(agent_username("eu_west_1"), "agent_eu_west_1");
        assert_eq!(agent_consumer_name("eu_west_1"), "agent-eu_west_1");
    }

    #[test]
    fn test_generate_password() {
        let password = generate_password(PASSWORD_LENGTH);
        assert_eq!(password.len(), PASSWORD_LENGTH);
        assert!(password
            .bytes()
            .all(|b| PASSWORD_CHARSET.contains(&b)));

        // Two draws colliding would mean the generator is broken
        assert_ne!(generate_password(PASSWORD_LENGTH), password);
    }

    #[test]
    fn test_agent_permissions_scoped_to_consumer() {
        let perms = AgentPermissions::for_consumer("agent-eu_west_1");

        assert!(perms.publish.allow.contains(&RESPONSE_SUBJECT.to_string()));
        assert!(perms
            .publish
            .allow
            .contains(&"$JS.API.CONSUMER.MSG.NEXT.CHECKS.agent-eu_west_1".to_string()));
        assert!(perms
            .publish
            .allow
            .contains(&"$JS.ACK.CHECKS.agent-eu_west_1.>".to_string()));
        assert!(!perms
            .publish
            .allow
            .iter()
            .any(|p| p.contains("agent-other")));

        assert_eq!(perms.subscribe.allow, vec!["_INBOX.>".to_string()]);
        assert!(perms.publish.deny.is_empty());
    }

    #[test]
    fn test_is_not_found() {
        assert!(is_not_found("consumer not found"));
        assert!(is_not_found("Stream Not Found (code 10059)"));
        assert!(!is_not_found("request timed out"));
    }
}
