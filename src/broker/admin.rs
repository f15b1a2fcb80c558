//! Broker user administration client
//!
//! Thin HTTP client for the broker deployment's user-admin API. The
//! credential provisioner uses it to create and delete per-agent users
//! and to install their permission grants.

use std::time::Duration;
use tracing::debug;

use crate::broker::provisioner::AgentPermissions;
use crate::types::{NetcheckError, Result};

/// Timeout for individual admin API calls
const ADMIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the broker's user administration API
#[derive(Clone)]
pub struct BrokerAdminClient {
    /// Base URL of the admin API, without trailing slash
    base_url: String,
    /// Admin username (optional)
    username: Option<String>,
    /// Admin password (optional)
    password: Option<String>,
    /// HTTP client for admin calls
    http_client: reqwest::Client,
}

impl BrokerAdminClient {
    /// Create a new admin client
    pub fn new(base_url: &str, username: Option<String>, password: Option<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(ADMIN_REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            http_client,
        }
    }

    /// Create or update a broker user
    pub async fn put_user(&self, username: &str, password: &str) -> Result<()> {
        let url = self.user_url(username);
        let body = serde_json::json!({ "password": password });

        let response = self
            .with_auth(self.http_client.put(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                NetcheckError::Provisioning(format!("User create request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(NetcheckError::Provisioning(format!(
                "User create for {} returned {}",
                username,
                response.status()
            )));
        }

        debug!(username = %username, "Broker user upserted");
        Ok(())
    }

    /// Install the permission grant for a broker user
    pub async fn put_permissions(
        &self,
        username: &str,
        permissions: &AgentPermissions,
    ) -> Result<()> {
        let url = format!(
            "{}/api/permissions/{}",
            self.base_url,
            urlencoding::encode(username)
        );

        let response = self
            .with_auth(self.http_client.put(&url))
            .json(permissions)
            .send()
            .await
            .map_err(|e| {
                NetcheckError::Provisioning(format!("Permission grant request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(NetcheckError::Provisioning(format!(
                "Permission grant for {} returned {}",
                username,
                response.status()
            )));
        }

        debug!(username = %username, "Broker permissions installed");
        Ok(())
    }

    /// Delete a broker user; an already-missing user counts as success
    /// so deletion can be repeated safely
    pub async fn delete_user(&self, username: &str) -> Result<()> {
        let url = self.user_url(username);

        let response = self
            .with_auth(self.http_client.delete(&url))
            .send()
            .await
            .map_err(|e| {
                NetcheckError::Provisioning(format!("User delete request failed: {}", e))
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(username = %username, "Broker user already absent");
            return Ok(());
        }

        if !response.status().is_success() {
            return Err(NetcheckError::Provisioning(format!(
                "User delete for {} returned {}",
                username,
                response.status()
            )));
        }

        debug!(username = %username, "Broker user deleted");
        Ok(())
    }

    fn user_url(&self, username: &str) -> String {
        format!(
            "{}/api/users/{}",
            self.base_url,
            urlencoding::encode(username)
        )
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            builder.basic_auth(user, Some(pass))
        } else {
            builder
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = BrokerAdminClient::new("http://broker:8222/", None, None);
        assert_eq!(
            client.user_url("agent_probe_1"),
            "http://broker:8222/api/users/agent_probe_1"
        );
    }

    #[test]
    fn test_user_url_encodes_username() {
        let client = BrokerAdminClient::new("http://broker:8222", None, None);
        assert_eq!(
            client.user_url("agent/odd"),
            "http://broker:8222/api/users/agent%2Fodd"
        );
    }
}
