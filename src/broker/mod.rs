//! Broker integration
//!
//! Connection management, wire message types, the user-admin API client
//! and per-agent credential provisioning.

pub mod admin;
pub mod client;
pub mod messages;
pub mod provisioner;

pub use admin::BrokerAdminClient;
pub use client::BrokerClient;
pub use messages::{
    BrokerCredentials, CheckDispatch, CheckResult, HeartbeatRequest, RegistrationRequest,
    RegistrationResponse, RequestType, DISPATCH_STREAM, DISPATCH_SUBJECT, RESPONSE_CONSUMER,
    RESPONSE_STREAM, RESPONSE_SUBJECT,
};
pub use provisioner::{
    sanitize_agent_name, AgentPermissions, CredentialProvisioner, ProvisionedIdentity,
};
