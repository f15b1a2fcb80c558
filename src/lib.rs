//! Netcheck - distributed network reachability checks
//!
//! A central controller dispatches reachability probes (HTTP, DNS,
//! TCP, ping) to a fleet of distributed agents over NATS JetStream and
//! correlates their replies.
//!
//! ## Services
//!
//! - **Controller**: REST API for agent lifecycle and check submission
//! - **Provisioner**: per-agent broker identities with scoped permissions
//! - **Dispatch**: fanout of checks to the fleet, response correlation
//! - **Agent**: probe runtime with registration, workers, and heartbeats

pub mod agent;
pub mod broker;
pub mod cache;
pub mod checker;
pub mod config;
pub mod dispatch;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{NetcheckError, Result};
