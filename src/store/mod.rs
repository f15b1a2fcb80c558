//! Controller-owned durable state
//!
//! Agent lifecycle records plus check requests and their accumulated
//! responses.

pub mod agents;
pub mod checks;

pub use agents::{AgentRecord, AgentResponse, AgentStatus, AgentStore};
pub use checks::{normalize_host, CheckRecord, CheckStore, StoredResponse};
