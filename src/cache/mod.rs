//! Ephemeral controller-side caches
//!
//! Heartbeat liveness and last-reported agent environment info. Both
//! are shared, last-writer-wins key/value stores; liveness entries
//! carry a TTL, info entries do not.

pub mod agent_info;
pub mod liveness;

pub use agent_info::{AgentInfo, AgentInfoCache};
pub use liveness::{spawn_liveness_cleanup_task, LivenessCache};
