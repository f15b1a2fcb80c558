//! Cached environment info reported by agents
//!
//! Supplied at registration time, overwritten on every registration,
//! deleted when the agent is deleted. No TTL.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Environment info an agent declares about itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub hostname: String,
    pub region: String,
    pub local_ip: String,
    pub public_ip: String,
}

/// Last-writer-wins store of per-agent environment info
#[derive(Default)]
pub struct AgentInfoCache {
    entries: DashMap<Uuid, AgentInfo>,
}

impl AgentInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store info for an agent, replacing any previous entry
    pub fn set(&self, agent_id: Uuid, info: AgentInfo) {
        self.entries.insert(agent_id, info);
    }

    /// Get the last reported info for an agent
    pub fn get(&self, agent_id: Uuid) -> Option<AgentInfo> {
        self.entries.get(&agent_id).map(|e| e.clone())
    }

    /// Drop an agent's info
    pub fn remove(&self, agent_id: Uuid) {
        self.entries.remove(&agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(hostname: &str) -> AgentInfo {
        AgentInfo {
            hostname: hostname.to_string(),
            region: "eu-west-1".to_string(),
            local_ip: "10.0.0.5".to_string(),
            public_ip: "203.0.113.9".to_string(),
        }
    }

    #[test]
    fn test_set_and_get() {
        let cache = AgentInfoCache::new();
        let agent_id = Uuid::new_v4();

        assert!(cache.get(agent_id).is_none());

        cache.set(agent_id, info("probe-1"));
        assert_eq!(cache.get(agent_id).unwrap().hostname, "probe-1");
    }

    #[test]
    fn test_registration_overwrites() {
        let cache = AgentInfoCache::new();
        let agent_id = Uuid::new_v4();

        cache.set(agent_id, info("probe-1"));
        cache.set(agent_id, info("probe-1-rehomed"));
        assert_eq!(cache.get(agent_id).unwrap().hostname, "probe-1-rehomed");
    }

    #[test]
    fn test_remove() {
        let cache = AgentInfoCache::new();
        let agent_id = Uuid::new_v4();

        cache.set(agent_id, info("probe-1"));
        cache.remove(agent_id);
        assert!(cache.get(agent_id).is_none());
    }
}
