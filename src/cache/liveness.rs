//! Agent liveness cache
//!
//! TTL-bound record of the last heartbeat seen per agent. Absence of a
//! non-expired entry means the agent is considered not live, regardless
//! of its stored status.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// One recorded heartbeat
#[derive(Debug, Clone)]
struct HeartbeatEntry {
    seen_at: DateTime<Utc>,
    expires_at: Instant,
}

/// TTL-bound last-seen store for agent heartbeats
pub struct LivenessCache {
    entries: DashMap<Uuid, HeartbeatEntry>,
    ttl: Duration,
}

impl LivenessCache {
    /// Create a cache whose entries expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Record a heartbeat, refreshing the TTL
    pub fn record_heartbeat(&self, agent_id: Uuid) {
        self.entries.insert(
            agent_id,
            HeartbeatEntry {
                seen_at: Utc::now(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Whether the agent has a non-expired heartbeat
    pub fn is_live(&self, agent_id: Uuid) -> bool {
        self.entries
            .get(&agent_id)
            .map(|e| Instant::now() < e.expires_at)
            .unwrap_or(false)
    }

    /// Timestamp of the last recorded heartbeat, if still valid
    pub fn last_seen(&self, agent_id: Uuid) -> Option<DateTime<Utc>> {
        self.entries
            .get(&agent_id)
            .filter(|e| Instant::now() < e.expires_at)
            .map(|e| e.seen_at)
    }

    /// Drop an agent's entry entirely
    pub fn remove(&self, agent_id: Uuid) {
        self.entries.remove(&agent_id);
    }

    /// Remove expired entries, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();

        let expired: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|e| now >= e.expires_at)
            .map(|e| *e.key())
            .collect();

        let mut removed = 0;
        for key in &expired {
            if self.entries.remove(key).is_some() {
                removed += 1;
            }
        }

        removed
    }

    /// Number of agents with a currently valid heartbeat
    pub fn live_count(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| now < e.expires_at).count()
    }
}

/// Periodically drop expired heartbeat entries
pub fn spawn_liveness_cleanup_task(cache: Arc<LivenessCache>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed = cache.cleanup_expired();
            if removed > 0 {
                debug!(removed = removed, "Expired heartbeats dropped");
            }
        }
    });

    info!(
        interval_secs = interval.as_secs(),
        "Liveness cleanup task started"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_unknown_agent_not_live() {
        let cache = LivenessCache::new(Duration::from_secs(60));
        assert!(!cache.is_live(Uuid::new_v4()));
        assert!(cache.last_seen(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_heartbeat_expires() {
        let cache = LivenessCache::new(Duration::from_millis(50));
        let agent_id = Uuid::new_v4();

        cache.record_heartbeat(agent_id);
        assert!(cache.is_live(agent_id));
        assert_eq!(cache.live_count(), 1);

        sleep(Duration::from_millis(120));
        assert!(!cache.is_live(agent_id));
        assert_eq!(cache.live_count(), 0);

        // Entry still occupies a slot until swept
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[test]
    fn test_heartbeat_refreshes_ttl() {
        let cache = LivenessCache::new(Duration::from_millis(80));
        let agent_id = Uuid::new_v4();

        cache.record_heartbeat(agent_id);
        sleep(Duration::from_millis(50));
        cache.record_heartbeat(agent_id);
        sleep(Duration::from_millis(50));

        // 100ms since the first beat, but only 50ms since the refresh
        assert!(cache.is_live(agent_id));
    }

    #[test]
    fn test_remove_clears_entry() {
        let cache = LivenessCache::new(Duration::from_secs(60));
        let agent_id = Uuid::new_v4();

        cache.record_heartbeat(agent_id);
        cache.remove(agent_id);
        assert!(!cache.is_live(agent_id));
    }
}
