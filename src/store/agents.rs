//! Agent lifecycle store
//!
//! In-memory record of each agent's identity, administrative status and
//! provisioned broker identity. Status is one signal; liveness is a
//! separate one kept in the liveness cache, and callers get both.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::AgentInfo;
use crate::types::{NetcheckError, Result};

/// Administrative lifecycle state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Created but not yet registered; the one-time api_key is valid
    Setup,
    /// Registered and entitled to broker access
    Active,
    /// Administratively parked
    Inactive,
    /// Terminal state; the agent can never register again
    Revoked,
}

/// Stored record of one agent
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub id: Uuid,
    pub name: String,
    pub status: AgentStatus,
    /// One-time registration key
    pub api_key: Uuid,
    pub registered_at: DateTime<Utc>,
    /// Provisioned broker identity
    pub broker_username: String,
    pub broker_password: String,
    pub consumer_name: String,
}

impl AgentRecord {
    /// Fresh record in `setup` with a new one-time key
    pub fn new(
        name: &str,
        broker_username: String,
        broker_password: String,
        consumer_name: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: AgentStatus::Setup,
            api_key: Uuid::new_v4(),
            registered_at: Utc::now(),
            broker_username,
            broker_password,
            consumer_name,
        }
    }

    /// API view of the record
    ///
    /// The one-time key is only exposed while the agent is still in
    /// setup; once the status moves on it is never revealed again.
    pub fn to_response(&self, live: bool, agent_info: Option<AgentInfo>) -> AgentResponse {
        AgentResponse {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            api_key: if self.status == AgentStatus::Setup {
                Some(self.api_key)
            } else {
                None
            },
            registered_at: self.registered_at,
            live,
            agent_info,
        }
    }
}

/// Agent representation returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub id: Uuid,
    pub name: String,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<Uuid>,
    pub registered_at: DateTime<Utc>,
    /// Whether a non-expired heartbeat exists; independent of status
    pub live: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_info: Option<AgentInfo>,
}

/// In-memory agent store indexed by id, with name uniqueness
#[derive(Default)]
pub struct AgentStore {
    agents: DashMap<Uuid, AgentRecord>,
    names: DashMap<String, Uuid>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record; the name must be unused
    pub fn insert(&self, record: AgentRecord) -> Result<()> {
        match self.names.entry(record.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(NetcheckError::AlreadyExists(
                format!("Agent {} already exists", record.name),
            )),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(record.id);
                self.agents.insert(record.id, record);
                Ok(())
            }
        }
    }

    /// Whether a name is still free
    pub fn name_available(&self, name: &str) -> bool {
        !self.names.contains_key(name)
    }

    pub fn get(&self, id: Uuid) -> Result<AgentRecord> {
        self.agents
            .get(&id)
            .map(|e| e.clone())
            .ok_or_else(|| NetcheckError::NotFound(format!("Agent {} not found", id)))
    }

    /// All records, oldest first
    pub fn list(&self) -> Vec<AgentRecord> {
        let mut records: Vec<AgentRecord> = self.agents.iter().map(|e| e.clone()).collect();
        records.sort_by_key(|r| r.registered_at);
        records
    }

    /// Find the record carrying a registration key
    pub fn find_by_api_key(&self, api_key: Uuid) -> Result<AgentRecord> {
        self.agents
            .iter()
            .find(|e| e.api_key == api_key)
            .map(|e| e.clone())
            .ok_or_else(|| {
                NetcheckError::NotFound("No agent matches the presented key".to_string())
            })
    }

    /// Update lifecycle status
    pub fn update_status(&self, id: Uuid, status: AgentStatus) -> Result<()> {
        let mut entry = self
            .agents
            .get_mut(&id)
            .ok_or_else(|| NetcheckError::NotFound(format!("Agent {} not found", id)))?;
        entry.status = status;
        Ok(())
    }

    /// Remove a record, returning it
    pub fn remove(&self, id: Uuid) -> Result<AgentRecord> {
        let (_, record) = self
            .agents
            .remove(&id)
            .ok_or_else(|| NetcheckError::NotFound(format!("Agent {} not found", id)))?;
        self.names.remove(&record.name);
        Ok(record)
    }

    pub fn count(&self) -> usize {
        self.agents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> AgentRecord {
        AgentRecord::new(
            name,
            format!("agent_{name}"),
            "s3cret".to_string(),
            format!("agent-{name}"),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let store = AgentStore::new();
        let agent = record("eu_west_1");
        let id = agent.id;

        store.insert(agent).unwrap();
        let fetched = store.get(id).unwrap();
        assert_eq!(fetched.name, "eu_west_1");
        assert_eq!(fetched.status, AgentStatus::Setup);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_duplicate_name_conflict() {
        let store = AgentStore::new();
        store.insert(record("eu_west_1")).unwrap();

        let err = store.insert(record("eu_west_1")).unwrap_err();
        assert!(matches!(err, NetcheckError::AlreadyExists(_)));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_api_key_hidden_once_status_leaves_setup() {
        let store = AgentStore::new();
        let agent = record("eu_west_1");
        let id = agent.id;
        store.insert(agent).unwrap();

        let created = store.get(id).unwrap().to_response(false, None);
        assert!(created.api_key.is_some());

        store.update_status(id, AgentStatus::Active).unwrap();
        let read_back = store.get(id).unwrap().to_response(true, None);
        assert!(read_back.api_key.is_none());
        assert_eq!(read_back.status, AgentStatus::Active);
        assert!(read_back.live);
    }

    #[test]
    fn test_find_by_api_key() {
        let store = AgentStore::new();
        let agent = record("eu_west_1");
        let key = agent.api_key;
        let id = agent.id;
        store.insert(agent).unwrap();

        assert_eq!(store.find_by_api_key(key).unwrap().id, id);

        let err = store.find_by_api_key(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, NetcheckError::NotFound(_)));
    }

    #[test]
    fn test_remove_frees_name() {
        let store = AgentStore::new();
        let agent = record("eu_west_1");
        let id = agent.id;
        store.insert(agent).unwrap();

        let removed = store.remove(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(store.name_available("eu_west_1"));

        // Gone means gone; a second removal finds nothing
        assert!(matches!(
            store.remove(id),
            Err(NetcheckError::NotFound(_))
        ));

        store.insert(record("eu_west_1")).unwrap();
    }
}
