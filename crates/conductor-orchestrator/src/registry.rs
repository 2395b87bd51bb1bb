use chrono::{DateTime, Utc};
use conductor_core::{
    AgentMetrics, AgentStatus, ConductorError, ConductorResult, StatusSnapshot,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The orchestrator's view of one registered agent.
///
/// Refreshed from [`StatusSnapshot`]s the agent sends; between refreshes
/// the record may be stale, which is expected and tolerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// The agent's unique name.
    pub name: String,
    /// The agent's type label.
    pub agent_type: String,
    /// Capabilities declared at registration; fixed for the agent's lifetime.
    pub capabilities: Vec<String>,
    /// Last observed status.
    pub status: AgentStatus,
    /// When the agent was last heard from.
    pub last_seen: DateTime<Utc>,
    /// Work instances this agent is assigned to.
    pub assigned_instances: Vec<Uuid>,
    /// Last observed performance counters.
    pub metrics: AgentMetrics,
}

impl AgentRecord {
    /// Whether the agent is eligible for routing: up and neither paused
    /// nor parked in error.
    pub fn is_available(&self) -> bool {
        matches!(self.status, AgentStatus::Idle | AgentStatus::Active)
    }
}

/// Registration-ordered index of agents, keyed by unique name.
///
/// Order matters: capability lookups return matches first-registered-first,
/// which is the routing tie-break.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    records: Vec<AgentRecord>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record for a newly announced agent.
    ///
    /// A duplicate name is rejected and the existing record is untouched.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        agent_type: impl Into<String>,
        capabilities: Vec<String>,
    ) -> ConductorResult<()> {
        let name = name.into();
        if self.records.iter().any(|r| r.name == name) {
            return Err(ConductorError::Validation(format!(
                "agent {name} is already registered"
            )));
        }
        self.records.push(AgentRecord {
            name,
            agent_type: agent_type.into(),
            capabilities,
            status: AgentStatus::Idle,
            last_seen: Utc::now(),
            assigned_instances: Vec::new(),
            metrics: AgentMetrics::default(),
        });
        Ok(())
    }

    /// Looks up an agent by name.
    pub fn get(&self, name: &str) -> Option<&AgentRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut AgentRecord> {
        self.records.iter_mut().find(|r| r.name == name)
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no agent is registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in registration order.
    pub fn records(&self) -> &[AgentRecord] {
        &self.records
    }

    /// Names of available agents declaring `capability`, in registration
    /// order. Paused and errored agents are not eligible.
    pub fn find_by_capability(&self, capability: &str) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.is_available() && r.capabilities.iter().any(|c| c == capability))
            .map(|r| r.name.clone())
            .collect()
    }

    /// Refreshes a record from a status snapshot the agent sent.
    /// Snapshots from unknown agents are ignored.
    pub fn absorb_snapshot(&mut self, snapshot: &StatusSnapshot) -> bool {
        let Some(record) = self.get_mut(&snapshot.name) else {
            return false;
        };
        record.status = snapshot.status;
        record.metrics = snapshot.metrics;
        record.last_seen = snapshot.timestamp;
        true
    }
}
