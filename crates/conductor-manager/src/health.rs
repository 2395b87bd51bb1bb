use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate verdict over the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetHealth {
    /// Every running agent is responsive and none is in error.
    Healthy,
    /// At least one agent is faulted; the rest keep working.
    Degraded,
}

/// One agent's reason for being counted unhealthy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFault {
    /// The agent's name.
    pub agent: String,
    /// Human-readable reason, e.g. `worker exited unexpectedly`.
    pub reason: String,
}

/// Point-in-time health report produced by
/// [`AgentManager::health_check`](crate::AgentManager::health_check).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// The aggregate verdict.
    pub status: FleetHealth,
    /// Number of registered agents.
    pub total_agents: usize,
    /// Number of agents with a live worker task.
    pub running_agents: usize,
    /// Agents counted unhealthy, with reasons.
    pub faults: Vec<AgentFault>,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// True when the verdict is [`FleetHealth::Healthy`].
    pub fn is_healthy(&self) -> bool {
        self.status == FleetHealth::Healthy
    }
}
