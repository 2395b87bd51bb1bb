use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The agent status state machine.
///
/// `idle --(task received)--> active --(success|error)--> idle|error`;
/// `error --(operator reset)--> idle`; `idle|active --(pause)--> paused
/// --(resume)--> idle`. Only the agent's own worker writes this value;
/// everyone else reads snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Waiting for work.
    #[default]
    Idle,
    /// Executing a task.
    Active,
    /// The last task failed; awaiting an operator reset.
    Error,
    /// Suspended by an operator; not accepting tasks.
    Paused,
}

/// Counters tracked per agent across its lifetime in the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Tasks that ran to completion.
    pub tasks_completed: u64,
    /// Tasks that ended in a failure outcome or error.
    pub tasks_failed: u64,
    /// Decisions made through `make_decision`.
    pub decisions_made: u64,
    /// Messages dispatched by the worker loop.
    pub messages_handled: u64,
}

impl AgentMetrics {
    /// Folds another set of counters into this one.
    pub fn merge(&mut self, other: &AgentMetrics) {
        self.tasks_completed += other.tasks_completed;
        self.tasks_failed += other.tasks_failed;
        self.decisions_made += other.decisions_made;
        self.messages_handled += other.messages_handled;
    }
}

/// A read-only, point-in-time view of an agent. Producing one has no
/// observable effect on the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// The agent's unique name.
    pub name: String,
    /// The agent's type, e.g. `market_analytics`.
    pub agent_type: String,
    /// Status at snapshot time.
    pub status: AgentStatus,
    /// Declared capabilities; static for the agent's lifetime.
    pub capabilities: Vec<String>,
    /// Agent-specific state, opaque to the core.
    pub state: serde_json::Value,
    /// Counters at snapshot time.
    pub metrics: AgentMetrics,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_idle() {
        assert_eq!(AgentStatus::default(), AgentStatus::Idle);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AgentStatus::Paused).unwrap(),
            "\"paused\""
        );
    }

    #[test]
    fn test_metrics_merge() {
        let mut total = AgentMetrics {
            tasks_completed: 2,
            tasks_failed: 1,
            decisions_made: 0,
            messages_handled: 5,
        };
        total.merge(&AgentMetrics {
            tasks_completed: 3,
            tasks_failed: 0,
            decisions_made: 2,
            messages_handled: 7,
        });
        assert_eq!(total.tasks_completed, 5);
        assert_eq!(total.tasks_failed, 1);
        assert_eq!(total.decisions_made, 2);
        assert_eq!(total.messages_handled, 12);
    }
}
