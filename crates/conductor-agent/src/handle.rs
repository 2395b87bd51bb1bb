use chrono::{DateTime, Utc};
use conductor_core::{AgentMetrics, AgentStatus, StatusSnapshot};
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared identity and state for one agent.
///
/// Cheap to clone; all clones view the same state. The worker loop is the
/// only writer of the status field, preserving the invariant that an agent
/// transitions its own status and nobody else's. External readers take
/// point-in-time snapshots and tolerate staleness.
#[derive(Clone)]
pub struct AgentHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    name: String,
    agent_type: String,
    capabilities: Vec<String>,
    status: RwLock<AgentStatus>,
    metrics: RwLock<AgentMetrics>,
    last_seen: RwLock<DateTime<Utc>>,
}

impl AgentHandle {
    /// Creates a handle with status `idle` and zeroed metrics.
    pub fn new(
        name: impl Into<String>,
        agent_type: impl Into<String>,
        capabilities: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                name: name.into(),
                agent_type: agent_type.into(),
                capabilities,
                status: RwLock::new(AgentStatus::Idle),
                metrics: RwLock::new(AgentMetrics::default()),
                last_seen: RwLock::new(Utc::now()),
            }),
        }
    }

    /// The agent's unique name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The agent's type label.
    pub fn agent_type(&self) -> &str {
        &self.inner.agent_type
    }

    /// The capabilities declared at construction; never change afterwards.
    pub fn capabilities(&self) -> &[String] {
        &self.inner.capabilities
    }

    /// Current status.
    pub fn status(&self) -> AgentStatus {
        *self.inner.status.read()
    }

    /// Current counters.
    pub fn metrics(&self) -> AgentMetrics {
        *self.inner.metrics.read()
    }

    /// When the agent's worker last showed a sign of life.
    pub fn last_seen(&self) -> DateTime<Utc> {
        *self.inner.last_seen.read()
    }

    /// Takes a read-only snapshot; `state` is the agent's own state data.
    pub fn snapshot(&self, state: serde_json::Value) -> StatusSnapshot {
        StatusSnapshot {
            name: self.inner.name.clone(),
            agent_type: self.inner.agent_type.clone(),
            status: self.status(),
            capabilities: self.inner.capabilities.clone(),
            state,
            metrics: self.metrics(),
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn set_status(&self, status: AgentStatus) {
        *self.inner.status.write() = status;
    }

    pub(crate) fn touch(&self) {
        *self.inner.last_seen.write() = Utc::now();
    }

    pub(crate) fn record_message(&self) {
        self.inner.metrics.write().messages_handled += 1;
    }

    pub(crate) fn record_task_completed(&self) {
        self.inner.metrics.write().tasks_completed += 1;
    }

    pub(crate) fn record_task_failed(&self) {
        self.inner.metrics.write().tasks_failed += 1;
    }

    pub(crate) fn record_decision(&self) {
        self.inner.metrics.write().decisions_made += 1;
    }
}
