use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request to run the multi-step content workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    /// Topic the workflow is about, carried into every step's payload.
    pub topic: String,
    /// Work instance the output belongs to, if any.
    #[serde(default)]
    pub instance_id: Option<Uuid>,
    /// Priority applied to every dispatched step.
    #[serde(default = "default_priority")]
    pub priority: u8,
}

fn default_priority() -> u8 {
    conductor_core::DEFAULT_PRIORITY
}

impl WorkflowRequest {
    /// A request with default priority and no instance binding.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            instance_id: None,
            priority: conductor_core::DEFAULT_PRIORITY,
        }
    }
}

/// One dispatched step of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Id of the task dispatched for this step.
    pub task_id: Uuid,
    /// The capability the step was routed by.
    pub capability: String,
    /// The agent the step was assigned to.
    pub agent: String,
    /// Task ids this step declared as dependencies.
    pub depends_on: Vec<Uuid>,
    /// Whether a result for this step has come back.
    pub completed: bool,
}

/// Bookkeeping for one dispatched workflow.
///
/// Dependencies are recorded, not enforced: the broker delivers every step
/// immediately and the dependent step's agent owns the contract of checking
/// `depends_on` against completed work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// Unique workflow id, stamped on every step task.
    pub id: Uuid,
    /// The topic the workflow was requested for.
    pub topic: String,
    /// Work instance the workflow belongs to, if any.
    pub instance_id: Option<Uuid>,
    /// Dispatched steps, in dispatch order.
    pub steps: Vec<WorkflowStep>,
    /// When the workflow was dispatched.
    pub created_at: DateTime<Utc>,
}

impl WorkflowRecord {
    /// Creates a record for a just-dispatched workflow.
    pub fn new(id: Uuid, request: &WorkflowRequest, steps: Vec<WorkflowStep>) -> Self {
        Self {
            id,
            topic: request.topic.clone(),
            instance_id: request.instance_id,
            steps,
            created_at: Utc::now(),
        }
    }

    /// Marks the step for `task_id` completed. Returns false when the task
    /// does not belong to this workflow.
    pub fn mark_completed(&mut self, task_id: Uuid) -> bool {
        match self.steps.iter_mut().find(|s| s.task_id == task_id) {
            Some(step) => {
                step.completed = true;
                true
            }
            None => false,
        }
    }

    /// `(completed, total)` step counts.
    pub fn progress(&self) -> (usize, usize) {
        let done = self.steps.iter().filter(|s| s.completed).count();
        (done, self.steps.len())
    }

    /// True once every step reported a result.
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.completed)
    }

    /// Task ids of completed steps, for dependency checks.
    pub fn completed_task_ids(&self) -> Vec<Uuid> {
        self.steps
            .iter()
            .filter(|s| s.completed)
            .map(|s| s.task_id)
            .collect()
    }
}
