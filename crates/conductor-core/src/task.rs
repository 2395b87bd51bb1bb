use crate::{ConductorError, ConductorResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority assigned when a submission does not specify one.
pub const DEFAULT_PRIORITY: u8 = 5;

/// The valid priority range, inclusive.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

/// A unit of work routed to an agent, directly or through a named queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: Uuid,
    /// What kind of work this is, e.g. `market_research`.
    pub task_type: String,
    /// Priority 1..=10; 10 drains first.
    pub priority: u8,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// Task-specific parameters, opaque to the core.
    pub payload: serde_json::Value,
    /// The agent this task was handed to, once known.
    #[serde(default)]
    pub assigned_agent: Option<String>,
    /// The work instance this task belongs to, if any.
    #[serde(default)]
    pub instance_id: Option<Uuid>,
    /// The workflow this task is a step of, if any.
    #[serde(default)]
    pub workflow_id: Option<Uuid>,
    /// Ids of tasks that should complete before this one acts.
    ///
    /// Recorded, not enforced: the broker and orchestrator never gate on
    /// these. An executing agent may check them via
    /// [`Task::dependencies_satisfied`].
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
}

impl Task {
    /// Creates a task with [`DEFAULT_PRIORITY`] and no routing metadata.
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            priority: DEFAULT_PRIORITY,
            created_at: Utc::now(),
            payload,
            assigned_agent: None,
            instance_id: None,
            workflow_id: None,
            depends_on: Vec::new(),
        }
    }

    /// Sets the priority. Callers validate the range at the boundary.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Attaches the work instance this task belongs to.
    pub fn with_instance(mut self, instance_id: Uuid) -> Self {
        self.instance_id = Some(instance_id);
        self
    }

    /// Attaches the workflow this task is a step of.
    pub fn with_workflow(mut self, workflow_id: Uuid) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    /// Records the tasks this one depends on.
    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.depends_on = deps;
        self
    }

    /// Records the agent the task was handed to.
    pub fn assigned_to(mut self, agent_name: impl Into<String>) -> Self {
        self.assigned_agent = Some(agent_name.into());
        self
    }

    /// True when every recorded dependency appears in `completed_ids`.
    pub fn dependencies_satisfied(&self, completed_ids: &[Uuid]) -> bool {
        self.depends_on.iter().all(|dep| completed_ids.contains(dep))
    }
}

/// The typed result of executing a task.
///
/// Expected business conditions are outcomes, not errors: an agent that
/// does not support a task type reports [`TaskOutcome::Unsupported`], and a
/// failure the agent caught and reported travels as [`TaskOutcome::Failed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The task ran to completion.
    Completed {
        /// Agent-specific result data.
        output: serde_json::Value,
    },
    /// The agent does not handle this task type.
    Unsupported {
        /// The unrecognized task type.
        task_type: String,
    },
    /// The task failed; the agent survived and reports why.
    Failed {
        /// Human-readable failure description.
        error: String,
    },
}

impl TaskOutcome {
    /// Creates a completed outcome.
    pub fn completed(output: serde_json::Value) -> Self {
        TaskOutcome::Completed { output }
    }

    /// Creates an unsupported-task-type outcome.
    pub fn unsupported(task_type: impl Into<String>) -> Self {
        TaskOutcome::Unsupported {
            task_type: task_type.into(),
        }
    }

    /// Creates a failed outcome.
    pub fn failed(error: impl Into<String>) -> Self {
        TaskOutcome::Failed {
            error: error.into(),
        }
    }
}

/// An inbound task submission from the external CRUD/web layer.
///
/// Validated at the boundary before it becomes a [`Task`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmission {
    /// What kind of work is requested. Required.
    pub task_type: String,
    /// Priority 1..=10.
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// The work instance this concerns, if any.
    #[serde(default)]
    pub instance_id: Option<Uuid>,
    /// Task-specific parameters.
    #[serde(default)]
    pub payload: serde_json::Value,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl TaskSubmission {
    /// Checks the submission against the boundary contract.
    pub fn validate(&self) -> ConductorResult<()> {
        if self.task_type.trim().is_empty() {
            return Err(ConductorError::Validation(
                "task_type is required".to_string(),
            ));
        }
        if !PRIORITY_RANGE.contains(&self.priority) {
            return Err(ConductorError::Validation(format!(
                "priority {} outside valid range 1..=10",
                self.priority
            )));
        }
        Ok(())
    }

    /// Validates and converts the submission into a [`Task`].
    pub fn into_task(self) -> ConductorResult<Task> {
        self.validate()?;
        let mut task = Task::new(self.task_type, self.payload).with_priority(self.priority);
        task.instance_id = self.instance_id;
        Ok(task)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_defaults() {
        let task = Task::new("market_research", json!({"niche": "fitness"}));
        assert_eq!(task.priority, DEFAULT_PRIORITY);
        assert!(task.depends_on.is_empty());
        assert!(task.assigned_agent.is_none());
    }

    #[test]
    fn test_dependencies_satisfied() {
        let dep_a = Uuid::new_v4();
        let dep_b = Uuid::new_v4();
        let task = Task::new("content_generation", json!({}))
            .with_dependencies(vec![dep_a, dep_b]);

        assert!(!task.dependencies_satisfied(&[]));
        assert!(!task.dependencies_satisfied(&[dep_a]));
        assert!(task.dependencies_satisfied(&[dep_a, dep_b]));
    }

    #[test]
    fn test_no_dependencies_always_satisfied() {
        let task = Task::new("noop", json!({}));
        assert!(task.dependencies_satisfied(&[]));
    }

    #[test]
    fn test_submission_missing_task_type_rejected() {
        let sub = TaskSubmission {
            task_type: "  ".into(),
            priority: 5,
            instance_id: None,
            payload: json!({}),
        };
        let err = sub.validate().unwrap_err();
        assert!(matches!(err, crate::ConductorError::Validation(_)));
    }

    #[test]
    fn test_submission_priority_out_of_range_rejected() {
        for bad in [0u8, 11] {
            let sub = TaskSubmission {
                task_type: "market_research".into(),
                priority: bad,
                instance_id: None,
                payload: json!({}),
            };
            assert!(sub.validate().is_err(), "priority {bad} should be rejected");
        }
    }

    #[test]
    fn test_submission_into_task_carries_fields() {
        let instance = Uuid::new_v4();
        let task = TaskSubmission {
            task_type: "keyword_research".into(),
            priority: 8,
            instance_id: Some(instance),
            payload: json!({"seed": "protein"}),
        }
        .into_task()
        .unwrap();

        assert_eq!(task.task_type, "keyword_research");
        assert_eq!(task.priority, 8);
        assert_eq!(task.instance_id, Some(instance));
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let outcome = TaskOutcome::unsupported("astrology");
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"status\":\"unsupported\""));
        let parsed: TaskOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, outcome);
    }
}
