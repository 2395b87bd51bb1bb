use crate::approvals::{ApprovalQueue, QueueReport};
use crate::registry::AgentRegistry;
use crate::workflow::{WorkflowRecord, WorkflowRequest, WorkflowStep};
use async_trait::async_trait;
use chrono::Utc;
use conductor_agent::{Agent, AgentHandle};
use conductor_broker::Broker;
use conductor_core::{
    ConductorError, ConductorResult, Decision, Message, MessageBody, Task, TaskOutcome,
    ORCHESTRATOR_NAME,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Lifecycle status of a work instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Accepting work.
    Active,
    /// Temporarily not accepting work.
    Paused,
    /// Needs attention.
    Error,
    /// Deliberately offline.
    Maintenance,
}

/// A unit of managed output (originally a blog instance) that agents are
/// assigned to. Many-to-many with agents; the orchestrator owns the
/// assignment records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkInstance {
    /// Unique instance id.
    pub id: Uuid,
    /// Human-readable instance name.
    pub name: String,
    /// Names of agents assigned to this instance.
    pub assigned_agents: Vec<String>,
    /// Current lifecycle status.
    pub status: InstanceStatus,
}

/// Per-instance slice of [`OrchestratorHealth`].
#[derive(Debug, Clone, Serialize)]
pub struct InstanceReport {
    /// The instance id.
    pub id: Uuid,
    /// The instance name.
    pub name: String,
    /// The instance status.
    pub status: InstanceStatus,
    /// Number of agents assigned.
    pub assigned_agents: usize,
}

/// The orchestrator's system-wide health view.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorHealth {
    /// False when any registered agent is paused, errored, or silent.
    pub healthy: bool,
    /// Number of registered agents.
    pub total_agents: usize,
    /// Agents currently eligible for routing.
    pub available_agents: usize,
    /// Names of agents not currently available.
    pub unavailable_agents: Vec<String>,
    /// Decisions awaiting manual resolution.
    pub pending_approvals: usize,
    /// Workflows with unfinished steps.
    pub active_workflows: usize,
    /// Assignment counts per work instance.
    pub instances: Vec<InstanceReport>,
}

struct Inner {
    registry: AgentRegistry,
    approvals: ApprovalQueue,
    workflows: HashMap<Uuid, WorkflowRecord>,
    instances: HashMap<Uuid, WorkInstance>,
    tasks_observed: u64,
}

/// The privileged agent that routes work by capability, sequences
/// workflows, and gates impactful decisions.
///
/// All bookkeeping sits behind one short-lived sync lock; broker publishes
/// happen after the lock is released.
pub struct Orchestrator {
    handle: AgentHandle,
    broker: Arc<Broker>,
    inner: Mutex<Inner>,
}

impl Orchestrator {
    /// Creates an orchestrator over the shared broker. It is addressed by
    /// the well-known name [`ORCHESTRATOR_NAME`].
    pub fn new(broker: Arc<Broker>) -> Self {
        Self {
            handle: AgentHandle::new(
                ORCHESTRATOR_NAME,
                "orchestrator",
                vec!["orchestration".into(), "approval_gate".into()],
            ),
            broker,
            inner: Mutex::new(Inner {
                registry: AgentRegistry::new(),
                approvals: ApprovalQueue::new(),
                workflows: HashMap::new(),
                instances: HashMap::new(),
                tasks_observed: 0,
            }),
        }
    }

    /// Records an agent for routing. Duplicate names are rejected and the
    /// original record kept.
    pub fn register_agent(
        &self,
        name: &str,
        agent_type: &str,
        capabilities: Vec<String>,
    ) -> ConductorResult<()> {
        self.inner
            .lock()
            .registry
            .register(name, agent_type, capabilities)
    }

    /// Names of available agents declaring `capability`, in registration
    /// order.
    pub fn find_agents_by_capability(&self, capability: &str) -> Vec<String> {
        self.inner.lock().registry.find_by_capability(capability)
    }

    /// Dispatches the content workflow: research and keyword steps in
    /// parallel where agents exist for them, then a content-generation step
    /// that records the earlier task ids as dependencies.
    ///
    /// Dependencies are recorded on the final task, not enforced here; the
    /// content agent owns checking them. Fails with `NotFound` when no
    /// available agent declares `content_generation`.
    pub fn coordinate_workflow(&self, request: WorkflowRequest) -> ConductorResult<Uuid> {
        let workflow_id = Uuid::new_v4();
        let (record, assignments) = {
            let inner = self.inner.lock();

            let content_agent = inner
                .registry
                .find_by_capability("content_generation")
                .into_iter()
                .next()
                .ok_or_else(|| {
                    ConductorError::NotFound(
                        "no available agent with capability content_generation".to_string(),
                    )
                })?;

            let mut steps = Vec::new();
            let mut assignments = Vec::new();
            for capability in ["market_research", "keyword_research"] {
                let Some(agent) = inner
                    .registry
                    .find_by_capability(capability)
                    .into_iter()
                    .next()
                else {
                    debug!(capability, "No agent for parallel step; skipping");
                    continue;
                };
                let task = step_task(capability, &request, workflow_id, &agent, vec![]);
                steps.push(step_record(&task, capability, &agent));
                assignments.push((agent, task));
            }

            let depends_on: Vec<Uuid> = steps.iter().map(|s| s.task_id).collect();
            let task = step_task(
                "content_generation",
                &request,
                workflow_id,
                &content_agent,
                depends_on,
            );
            steps.push(step_record(&task, "content_generation", &content_agent));
            assignments.push((content_agent, task));

            (WorkflowRecord::new(workflow_id, &request, steps), assignments)
        };

        info!(
            workflow_id = %workflow_id,
            topic = %record.topic,
            steps = record.steps.len(),
            "Workflow dispatched"
        );
        // Record first so an immediate TaskResult finds the workflow.
        self.inner.lock().workflows.insert(workflow_id, record);
        for (agent, task) in assignments {
            self.broker.publish(Message::to_agent(
                ORCHESTRATOR_NAME,
                &agent,
                MessageBody::TaskAssignment { task },
            ));
        }
        Ok(workflow_id)
    }

    /// A snapshot of one workflow's bookkeeping.
    pub fn workflow(&self, workflow_id: Uuid) -> Option<WorkflowRecord> {
        self.inner.lock().workflows.get(&workflow_id).cloned()
    }

    /// Sweeps the approval queue, auto-approving pending low-impact
    /// decisions and notifying their agents. Safe to call repeatedly.
    pub fn process_approval_queue(&self) -> QueueReport {
        let (report, resolved) = self.inner.lock().approvals.process();
        for decision in resolved {
            self.notify_resolution(decision);
        }
        report
    }

    /// Manually approves a decision and notifies the requesting agent.
    pub fn approve(&self, decision_id: Uuid, approver: &str) -> ConductorResult<()> {
        let decision = self.inner.lock().approvals.approve(decision_id, approver)?;
        self.notify_resolution(decision);
        Ok(())
    }

    /// Manually rejects a decision and notifies the requesting agent.
    pub fn reject(&self, decision_id: Uuid, approver: &str, reason: &str) -> ConductorResult<()> {
        let decision = self
            .inner
            .lock()
            .approvals
            .reject(decision_id, approver, reason)?;
        self.notify_resolution(decision);
        Ok(())
    }

    /// Decisions awaiting manual resolution.
    pub fn pending_decisions(&self) -> Vec<Decision> {
        self.inner
            .lock()
            .approvals
            .pending()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Creates a work instance with status [`InstanceStatus::Active`].
    pub fn create_instance(&self, name: impl Into<String>) -> Uuid {
        let instance = WorkInstance {
            id: Uuid::new_v4(),
            name: name.into(),
            assigned_agents: Vec::new(),
            status: InstanceStatus::Active,
        };
        let id = instance.id;
        info!(instance_id = %id, name = %instance.name, "Work instance created");
        self.inner.lock().instances.insert(id, instance);
        id
    }

    /// Updates a work instance's lifecycle status.
    pub fn set_instance_status(
        &self,
        instance_id: Uuid,
        status: InstanceStatus,
    ) -> ConductorResult<()> {
        let mut inner = self.inner.lock();
        let instance = inner
            .instances
            .get_mut(&instance_id)
            .ok_or_else(|| ConductorError::NotFound(format!("instance {instance_id}")))?;
        instance.status = status;
        Ok(())
    }

    /// Assigns a registered agent to a work instance and notifies the
    /// agent. Both sides of the many-to-many record are kept; assigning
    /// twice is a no-op.
    pub fn assign_agent_to_instance(
        &self,
        agent_name: &str,
        instance_id: Uuid,
    ) -> ConductorResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.registry.get(agent_name).is_none() {
                return Err(ConductorError::NotFound(format!("agent {agent_name}")));
            }
            let instance = inner
                .instances
                .get_mut(&instance_id)
                .ok_or_else(|| ConductorError::NotFound(format!("instance {instance_id}")))?;
            if instance.assigned_agents.iter().any(|a| a == agent_name) {
                return Ok(());
            }
            instance.assigned_agents.push(agent_name.to_string());
            if let Some(record) = inner.registry.get_mut(agent_name) {
                record.assigned_instances.push(instance_id);
            }
        }
        info!(agent = agent_name, instance_id = %instance_id, "Agent assigned to instance");
        self.broker.publish(Message::to_agent(
            ORCHESTRATOR_NAME,
            agent_name,
            MessageBody::InstanceAssignment {
                instance_id,
                assigned_at: Utc::now(),
            },
        ));
        Ok(())
    }

    /// A read-only view of one work instance.
    pub fn instance(&self, instance_id: Uuid) -> Option<WorkInstance> {
        self.inner.lock().instances.get(&instance_id).cloned()
    }

    /// Broadcasts a status request; agents reply to the orchestrator's
    /// channel and the registry absorbs the snapshots as they arrive.
    pub fn request_fleet_status(&self) {
        self.broker.publish(Message::broadcast(
            ORCHESTRATOR_NAME,
            MessageBody::StatusRequest,
        ));
    }

    fn notify_resolution(&self, decision: Decision) {
        let agent = decision.agent_name.clone();
        let delivered = self.broker.publish(Message::to_agent(
            ORCHESTRATOR_NAME,
            &agent,
            MessageBody::DecisionResolved { decision },
        ));
        if !delivered {
            debug!(agent = %agent, "Decision resolution not delivered");
        }
    }

    /// Fleet verdict plus per-instance assignment counts.
    pub fn system_health_check(&self) -> OrchestratorHealth {
        let inner = self.inner.lock();
        let unavailable: Vec<String> = inner
            .registry
            .records()
            .iter()
            .filter(|r| !r.is_available())
            .map(|r| r.name.clone())
            .collect();
        let total = inner.registry.len();
        let available = total - unavailable.len();
        let mut instances: Vec<InstanceReport> = inner
            .instances
            .values()
            .map(|i| InstanceReport {
                id: i.id,
                name: i.name.clone(),
                status: i.status,
                assigned_agents: i.assigned_agents.len(),
            })
            .collect();
        instances.sort_by(|a, b| a.name.cmp(&b.name));
        OrchestratorHealth {
            healthy: unavailable.is_empty(),
            total_agents: total,
            available_agents: available,
            unavailable_agents: unavailable,
            pending_approvals: inner.approvals.pending().len(),
            active_workflows: inner
                .workflows
                .values()
                .filter(|w| !w.is_complete())
                .count(),
            instances,
        }
    }
}

fn step_task(
    capability: &str,
    request: &WorkflowRequest,
    workflow_id: Uuid,
    agent: &str,
    depends_on: Vec<Uuid>,
) -> Task {
    let mut task = Task::new(capability, json!({ "topic": request.topic }))
        .with_priority(request.priority)
        .with_workflow(workflow_id)
        .with_dependencies(depends_on)
        .assigned_to(agent);
    task.instance_id = request.instance_id;
    task
}

fn step_record(task: &Task, capability: &str, agent: &str) -> WorkflowStep {
    WorkflowStep {
        task_id: task.id,
        capability: capability.to_string(),
        agent: agent.to_string(),
        depends_on: task.depends_on.clone(),
        completed: false,
    }
}

#[async_trait]
impl Agent for Orchestrator {
    fn handle(&self) -> &AgentHandle {
        &self.handle
    }

    async fn execute_task(&self, task: &Task) -> ConductorResult<TaskOutcome> {
        match task.task_type.as_str() {
            "content_workflow" => {
                let topic = task
                    .payload
                    .get("topic")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        ConductorError::Validation("content_workflow requires a topic".to_string())
                    })?;
                let mut request = WorkflowRequest::new(topic);
                request.instance_id = task.instance_id;
                request.priority = task.priority;
                let workflow_id = self.coordinate_workflow(request)?;
                Ok(TaskOutcome::completed(json!({ "workflow_id": workflow_id })))
            }
            "process_approvals" => {
                let report = self.process_approval_queue();
                Ok(TaskOutcome::completed(serde_json::to_value(report)?))
            }
            other => Ok(TaskOutcome::unsupported(other.to_string())),
        }
    }

    async fn on_message(&self, message: &Message) -> ConductorResult<()> {
        match &message.body {
            MessageBody::ApprovalRequest { decision } => {
                self.inner.lock().approvals.enqueue(decision.clone());
            }
            MessageBody::TaskResult {
                task_id,
                workflow_id,
                outcome,
            } => {
                let mut inner = self.inner.lock();
                inner.tasks_observed += 1;
                if let Some(wf_id) = workflow_id {
                    if let Some(record) = inner.workflows.get_mut(wf_id) {
                        record.mark_completed(*task_id);
                        let (done, total) = record.progress();
                        info!(
                            workflow_id = %wf_id,
                            task_id = %task_id,
                            progress = format!("{done}/{total}"),
                            success = matches!(outcome, TaskOutcome::Completed { .. }),
                            "Workflow step finished"
                        );
                    }
                }
            }
            MessageBody::StatusResponse { snapshot } => {
                if !self.inner.lock().registry.absorb_snapshot(snapshot) {
                    debug!(agent = %snapshot.name, "Snapshot from unregistered agent");
                }
            }
            MessageBody::AgentRegistered {
                name,
                agent_type,
                capabilities,
            } => {
                // Already-known names are fine: explicit registration and
                // the broadcast both announce the same agent.
                if self
                    .register_agent(name, agent_type, capabilities.clone())
                    .is_err()
                {
                    debug!(agent = %name, "Agent already known");
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn state_snapshot(&self) -> serde_json::Value {
        let inner = self.inner.lock();
        json!({
            "registered_agents": inner.registry.len(),
            "pending_approvals": inner.approvals.pending().len(),
            "active_workflows": inner.workflows.values().filter(|w| !w.is_complete()).count(),
            "work_instances": inner.instances.len(),
            "tasks_observed": inner.tasks_observed,
        })
    }
}
