use crate::decision::Decision;
use crate::status::StatusSnapshot;
use crate::task::{Task, TaskOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The broadcast channel every agent subscribes to.
pub const GLOBAL_CHANNEL: &str = "agents.global";

/// The channel an individual agent listens on.
pub fn agent_channel(agent_name: &str) -> String {
    format!("agents.{agent_name}")
}

/// A message exchanged between agents through the broker.
///
/// Immutable once published; the broker hands clones to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// Name of the agent (or component) that published the message.
    pub from_agent: String,
    /// The channel this message is addressed to.
    pub channel: String,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
    /// The typed payload.
    pub body: MessageBody,
}

impl Message {
    /// Creates a message addressed to an arbitrary channel.
    pub fn new(from_agent: impl Into<String>, channel: impl Into<String>, body: MessageBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_agent: from_agent.into(),
            channel: channel.into(),
            timestamp: Utc::now(),
            body,
        }
    }

    /// Creates a message addressed to a specific agent's channel.
    pub fn to_agent(from_agent: impl Into<String>, to_agent: &str, body: MessageBody) -> Self {
        Self::new(from_agent, agent_channel(to_agent), body)
    }

    /// Creates a message addressed to the global broadcast channel.
    pub fn broadcast(from_agent: impl Into<String>, body: MessageBody) -> Self {
        Self::new(from_agent, GLOBAL_CHANNEL, body)
    }
}

/// The closed set of message kinds agents exchange.
///
/// Dispatch on this enum is exhaustive; an unknown `type` tag fails
/// deserialization at the boundary instead of falling through silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    /// A task handed to the addressed agent for execution.
    TaskAssignment {
        /// The task to execute.
        task: Task,
    },
    /// The outcome of a previously assigned task, tagged with its id.
    TaskResult {
        /// Id of the task this result corresponds to.
        task_id: Uuid,
        /// Workflow the task belonged to, if any.
        workflow_id: Option<Uuid>,
        /// The typed outcome.
        outcome: TaskOutcome,
    },
    /// A request for the addressed agent's status snapshot.
    StatusRequest,
    /// A status snapshot, sent in reply to [`MessageBody::StatusRequest`]
    /// or as an unsolicited heartbeat.
    StatusResponse {
        /// The read-only snapshot.
        snapshot: StatusSnapshot,
    },
    /// A free-form coordination message between agents.
    Coordination {
        /// What this coordination concerns.
        topic: String,
        /// Topic-specific payload, opaque to the core.
        payload: serde_json::Value,
    },
    /// A medium/high-impact decision submitted for approval.
    ApprovalRequest {
        /// The pending decision.
        decision: Decision,
    },
    /// Notification that a queued decision was approved or rejected.
    DecisionResolved {
        /// The decision with its resolution fields set.
        decision: Decision,
    },
    /// Broadcast on the global channel when an agent joins the fleet.
    AgentRegistered {
        /// The new agent's name.
        name: String,
        /// The new agent's type.
        agent_type: String,
        /// Capabilities the agent declares.
        capabilities: Vec<String>,
    },
    /// Notification that the addressed agent was assigned to a work instance.
    InstanceAssignment {
        /// The work instance id.
        instance_id: Uuid,
        /// When the assignment was made.
        assigned_at: DateTime<Utc>,
    },
    /// An operator control command for the addressed agent.
    Control {
        /// The command to apply.
        command: ControlCommand,
    },
}

/// Operator commands that drive an agent's status state machine from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    /// Suspend task handling: `idle | active -> paused`.
    Pause,
    /// Resume task handling: `paused -> idle`.
    Resume,
    /// Operator reset after a failure: `error -> idle`.
    ResetError,
}
