//! The orchestrator: capability routing, workflows, work-instance
//! bookkeeping, and the approval gate for impactful decisions.
//!
//! The orchestrator is itself an agent. It runs under the same worker loop
//! as any other agent, listens on its well-known channel
//! ([`conductor_core::ORCHESTRATOR_NAME`]), and coordinates the rest of the
//! fleet through the shared broker.

mod approvals;
mod orchestrator;
mod registry;
mod workflow;

pub use approvals::{ApprovalQueue, QueueReport};
pub use orchestrator::{InstanceStatus, Orchestrator, OrchestratorHealth, WorkInstance};
pub use registry::{AgentRecord, AgentRegistry};
pub use workflow::{WorkflowRecord, WorkflowRequest, WorkflowStep};
