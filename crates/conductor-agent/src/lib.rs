//! The agent capability contract and its per-agent worker loop.
//!
//! An [`Agent`] declares a fixed set of capabilities and implements
//! [`Agent::execute_task`] as its single extension point. The
//! [`AgentWorker`] runs each agent as an independent tokio task driven by a
//! message-receive loop over the broker; the agent's status state machine
//! lives in its [`AgentHandle`], written only by that worker and read as
//! snapshots by everyone else.

/// The `Agent` trait and decision making.
mod agent;
/// The shared identity/status/metrics handle.
mod handle;
/// The worker loop and its lifecycle handle.
mod worker;

pub use agent::Agent;
pub use handle::AgentHandle;
pub use worker::{AgentWorker, WorkerHandle};
