//! Core types and error definitions for the Conductor fleet-coordination core.
//!
//! This crate provides the foundational types shared across all Conductor
//! crates: the unified error enum, the inter-agent message envelope, tasks
//! and task outcomes, decisions with their approval lifecycle, and agent
//! status snapshots.
//!
//! # Main types
//!
//! - [`ConductorError`] — Unified error enum for all Conductor subsystems.
//! - [`ConductorResult`] — Convenience alias for `Result<T, ConductorError>`.
//! - [`Message`] / [`MessageBody`] — Envelope and closed set of message kinds.
//! - [`Task`] / [`TaskOutcome`] — A unit of work and its typed result.
//! - [`Decision`] — An agent choice that may require external approval.
//! - [`AgentStatus`] / [`StatusSnapshot`] — Agent state machine and its
//!   read-only view.

/// Decision records and the approval lifecycle.
pub mod decision;
/// The inter-agent message envelope and body variants.
pub mod message;
/// Agent status, metrics, and status snapshots.
pub mod status;
/// Tasks, task outcomes, and the inbound submission boundary.
pub mod task;

pub use decision::{ApprovalStatus, Decision, DecisionOutcome, ImpactLevel};
pub use message::{agent_channel, ControlCommand, Message, MessageBody, GLOBAL_CHANNEL};
pub use status::{AgentMetrics, AgentStatus, StatusSnapshot};
pub use task::{Task, TaskOutcome, TaskSubmission, DEFAULT_PRIORITY};

use uuid::Uuid;

/// The well-known name under which the orchestrator agent is addressed.
pub const ORCHESTRATOR_NAME: &str = "orchestrator";

// --- Error types ---

/// Top-level error type for the Conductor coordination core.
///
/// Each variant corresponds to a failure class callers are expected to
/// handle distinctly. No normal failure terminates the process; components
/// fold these into reports or surface them at the API boundary.
#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    /// Malformed caller input. Surfaced immediately, never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An unknown agent, decision, task, or instance id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An attempt to resolve an already-resolved decision.
    #[error("Decision {0} already resolved")]
    AlreadyResolved(Uuid),

    /// An agent-reported task failure. Recorded and surfaced to the
    /// requester; the agent process survives.
    #[error("Task error: {0}")]
    Task(String),

    /// The broker backend is unavailable. Operations fail closed and the
    /// component continues in degraded mode.
    #[error("Transport unavailable: {0}")]
    Transport(String),

    /// A stop or shutdown exceeded its grace period.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`ConductorError`].
pub type ConductorResult<T> = Result<T, ConductorError>;
