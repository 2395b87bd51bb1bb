//! Fleet supervision: registration, worker lifecycle, and health checks.
//!
//! The manager owns the mapping from agent names to running workers. It
//! never touches an agent's status directly; it observes statuses through
//! [`conductor_agent::AgentHandle`] snapshots and reports on them.

mod health;
mod manager;

pub use health::{AgentFault, FleetHealth, HealthReport};
pub use manager::{AgentManager, FleetReport, ManagerConfig, ManagerStats};
