use crate::health::{AgentFault, FleetHealth, HealthReport};
use chrono::Utc;
use conductor_agent::{Agent, AgentWorker, WorkerHandle};
use conductor_broker::{Broker, BrokerStats};
use conductor_core::{
    AgentStatus, ConductorError, ConductorResult, Message, MessageBody, StatusSnapshot, Task,
    TaskSubmission,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Tunables for the manager's supervision behavior.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How long `stop` waits for a worker before aborting it.
    pub stop_grace: Duration,
    /// Agents silent longer than this are flagged unresponsive.
    pub staleness_threshold: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(5),
            staleness_threshold: Duration::from_secs(600),
        }
    }
}

struct Entry {
    agent: Arc<dyn Agent>,
    worker: Option<WorkerHandle>,
}

/// Supervises a fleet of agents over a shared [`Broker`].
///
/// Registration order is preserved and meaningful: bulk operations and
/// reports walk agents in the order they were registered.
pub struct AgentManager {
    broker: Arc<Broker>,
    config: ManagerConfig,
    registry: Mutex<Vec<Entry>>,
    started_at: chrono::DateTime<Utc>,
    agents_started: AtomicU64,
    agents_stopped: AtomicU64,
}

impl AgentManager {
    /// Creates a manager with default tunables.
    pub fn new(broker: Arc<Broker>) -> Self {
        Self::with_config(broker, ManagerConfig::default())
    }

    /// Creates a manager with explicit tunables.
    pub fn with_config(broker: Arc<Broker>, config: ManagerConfig) -> Self {
        Self {
            broker,
            config,
            registry: Mutex::new(Vec::new()),
            started_at: Utc::now(),
            agents_started: AtomicU64::new(0),
            agents_stopped: AtomicU64::new(0),
        }
    }

    /// The broker this manager supervises over.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Registers an agent without starting it.
    ///
    /// Announces the newcomer on the global channel. A duplicate name is
    /// rejected and the original registration is left untouched.
    pub fn register(&self, agent: Arc<dyn Agent>) -> ConductorResult<()> {
        let name = agent.name().to_string();
        {
            let mut registry = self.registry.lock();
            if registry.iter().any(|e| e.agent.name() == name) {
                return Err(ConductorError::Validation(format!(
                    "agent {name} is already registered"
                )));
            }
            registry.push(Entry {
                agent: Arc::clone(&agent),
                worker: None,
            });
        }
        info!(agent = %name, agent_type = agent.agent_type(), "Agent registered");
        self.broker.publish(Message::broadcast(
            "manager",
            MessageBody::AgentRegistered {
                name,
                agent_type: agent.agent_type().to_string(),
                capabilities: agent.capabilities(),
            },
        ));
        Ok(())
    }

    /// Names of all registered agents, in registration order.
    pub fn agent_names(&self) -> Vec<String> {
        self.registry
            .lock()
            .iter()
            .map(|e| e.agent.name().to_string())
            .collect()
    }

    /// Starts the named agent's worker. A no-op if it is already running.
    pub fn start(&self, name: &str) -> ConductorResult<()> {
        let mut registry = self.registry.lock();
        let entry = registry
            .iter_mut()
            .find(|e| e.agent.name() == name)
            .ok_or_else(|| ConductorError::NotFound(format!("agent {name}")))?;

        match &entry.worker {
            Some(worker) if !worker.is_finished() => return Ok(()),
            _ => {}
        }
        entry.worker = Some(AgentWorker::spawn(
            Arc::clone(&entry.agent),
            Arc::clone(&self.broker),
        ));
        self.agents_started.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Stops the named agent's worker, waiting at most the configured grace
    /// period. A no-op if it is not running; unknown names are an error.
    ///
    /// A stop that exceeds the grace period aborts the worker, reports
    /// `Timeout`, and keeps the dead worker on the entry so subsequent
    /// health checks list the agent as faulted until it is started again.
    pub async fn stop(&self, name: &str) -> ConductorResult<()> {
        let worker = {
            let mut registry = self.registry.lock();
            let entry = registry
                .iter_mut()
                .find(|e| e.agent.name() == name)
                .ok_or_else(|| ConductorError::NotFound(format!("agent {name}")))?;
            entry.worker.take()
        };
        let Some(mut worker) = worker else {
            return Ok(());
        };
        let result = worker.stop(self.config.stop_grace).await;
        if result.is_err() {
            let mut registry = self.registry.lock();
            if let Some(entry) = registry.iter_mut().find(|e| e.agent.name() == name) {
                entry.worker = Some(worker);
            }
        }
        self.agents_stopped.fetch_add(1, Ordering::Relaxed);
        result
    }

    /// Starts every registered agent, reporting per-agent failures.
    pub fn start_all(&self) -> FleetReport {
        let mut report = FleetReport::default();
        for name in self.agent_names() {
            match self.start(&name) {
                Ok(()) => report.succeeded.push(name),
                Err(e) => report.failed.push(AgentFault {
                    agent: name,
                    reason: e.to_string(),
                }),
            }
        }
        info!(
            started = report.succeeded.len(),
            failed = report.failed.len(),
            "Fleet start complete"
        );
        report
    }

    /// Stops every running agent. Agents that exceed the grace period are
    /// aborted and reported as failures; the sweep continues past them.
    pub async fn stop_all(&self) -> FleetReport {
        let mut report = FleetReport::default();
        for name in self.agent_names() {
            match self.stop(&name).await {
                Ok(()) => report.succeeded.push(name),
                Err(e) => {
                    warn!(agent = %name, error = %e, "Agent failed to stop cleanly");
                    report.failed.push(AgentFault {
                        agent: name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!(
            stopped = report.succeeded.len(),
            failed = report.failed.len(),
            "Fleet stop complete"
        );
        report
    }

    /// Inspects every registered agent and renders a fleet verdict.
    ///
    /// A running agent is faulted when its worker task has exited on its
    /// own, when it sits in the error status, or when it has not been seen
    /// within the staleness threshold. Agents that were never started (or
    /// were stopped deliberately) do not count against health.
    pub fn health_check(&self) -> HealthReport {
        let now = Utc::now();
        let staleness =
            chrono::Duration::from_std(self.config.staleness_threshold).unwrap_or_else(|_| {
                // Out-of-range thresholds only arise from absurd configs.
                chrono::Duration::seconds(600)
            });

        let registry = self.registry.lock();
        let mut faults = Vec::new();
        let mut running = 0usize;

        for entry in registry.iter() {
            let handle = entry.agent.handle();
            let name = handle.name().to_string();
            let Some(worker) = &entry.worker else {
                continue;
            };
            if worker.is_finished() {
                faults.push(AgentFault {
                    agent: name,
                    reason: "worker exited unexpectedly".into(),
                });
                continue;
            }
            running += 1;
            if handle.status() == AgentStatus::Error {
                faults.push(AgentFault {
                    agent: name,
                    reason: "agent is in error state".into(),
                });
            } else if now - handle.last_seen() > staleness {
                faults.push(AgentFault {
                    agent: name,
                    reason: format!(
                        "unresponsive: last seen {}",
                        handle.last_seen().to_rfc3339()
                    ),
                });
            }
        }

        let status = if faults.is_empty() {
            FleetHealth::Healthy
        } else {
            FleetHealth::Degraded
        };
        HealthReport {
            status,
            total_agents: registry.len(),
            running_agents: running,
            faults,
            checked_at: now,
        }
    }

    /// Point-in-time status snapshots for every registered agent.
    pub fn statuses(&self) -> Vec<StatusSnapshot> {
        self.registry
            .lock()
            .iter()
            .map(|e| e.agent.handle().snapshot(e.agent.state_snapshot()))
            .collect()
    }

    /// Counters for the fleet, folded together with the broker's.
    pub fn statistics(&self) -> ManagerStats {
        let registry = self.registry.lock();
        let running = registry
            .iter()
            .filter(|e| e.worker.as_ref().is_some_and(|w| !w.is_finished()))
            .count();
        ManagerStats {
            total_agents: registry.len(),
            running_agents: running,
            agents_started: self.agents_started.load(Ordering::Relaxed),
            agents_stopped: self.agents_stopped.load(Ordering::Relaxed),
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            broker: self.broker.statistics(),
        }
    }

    /// Validates an inbound submission and enqueues it on the named queue.
    /// Returns the id of the created task.
    pub fn submit(&self, queue: &str, submission: TaskSubmission) -> ConductorResult<Uuid> {
        let task = submission.into_task()?;
        let task_id = task.id;
        self.broker.enqueue_task(queue, task)?;
        Ok(task_id)
    }

    /// Sends a task directly to a registered agent's channel.
    pub fn dispatch_to(&self, agent_name: &str, task: Task) -> ConductorResult<()> {
        if !self
            .registry
            .lock()
            .iter()
            .any(|e| e.agent.name() == agent_name)
        {
            return Err(ConductorError::NotFound(format!("agent {agent_name}")));
        }
        let delivered = self.broker.publish(Message::to_agent(
            "manager",
            agent_name,
            MessageBody::TaskAssignment {
                task: task.assigned_to(agent_name),
            },
        ));
        if !delivered {
            return Err(ConductorError::Transport(format!(
                "agent {agent_name} is registered but not listening"
            )));
        }
        Ok(())
    }
}

/// Outcome of a bulk start or stop sweep.
#[derive(Debug, Default, Clone, Serialize)]
pub struct FleetReport {
    /// Agents the operation succeeded for, in registration order.
    pub succeeded: Vec<String>,
    /// Agents the operation failed for, with reasons.
    pub failed: Vec<AgentFault>,
}

/// Fleet counters plus the underlying broker's counters.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    /// Number of registered agents.
    pub total_agents: usize,
    /// Number of agents with a live worker.
    pub running_agents: usize,
    /// Workers spawned since construction.
    pub agents_started: u64,
    /// Workers stopped (cleanly or aborted) since construction.
    pub agents_stopped: u64,
    /// Seconds since the manager was constructed.
    pub uptime_secs: u64,
    /// The broker's own counters.
    pub broker: BrokerStats,
}
