//! Process entry point: loads config, wires broker, manager and
//! orchestrator together, and runs the fleet until interrupted.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use conductor_agent::{Agent, AgentHandle};
use conductor_broker::Broker;
use conductor_core::{ConductorResult, Task, TaskOutcome};
use conductor_manager::{AgentManager, ManagerConfig};
use conductor_orchestrator::{Orchestrator, WorkflowRequest};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conductor", about = "Conductor — agent fleet coordination core")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "conductor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fleet until interrupted
    Run,
    /// Load and validate the config, then exit
    Check,
}

#[derive(Deserialize)]
struct ConductorConfig {
    #[serde(default)]
    fleet: FleetConfig,
    #[serde(default)]
    agents: Vec<AgentConfig>,
    /// Work instance names to create at startup.
    #[serde(default)]
    instances: Vec<String>,
}

#[derive(Deserialize)]
struct FleetConfig {
    /// Seconds to wait for an agent to stop before aborting it.
    #[serde(default = "default_stop_grace")]
    stop_grace_secs: u64,
    /// Seconds of silence after which an agent counts as unresponsive.
    #[serde(default = "default_staleness")]
    staleness_secs: u64,
    /// Seconds between periodic health checks and approval sweeps.
    #[serde(default = "default_health_interval")]
    health_interval_secs: u64,
    /// Topic to dispatch a demonstration workflow for at startup.
    #[serde(default)]
    demo_topic: Option<String>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            stop_grace_secs: default_stop_grace(),
            staleness_secs: default_staleness(),
            health_interval_secs: default_health_interval(),
            demo_topic: None,
        }
    }
}

#[derive(Deserialize)]
struct AgentConfig {
    name: String,
    agent_type: String,
    #[serde(default)]
    capabilities: Vec<String>,
}

fn default_stop_grace() -> u64 {
    5
}
fn default_staleness() -> u64 {
    600
}
fn default_health_interval() -> u64 {
    60
}

/// A config-declared agent that acknowledges tasks matching its
/// capabilities. Stands in for the concrete agents of the full system,
/// which live outside the coordination core.
struct RosterAgent {
    handle: AgentHandle,
}

impl RosterAgent {
    fn new(config: &AgentConfig) -> Arc<Self> {
        Arc::new(Self {
            handle: AgentHandle::new(
                &config.name,
                &config.agent_type,
                config.capabilities.clone(),
            ),
        })
    }
}

#[async_trait]
impl Agent for RosterAgent {
    fn handle(&self) -> &AgentHandle {
        &self.handle
    }

    async fn execute_task(&self, task: &Task) -> ConductorResult<TaskOutcome> {
        if !self.handle.capabilities().contains(&task.task_type) {
            return Ok(TaskOutcome::unsupported(task.task_type.clone()));
        }
        info!(
            agent = self.handle.name(),
            task_type = %task.task_type,
            task_id = %task.id,
            "Task acknowledged"
        );
        Ok(TaskOutcome::completed(serde_json::json!({
            "handled_by": self.handle.name(),
            "task_type": task.task_type,
        })))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            cli.config.display(),
            e
        )
    })?;
    let config: ConductorConfig = toml::from_str(&config_str)?;

    match cli.command {
        Commands::Check => {
            info!(
                agents = config.agents.len(),
                instances = config.instances.len(),
                "Config OK"
            );
            Ok(())
        }
        Commands::Run => run(config).await,
    }
}

async fn run(config: ConductorConfig) -> anyhow::Result<()> {
    let broker = Arc::new(Broker::new());
    let manager = Arc::new(AgentManager::with_config(
        Arc::clone(&broker),
        ManagerConfig {
            stop_grace: Duration::from_secs(config.fleet.stop_grace_secs),
            staleness_threshold: Duration::from_secs(config.fleet.staleness_secs),
        },
    ));
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&broker)));

    // The orchestrator runs under the manager like any other agent. It is
    // registered first so it hears the roster's registration broadcasts.
    manager.register(Arc::clone(&orchestrator) as Arc<dyn Agent>)?;
    manager.start(conductor_core::ORCHESTRATOR_NAME)?;

    for agent_config in &config.agents {
        let agent = RosterAgent::new(agent_config);
        orchestrator.register_agent(
            &agent_config.name,
            &agent_config.agent_type,
            agent_config.capabilities.clone(),
        )?;
        manager.register(agent as Arc<dyn Agent>)?;
    }
    let report = manager.start_all();
    if !report.failed.is_empty() {
        for fault in &report.failed {
            warn!(agent = %fault.agent, reason = %fault.reason, "Agent failed to start");
        }
    }
    info!(agents = report.succeeded.len(), "Fleet running");

    for name in &config.instances {
        let instance_id = orchestrator.create_instance(name);
        for agent_config in &config.agents {
            if let Err(e) = orchestrator.assign_agent_to_instance(&agent_config.name, instance_id)
            {
                warn!(agent = %agent_config.name, error = %e, "Instance assignment failed");
            }
        }
    }

    if let Some(topic) = &config.fleet.demo_topic {
        match orchestrator.coordinate_workflow(WorkflowRequest::new(topic.clone())) {
            Ok(workflow_id) => {
                info!(workflow_id = %workflow_id, topic = %topic, "Demo workflow dispatched");
            }
            Err(e) => warn!(error = %e, "Demo workflow not dispatched"),
        }
    }

    // Periodic supervision: health verdicts and approval sweeps on one
    // timer, replacing the original's sleep-poll loops.
    let supervision = {
        let manager = Arc::clone(&manager);
        let orchestrator = Arc::clone(&orchestrator);
        let interval = Duration::from_secs(config.fleet.health_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                let health = manager.health_check();
                if health.is_healthy() {
                    info!(
                        running = health.running_agents,
                        total = health.total_agents,
                        "Fleet healthy"
                    );
                } else {
                    for fault in &health.faults {
                        warn!(agent = %fault.agent, reason = %fault.reason, "Unhealthy agent");
                    }
                }
                let approvals = orchestrator.process_approval_queue();
                if approvals.pending_count > 0 {
                    info!(
                        pending = approvals.pending_count,
                        "Decisions awaiting manual approval"
                    );
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    supervision.abort();

    let report = manager.stop_all().await;
    for fault in &report.failed {
        warn!(agent = %fault.agent, reason = %fault.reason, "Agent did not stop cleanly");
    }
    broker.shutdown();

    let stats = manager.statistics();
    info!(
        agents_started = stats.agents_started,
        agents_stopped = stats.agents_stopped,
        messages_published = stats.broker.messages_published,
        messages_delivered = stats.broker.messages_delivered,
        tasks_enqueued = stats.broker.tasks_enqueued,
        tasks_dequeued = stats.broker.tasks_dequeued,
        "Fleet stopped"
    );
    Ok(())
}
