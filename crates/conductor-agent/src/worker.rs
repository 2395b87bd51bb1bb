use crate::agent::Agent;
use crate::handle::AgentHandle;
use conductor_broker::{Broker, Subscription};
use conductor_core::{
    agent_channel, AgentStatus, ConductorError, ConductorResult, ControlCommand, Message,
    MessageBody, Task, TaskOutcome, GLOBAL_CHANNEL,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Interval at which an otherwise quiet worker refreshes its `last_seen`.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Runs an [`Agent`] as an independent tokio task.
///
/// The worker subscribes to the agent's private channel and the global
/// broadcast channel, then blocks on the next inbound message, a heartbeat
/// tick, or the shutdown signal. There is no polling sleep. Stop requests
/// are cooperative: the worker checks the signal between messages, so an
/// in-flight `execute_task` is never cancelled mid-execution.
pub struct AgentWorker;

impl AgentWorker {
    /// Subscribes the agent and spawns its receive loop.
    pub fn spawn(agent: Arc<dyn Agent>, broker: Arc<Broker>) -> WorkerHandle {
        let handle = agent.handle().clone();
        let name = handle.name().to_string();

        // Subscribe before spawning so no message published after this call
        // is missed.
        let own = broker.subscribe(&agent_channel(&name));
        let global = broker.subscribe(GLOBAL_CHANNEL);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(agent = %name, "Starting agent worker");
        let join = tokio::spawn(run_loop(agent, broker, handle.clone(), own, global, shutdown_rx));

        WorkerHandle {
            name,
            handle,
            shutdown: shutdown_tx,
            join,
            joined: false,
        }
    }
}

/// Lifecycle handle for a spawned worker, held by the Manager.
pub struct WorkerHandle {
    name: String,
    handle: AgentHandle,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    // The join handle's completion has been consumed; it must not be
    // polled again.
    joined: bool,
}

impl WorkerHandle {
    /// The supervised agent's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read-only view of the agent's status and metrics.
    pub fn agent_handle(&self) -> &AgentHandle {
        &self.handle
    }

    /// True once the worker task has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Requests a cooperative shutdown and waits up to `grace` for the
    /// worker to exit. On expiry the worker is aborted, the abort is
    /// awaited so [`WorkerHandle::is_finished`] reports it right away, and
    /// a timeout error is returned; this counts as a failed stop, not a
    /// silent one. Calling again on an already-joined handle is a no-op.
    pub async fn stop(&mut self, grace: Duration) -> ConductorResult<()> {
        if self.joined {
            return Ok(());
        }
        let _ = self.shutdown.send(true);
        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(_) => {
                self.joined = true;
                info!(agent = %self.name, "Agent worker stopped");
                Ok(())
            }
            Err(_) => {
                self.join.abort();
                let _ = (&mut self.join).await;
                self.joined = true;
                warn!(agent = %self.name, ?grace, "Agent worker did not stop within grace period");
                Err(ConductorError::Timeout(format!(
                    "agent {} did not stop within {:?}",
                    self.name, grace
                )))
            }
        }
    }
}

async fn run_loop(
    agent: Arc<dyn Agent>,
    broker: Arc<Broker>,
    handle: AgentHandle,
    mut own: Subscription,
    mut global: Subscription,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = handle.name().to_string();
    let own_id = own.id();
    let global_id = global.id();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!(agent = %name, "Shutdown signal received");
                break;
            }
            _ = heartbeat.tick() => {
                handle.touch();
            }
            maybe = own.recv() => match maybe {
                Some(message) => dispatch(agent.as_ref(), &broker, &handle, message).await,
                None => break,
            },
            maybe = global.recv() => match maybe {
                // Skip the agent's own broadcasts.
                Some(message) if message.from_agent != name => {
                    dispatch(agent.as_ref(), &broker, &handle, message).await;
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    broker.unsubscribe(&agent_channel(&name), own_id);
    broker.unsubscribe(GLOBAL_CHANNEL, global_id);
    info!(agent = %name, "Agent worker exited");
}

async fn dispatch(agent: &dyn Agent, broker: &Broker, handle: &AgentHandle, message: Message) {
    handle.touch();
    handle.record_message();

    match message.body {
        MessageBody::TaskAssignment { ref task } => {
            let outcome = run_task(agent, handle, task).await;
            reply(
                broker,
                handle,
                &message.from_agent,
                MessageBody::TaskResult {
                    task_id: task.id,
                    workflow_id: task.workflow_id,
                    outcome,
                },
            );
        }
        MessageBody::StatusRequest => {
            let snapshot = handle.snapshot(agent.state_snapshot());
            reply(
                broker,
                handle,
                &message.from_agent,
                MessageBody::StatusResponse { snapshot },
            );
        }
        MessageBody::Coordination { ref topic, ref payload } => {
            if let Err(e) = agent.handle_coordination(topic, payload).await {
                warn!(agent = handle.name(), topic, error = %e, "Coordination handler failed");
            }
        }
        MessageBody::Control { command } => apply_control(handle, command),
        MessageBody::DecisionResolved { ref decision } => {
            agent.handle_decision_resolved(decision).await;
        }
        _ => {
            if let Err(e) = agent.on_message(&message).await {
                warn!(agent = handle.name(), error = %e, "Message observer failed");
            }
        }
    }
}

/// The `idle -> active -> idle|error` leg of the state machine.
async fn run_task(agent: &dyn Agent, handle: &AgentHandle, task: &Task) -> TaskOutcome {
    match handle.status() {
        AgentStatus::Paused => {
            debug!(agent = handle.name(), task_id = %task.id, "Task refused: agent paused");
            return TaskOutcome::failed(format!("agent {} is paused", handle.name()));
        }
        AgentStatus::Error => {
            debug!(agent = handle.name(), task_id = %task.id, "Task refused: agent awaiting reset");
            return TaskOutcome::failed(format!(
                "agent {} is in error state awaiting reset",
                handle.name()
            ));
        }
        AgentStatus::Idle | AgentStatus::Active => {}
    }

    handle.set_status(AgentStatus::Active);
    info!(agent = handle.name(), task_id = %task.id, task_type = %task.task_type, "Executing task");

    match agent.execute_task(task).await {
        Ok(outcome) => {
            handle.set_status(AgentStatus::Idle);
            match outcome {
                TaskOutcome::Completed { .. } => handle.record_task_completed(),
                TaskOutcome::Failed { .. } => handle.record_task_failed(),
                TaskOutcome::Unsupported { .. } => {}
            }
            outcome
        }
        Err(e) => {
            // The agent could not absorb the fault; the worker survives but
            // parks in error until an operator resets it.
            error!(agent = handle.name(), task_id = %task.id, error = %e, "Task execution failed");
            handle.set_status(AgentStatus::Error);
            handle.record_task_failed();
            TaskOutcome::failed(e.to_string())
        }
    }
}

fn apply_control(handle: &AgentHandle, command: ControlCommand) {
    let current = handle.status();
    let next = match (command, current) {
        (ControlCommand::Pause, AgentStatus::Idle | AgentStatus::Active) => AgentStatus::Paused,
        (ControlCommand::Resume, AgentStatus::Paused) => AgentStatus::Idle,
        (ControlCommand::ResetError, AgentStatus::Error) => AgentStatus::Idle,
        _ => {
            warn!(
                agent = handle.name(),
                ?command,
                ?current,
                "Control command ignored: invalid transition"
            );
            return;
        }
    };
    info!(agent = handle.name(), from = ?current, to = ?next, "Status transition");
    handle.set_status(next);
}

fn reply(broker: &Broker, handle: &AgentHandle, to_agent: &str, body: MessageBody) {
    let delivered = broker.publish(Message::to_agent(handle.name(), to_agent, body));
    if !delivered {
        // Degraded, not fatal: the requester went away or the broker closed.
        debug!(agent = handle.name(), to = to_agent, "Reply not delivered");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use uuid::Uuid;

    /// Echoes the task payload back; fails on task type `explode`.
    struct EchoAgent {
        handle: AgentHandle,
    }

    impl EchoAgent {
        fn new(name: &str) -> Self {
            Self {
                handle: AgentHandle::new(name, "echo", vec!["echo".into()]),
            }
        }
    }

    #[async_trait]
    impl Agent for EchoAgent {
        fn handle(&self) -> &AgentHandle {
            &self.handle
        }

        async fn execute_task(&self, task: &Task) -> ConductorResult<TaskOutcome> {
            if task.task_type == "explode" {
                return Err(ConductorError::Task("boom".into()));
            }
            Ok(TaskOutcome::completed(task.payload.clone()))
        }
    }

    fn assignment(to: &str, task: Task) -> Message {
        Message::to_agent("requester", to, MessageBody::TaskAssignment { task })
    }

    async fn expect_result(sub: &mut Subscription) -> (Uuid, TaskOutcome) {
        loop {
            let msg = sub.recv().await.expect("reply channel closed");
            if let MessageBody::TaskResult { task_id, outcome, .. } = msg.body {
                return (task_id, outcome);
            }
        }
    }

    async fn expect_snapshot(sub: &mut Subscription) -> conductor_core::StatusSnapshot {
        loop {
            let msg = sub.recv().await.expect("reply channel closed");
            if let MessageBody::StatusResponse { snapshot } = msg.body {
                return snapshot;
            }
        }
    }

    #[tokio::test]
    async fn test_task_assignment_executes_and_replies_with_task_id() {
        let broker = Arc::new(Broker::new());
        let mut requester = broker.subscribe("agents.requester");
        let mut worker = AgentWorker::spawn(Arc::new(EchoAgent::new("echo-1")), Arc::clone(&broker));

        let task = Task::new("echo", json!({"hello": "world"}));
        let task_id = task.id;
        broker.publish(assignment("echo-1", task));

        let (replied_id, outcome) = expect_result(&mut requester).await;
        assert_eq!(replied_id, task_id);
        assert_eq!(outcome, TaskOutcome::completed(json!({"hello": "world"})));

        assert_eq!(worker.agent_handle().status(), AgentStatus::Idle);
        assert_eq!(worker.agent_handle().metrics().tasks_completed, 1);

        worker.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_task_parks_agent_in_error_until_reset() {
        let broker = Arc::new(Broker::new());
        let mut requester = broker.subscribe("agents.requester");
        let mut worker = AgentWorker::spawn(Arc::new(EchoAgent::new("echo-2")), Arc::clone(&broker));

        broker.publish(assignment("echo-2", Task::new("explode", json!({}))));
        let (_, outcome) = expect_result(&mut requester).await;
        assert!(matches!(outcome, TaskOutcome::Failed { .. }));
        assert_eq!(worker.agent_handle().status(), AgentStatus::Error);
        assert_eq!(worker.agent_handle().metrics().tasks_failed, 1);

        // While in error, further tasks are refused.
        broker.publish(assignment("echo-2", Task::new("echo", json!({}))));
        let (_, refused) = expect_result(&mut requester).await;
        assert!(matches!(refused, TaskOutcome::Failed { .. }));

        // Operator reset brings it back to idle.
        broker.publish(Message::to_agent(
            "operator",
            "echo-2",
            MessageBody::Control {
                command: ControlCommand::ResetError,
            },
        ));
        broker.publish(Message::to_agent("requester", "echo-2", MessageBody::StatusRequest));
        let snapshot = expect_snapshot(&mut requester).await;
        assert_eq!(snapshot.status, AgentStatus::Idle);

        worker.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_request_returns_snapshot() {
        let broker = Arc::new(Broker::new());
        let mut requester = broker.subscribe("agents.requester");
        let mut worker = AgentWorker::spawn(Arc::new(EchoAgent::new("echo-3")), Arc::clone(&broker));

        broker.publish(Message::to_agent("requester", "echo-3", MessageBody::StatusRequest));
        let snapshot = expect_snapshot(&mut requester).await;
        assert_eq!(snapshot.name, "echo-3");
        assert_eq!(snapshot.status, AgentStatus::Idle);
        assert_eq!(snapshot.capabilities, vec!["echo".to_string()]);

        worker.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_pause_refuses_tasks_and_resume_restores() {
        let broker = Arc::new(Broker::new());
        let mut requester = broker.subscribe("agents.requester");
        let mut worker = AgentWorker::spawn(Arc::new(EchoAgent::new("echo-4")), Arc::clone(&broker));

        broker.publish(Message::to_agent(
            "operator",
            "echo-4",
            MessageBody::Control {
                command: ControlCommand::Pause,
            },
        ));
        broker.publish(assignment("echo-4", Task::new("echo", json!({}))));
        let (_, outcome) = expect_result(&mut requester).await;
        match outcome {
            TaskOutcome::Failed { error } => assert!(error.contains("paused")),
            other => panic!("paused agent must refuse tasks, got {other:?}"),
        }

        broker.publish(Message::to_agent(
            "operator",
            "echo-4",
            MessageBody::Control {
                command: ControlCommand::Resume,
            },
        ));
        broker.publish(assignment("echo-4", Task::new("echo", json!({"ok": true}))));
        let (_, outcome) = expect_result(&mut requester).await;
        assert_eq!(outcome, TaskOutcome::completed(json!({"ok": true})));

        worker.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_broadcast_reaches_worker_but_not_its_own() {
        let broker = Arc::new(Broker::new());
        let mut requester = broker.subscribe("agents.requester");
        let mut worker = AgentWorker::spawn(Arc::new(EchoAgent::new("echo-5")), Arc::clone(&broker));

        // A broadcast task assignment is executed like a direct one.
        broker.publish(Message::broadcast(
            "requester",
            MessageBody::TaskAssignment {
                task: Task::new("echo", json!({"via": "global"})),
            },
        ));
        let (_, outcome) = expect_result(&mut requester).await;
        assert_eq!(outcome, TaskOutcome::completed(json!({"via": "global"})));

        worker.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_prompt_for_an_idle_worker() {
        let broker = Arc::new(Broker::new());
        let mut worker = AgentWorker::spawn(Arc::new(EchoAgent::new("echo-6")), Arc::clone(&broker));
        worker.stop(Duration::from_millis(500)).await.unwrap();
    }
}
