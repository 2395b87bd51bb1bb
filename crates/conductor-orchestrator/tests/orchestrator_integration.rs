//! End-to-end coordination flows over a live broker.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use conductor_agent::{Agent, AgentHandle, AgentWorker};
use conductor_broker::Broker;
use conductor_core::{
    agent_channel, ConductorError, ConductorResult, DecisionOutcome, ImpactLevel, Message,
    MessageBody, Task, TaskOutcome, ORCHESTRATOR_NAME,
};
use conductor_orchestrator::{InstanceStatus, Orchestrator, WorkflowRequest};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct StubAgent {
    handle: AgentHandle,
}

impl StubAgent {
    fn new(name: &str, capabilities: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            handle: AgentHandle::new(
                name,
                "stub",
                capabilities.iter().map(|c| c.to_string()).collect(),
            ),
        })
    }
}

#[async_trait]
impl Agent for StubAgent {
    fn handle(&self) -> &AgentHandle {
        &self.handle
    }

    async fn execute_task(&self, task: &Task) -> ConductorResult<TaskOutcome> {
        Ok(TaskOutcome::completed(json!({ "echo": task.task_type })))
    }
}

/// Polls until `predicate` holds or the deadline passes.
async fn wait_for(mut predicate: impl FnMut() -> bool) {
    for _ in 0..100 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within deadline");
}

#[tokio::test]
async fn test_capability_lookup_returns_only_matching_agents() {
    let broker = Arc::new(Broker::new());
    let orchestrator = Orchestrator::new(Arc::clone(&broker));
    orchestrator
        .register_agent("researcher", "analytics", vec!["market_research".into()])
        .unwrap();
    orchestrator
        .register_agent("writer", "content", vec!["content_generation".into()])
        .unwrap();

    assert_eq!(
        orchestrator.find_agents_by_capability("content_generation"),
        vec!["writer".to_string()]
    );
    assert_eq!(
        orchestrator.find_agents_by_capability("market_research"),
        vec!["researcher".to_string()]
    );
    assert!(orchestrator.find_agents_by_capability("seo").is_empty());
}

#[tokio::test]
async fn test_workflow_dispatches_parallel_steps_then_dependent_final() {
    let broker = Arc::new(Broker::new());
    let mut research_inbox = broker.subscribe(&agent_channel("researcher"));
    let mut writer_inbox = broker.subscribe(&agent_channel("writer"));

    let orchestrator = Orchestrator::new(Arc::clone(&broker));
    orchestrator
        .register_agent("researcher", "analytics", vec!["market_research".into()])
        .unwrap();
    orchestrator
        .register_agent("writer", "content", vec!["content_generation".into()])
        .unwrap();

    let workflow_id = orchestrator
        .coordinate_workflow(WorkflowRequest::new("rust async patterns"))
        .unwrap();

    let research_task = match research_inbox.recv().await.unwrap().body {
        MessageBody::TaskAssignment { task } => task,
        other => panic!("expected TaskAssignment, got {other:?}"),
    };
    let content_task = match writer_inbox.recv().await.unwrap().body {
        MessageBody::TaskAssignment { task } => task,
        other => panic!("expected TaskAssignment, got {other:?}"),
    };

    assert_eq!(research_task.task_type, "market_research");
    assert_eq!(research_task.workflow_id, Some(workflow_id));
    assert!(research_task.depends_on.is_empty());

    assert_eq!(content_task.task_type, "content_generation");
    assert_eq!(content_task.workflow_id, Some(workflow_id));
    assert_eq!(content_task.depends_on, vec![research_task.id]);
    assert!(!content_task.dependencies_satisfied(&[]));
    assert!(content_task.dependencies_satisfied(&[research_task.id]));

    let record = orchestrator.workflow(workflow_id).unwrap();
    assert_eq!(record.progress(), (0, 2));
}

#[tokio::test]
async fn test_workflow_requires_a_content_agent() {
    let broker = Arc::new(Broker::new());
    let orchestrator = Orchestrator::new(Arc::clone(&broker));
    orchestrator
        .register_agent("researcher", "analytics", vec!["market_research".into()])
        .unwrap();

    let err = orchestrator
        .coordinate_workflow(WorkflowRequest::new("anything"))
        .unwrap_err();
    assert!(matches!(err, ConductorError::NotFound(_)));
}

#[tokio::test]
async fn test_workflow_completes_when_agents_report_results() {
    let broker = Arc::new(Broker::new());
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&broker)));
    let mut orchestrator_worker =
        AgentWorker::spawn(Arc::clone(&orchestrator) as Arc<dyn Agent>, Arc::clone(&broker));

    let researcher = StubAgent::new("researcher", &["market_research"]);
    let writer = StubAgent::new("writer", &["content_generation"]);
    let mut researcher_worker = AgentWorker::spawn(
        Arc::clone(&researcher) as Arc<dyn Agent>,
        Arc::clone(&broker),
    );
    let mut writer_worker =
        AgentWorker::spawn(Arc::clone(&writer) as Arc<dyn Agent>, Arc::clone(&broker));

    orchestrator
        .register_agent("researcher", "stub", vec!["market_research".into()])
        .unwrap();
    orchestrator
        .register_agent("writer", "stub", vec!["content_generation".into()])
        .unwrap();

    let workflow_id = orchestrator
        .coordinate_workflow(WorkflowRequest::new("rust async patterns"))
        .unwrap();

    wait_for(|| {
        orchestrator
            .workflow(workflow_id)
            .is_some_and(|w| w.is_complete())
    })
    .await;

    let record = orchestrator.workflow(workflow_id).unwrap();
    assert_eq!(record.progress(), (2, 2));

    researcher_worker.stop(Duration::from_secs(1)).await.unwrap();
    writer_worker.stop(Duration::from_secs(1)).await.unwrap();
    orchestrator_worker.stop(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_medium_decision_waits_for_manual_approval() {
    let broker = Arc::new(Broker::new());
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&broker)));
    let mut orchestrator_worker =
        AgentWorker::spawn(Arc::clone(&orchestrator) as Arc<dyn Agent>, Arc::clone(&broker));

    let agent = StubAgent::new("writer", &["content_generation"]);
    let mut writer_inbox = broker.subscribe(&agent_channel("writer"));

    // Low impact resolves in the same call and never reaches the queue.
    let outcome = agent
        .make_decision(
            &broker,
            "tune_tone",
            json!({"tone": "casual"}),
            ImpactLevel::Low,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, DecisionOutcome::Executed { .. }));

    // Medium impact is queued pending and is not auto-approved.
    let outcome = agent
        .make_decision(
            &broker,
            "change_publishing_schedule",
            json!({"cron": "0 6 * * *"}),
            ImpactLevel::Medium,
        )
        .await
        .unwrap();
    let decision_id = match outcome {
        DecisionOutcome::PendingApproval { decision_id } => decision_id,
        other => panic!("expected PendingApproval, got {other:?}"),
    };

    wait_for(|| !orchestrator.pending_decisions().is_empty()).await;
    let report = orchestrator.process_approval_queue();
    assert_eq!(report.processed_count, 0);
    assert_eq!(report.pending_count, 1);

    // Manual approval notifies the requesting agent exactly once.
    orchestrator.approve(decision_id, "operator").unwrap();
    let msg = writer_inbox.recv().await.unwrap();
    match msg.body {
        MessageBody::DecisionResolved { decision } => {
            assert_eq!(decision.id, decision_id);
            assert_eq!(decision.approved_by.as_deref(), Some("operator"));
        }
        other => panic!("expected DecisionResolved, got {other:?}"),
    }
    assert!(matches!(
        orchestrator.approve(decision_id, "operator-2"),
        Err(ConductorError::AlreadyResolved(_))
    ));
    assert_eq!(orchestrator.process_approval_queue().pending_count, 0);

    orchestrator_worker.stop(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_instance_assignment_bookkeeping() {
    let broker = Arc::new(Broker::new());
    let mut writer_inbox = broker.subscribe(&agent_channel("writer"));
    let orchestrator = Orchestrator::new(Arc::clone(&broker));
    orchestrator
        .register_agent("writer", "content", vec!["content_generation".into()])
        .unwrap();

    let instance_id = orchestrator.create_instance("tech-blog");
    assert!(matches!(
        orchestrator.assign_agent_to_instance("ghost", instance_id),
        Err(ConductorError::NotFound(_))
    ));

    orchestrator
        .assign_agent_to_instance("writer", instance_id)
        .unwrap();
    // Idempotent: no duplicate assignment record.
    orchestrator
        .assign_agent_to_instance("writer", instance_id)
        .unwrap();

    let instance = orchestrator.instance(instance_id).unwrap();
    assert_eq!(instance.assigned_agents, vec!["writer".to_string()]);
    assert_eq!(instance.status, InstanceStatus::Active);

    let msg = writer_inbox.recv().await.unwrap();
    match msg.body {
        MessageBody::InstanceAssignment { instance_id: got, .. } => {
            assert_eq!(got, instance_id);
        }
        other => panic!("expected InstanceAssignment, got {other:?}"),
    }

    orchestrator
        .set_instance_status(instance_id, InstanceStatus::Maintenance)
        .unwrap();
    let health = orchestrator.system_health_check();
    assert!(health.healthy);
    assert_eq!(health.instances.len(), 1);
    assert_eq!(health.instances[0].assigned_agents, 1);
    assert_eq!(health.instances[0].status, InstanceStatus::Maintenance);
}
