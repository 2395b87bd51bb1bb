use crate::handle::AgentHandle;
use async_trait::async_trait;
use conductor_broker::Broker;
use conductor_core::{
    ConductorResult, Decision, DecisionOutcome, ImpactLevel, Message, MessageBody, Task,
    TaskOutcome, ORCHESTRATOR_NAME,
};
use tracing::{debug, info};

/// The capability contract every agent in the fleet implements.
///
/// [`Agent::execute_task`] is the single extension point; the coordination
/// core treats it as an opaque operation. Expected business conditions —
/// an unknown task type, a failure the agent caught — are returned as
/// [`TaskOutcome`] variants, not errors; an `Err` is reserved for faults
/// the agent could not absorb and transitions its worker to `error`.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The agent's shared identity/state handle, created at construction.
    fn handle(&self) -> &AgentHandle;

    /// The agent's unique name.
    fn name(&self) -> &str {
        self.handle().name()
    }

    /// The agent's type label, e.g. `market_analytics`.
    fn agent_type(&self) -> &str {
        self.handle().agent_type()
    }

    /// Static capability declaration used for routing; must not change at
    /// runtime.
    fn capabilities(&self) -> Vec<String> {
        self.handle().capabilities().to_vec()
    }

    /// Executes one task. Unknown task types return
    /// [`TaskOutcome::Unsupported`], not an error.
    async fn execute_task(&self, task: &Task) -> ConductorResult<TaskOutcome>;

    /// Hook for coordination messages from other agents.
    async fn handle_coordination(
        &self,
        topic: &str,
        payload: &serde_json::Value,
    ) -> ConductorResult<()> {
        debug!(agent = self.name(), topic, ?payload, "Coordination message received");
        Ok(())
    }

    /// Executes a decision that did not require approval. Concrete agents
    /// override this to give their decisions effect.
    async fn execute_decision(&self, decision: &Decision) -> ConductorResult<serde_json::Value> {
        info!(
            agent = self.name(),
            decision_type = %decision.decision_type,
            "Executing decision"
        );
        Ok(serde_json::json!({ "status": "completed" }))
    }

    /// Hook invoked when a previously queued decision comes back resolved.
    async fn handle_decision_resolved(&self, decision: &Decision) {
        info!(
            agent = self.name(),
            decision_id = %decision.id,
            status = ?decision.approval_status,
            "Decision resolved"
        );
    }

    /// Hook for message kinds outside the worker's standard dispatch set
    /// (task results, approval requests, status responses). Plain agents
    /// ignore them; the orchestrator listens here.
    async fn on_message(&self, _message: &Message) -> ConductorResult<()> {
        Ok(())
    }

    /// Agent-specific state included in status snapshots.
    fn state_snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Makes a decision and routes it by impact.
    ///
    /// Low impact executes synchronously through
    /// [`Agent::execute_decision`]. Medium/high impact publishes an
    /// approval request to the orchestrator and returns
    /// `PendingApproval` immediately; resolution arrives later as a
    /// `DecisionResolved` message, never in the same call.
    async fn make_decision(
        &self,
        broker: &Broker,
        decision_type: &str,
        payload: serde_json::Value,
        impact: ImpactLevel,
    ) -> ConductorResult<DecisionOutcome> {
        let decision = Decision::new(self.name(), decision_type, payload, impact);
        self.handle().record_decision();

        if decision.requires_approval {
            let decision_id = decision.id;
            info!(
                agent = self.name(),
                decision_type,
                impact = ?impact,
                "Decision requires approval, queueing with orchestrator"
            );
            broker.publish(Message::to_agent(
                self.name(),
                ORCHESTRATOR_NAME,
                MessageBody::ApprovalRequest { decision },
            ));
            Ok(DecisionOutcome::PendingApproval { decision_id })
        } else {
            let result = self.execute_decision(&decision).await?;
            Ok(DecisionOutcome::Executed { result })
        }
    }
}
