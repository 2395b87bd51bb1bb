use crate::{ConductorError, ConductorResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How consequential a decision is. Medium and high impact require approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    /// Self-resolved by the agent; never enters the approval queue.
    Low,
    /// Queued for manual approval.
    Medium,
    /// Queued for manual approval.
    High,
}

impl ImpactLevel {
    /// Whether this impact level routes through the approval queue.
    pub fn requires_approval(self) -> bool {
        matches!(self, ImpactLevel::Medium | ImpactLevel::High)
    }
}

/// Where a decision stands in the approval lifecycle.
///
/// Transitions `Pending -> {Approved, Rejected}` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    /// Awaiting resolution.
    Pending,
    /// Approved by an external approver (or auto-approved when low impact).
    Approved,
    /// Rejected by an external approver.
    Rejected,
}

/// A record of an agent's choice that may require external approval.
///
/// Immutable after creation except for the resolution fields, which are set
/// exactly once by [`Decision::approve`] or [`Decision::reject`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Unique identifier for this decision.
    pub id: Uuid,
    /// Name of the agent that made the decision.
    pub agent_name: String,
    /// What kind of decision this is, e.g. `adjust_research_frequency`.
    pub decision_type: String,
    /// Decision-specific data, opaque to the core.
    pub payload: serde_json::Value,
    /// How consequential the decision is.
    pub impact: ImpactLevel,
    /// Whether the decision must pass the approval queue.
    pub requires_approval: bool,
    /// Current lifecycle position.
    pub approval_status: ApprovalStatus,
    /// Who resolved the decision, once resolved.
    pub approved_by: Option<String>,
    /// Why the decision was rejected, when it was.
    pub rejection_reason: Option<String>,
    /// When the decision was created.
    pub created_at: DateTime<Utc>,
    /// When the decision was resolved, once resolved.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Decision {
    /// Creates a pending decision; `requires_approval` follows the impact.
    pub fn new(
        agent_name: impl Into<String>,
        decision_type: impl Into<String>,
        payload: serde_json::Value,
        impact: ImpactLevel,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_name: agent_name.into(),
            decision_type: decision_type.into(),
            payload,
            impact,
            requires_approval: impact.requires_approval(),
            approval_status: ApprovalStatus::Pending,
            approved_by: None,
            rejection_reason: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// True once the decision left the pending state.
    pub fn is_resolved(&self) -> bool {
        self.approval_status != ApprovalStatus::Pending
    }

    /// Marks the decision approved. Fails with
    /// [`ConductorError::AlreadyResolved`] if it was resolved before; the
    /// first resolution is never overwritten.
    pub fn approve(&mut self, approver: impl Into<String>) -> ConductorResult<()> {
        if self.is_resolved() {
            return Err(ConductorError::AlreadyResolved(self.id));
        }
        self.approval_status = ApprovalStatus::Approved;
        self.approved_by = Some(approver.into());
        self.resolved_at = Some(Utc::now());
        Ok(())
    }

    /// Marks the decision rejected, recording who and why. Same
    /// once-only contract as [`Decision::approve`].
    pub fn reject(
        &mut self,
        approver: impl Into<String>,
        reason: impl Into<String>,
    ) -> ConductorResult<()> {
        if self.is_resolved() {
            return Err(ConductorError::AlreadyResolved(self.id));
        }
        self.approval_status = ApprovalStatus::Rejected;
        self.approved_by = Some(approver.into());
        self.rejection_reason = Some(reason.into());
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

/// What a call to `make_decision` produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// Low impact: executed synchronously.
    Executed {
        /// Result of the agent's `execute_decision` hook.
        result: serde_json::Value,
    },
    /// Medium/high impact: queued with the orchestrator; resolution arrives
    /// later as a `DecisionResolved` message, never in the same call.
    PendingApproval {
        /// Id of the queued decision.
        decision_id: Uuid,
    },
}
