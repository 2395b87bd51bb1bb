use conductor_core::{ApprovalStatus, ConductorError, ConductorResult, Decision, ImpactLevel};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Counts reported by a sweep of the approval queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueReport {
    /// Decisions auto-approved during this sweep.
    pub processed_count: usize,
    /// Decisions still awaiting manual resolution after the sweep.
    pub pending_count: usize,
}

/// The orchestrator's gate for impactful decisions.
///
/// Decisions arrive via `ApprovalRequest` messages and stay here until
/// resolved. Resolved decisions are retained for audit until drained.
#[derive(Debug, Default)]
pub struct ApprovalQueue {
    decisions: Vec<Decision>,
}

impl ApprovalQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an inbound decision. Re-submission of a known id is ignored.
    pub fn enqueue(&mut self, decision: Decision) {
        if self.decisions.iter().any(|d| d.id == decision.id) {
            warn!(decision_id = %decision.id, "Duplicate approval request ignored");
            return;
        }
        info!(
            decision_id = %decision.id,
            agent = %decision.agent_name,
            impact = ?decision.impact,
            "Decision queued for approval"
        );
        self.decisions.push(decision);
    }

    /// Sweeps the queue: pending low-impact decisions are auto-approved;
    /// medium and high impact stay pending for manual resolution. Already
    /// resolved decisions are never revisited, so repeated sweeps are
    /// idempotent.
    pub fn process(&mut self) -> (QueueReport, Vec<Decision>) {
        let mut resolved = Vec::new();
        let mut pending = 0usize;
        for decision in &mut self.decisions {
            if decision.is_resolved() {
                continue;
            }
            if decision.impact == ImpactLevel::Low {
                // Cannot fail: the decision was just checked to be pending.
                if decision.approve("auto").is_ok() {
                    resolved.push(decision.clone());
                }
            } else {
                pending += 1;
            }
        }
        let report = QueueReport {
            processed_count: resolved.len(),
            pending_count: pending,
        };
        info!(
            processed = report.processed_count,
            pending = report.pending_count,
            "Approval queue processed"
        );
        (report, resolved)
    }

    /// Manually approves a pending decision, returning the resolved record.
    pub fn approve(&mut self, decision_id: Uuid, approver: &str) -> ConductorResult<Decision> {
        let decision = self.get_mut(decision_id)?;
        decision.approve(approver)?;
        info!(decision_id = %decision_id, approver, "Decision approved");
        Ok(decision.clone())
    }

    /// Manually rejects a pending decision, returning the resolved record.
    pub fn reject(
        &mut self,
        decision_id: Uuid,
        approver: &str,
        reason: &str,
    ) -> ConductorResult<Decision> {
        let decision = self.get_mut(decision_id)?;
        decision.reject(approver, reason)?;
        info!(decision_id = %decision_id, approver, reason, "Decision rejected");
        Ok(decision.clone())
    }

    /// Decisions still awaiting manual resolution, oldest first.
    pub fn pending(&self) -> Vec<&Decision> {
        self.decisions
            .iter()
            .filter(|d| d.approval_status == ApprovalStatus::Pending)
            .collect()
    }

    /// Looks up a decision by id.
    pub fn get(&self, decision_id: Uuid) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.id == decision_id)
    }

    /// Total decisions held, resolved included.
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    /// True when no decision is held.
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    fn get_mut(&mut self, decision_id: Uuid) -> ConductorResult<&mut Decision> {
        self.decisions
            .iter_mut()
            .find(|d| d.id == decision_id)
            .ok_or_else(|| ConductorError::NotFound(format!("decision {decision_id}")))
    }
}
