//! The workflow tracker: a monotonic, six-step audit trail of each order's lifecycle.
//!
//! The tracker mirrors what has been *observed*, not what the remote currently says. Steps only ever move forward;
//! if the remote reports an earlier lifecycle status after a later one was already recorded, the more advanced step
//! wins and the conflict is logged. This makes the timeline safe to show as an order-progress view even when the
//! push channel and the polling fallback deliver events out of step with each other.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::order_types::{LifecycleStatus, OrderId};

pub const STEP_CREATED: &str = "created";
pub const STEP_PAYMENT_PENDING: &str = "payment_pending";
pub const STEP_PAYMENT_CONFIRMED: &str = "payment_confirmed";
pub const STEP_PREPARATION: &str = "preparation";
pub const STEP_SHIPPED: &str = "shipped";
pub const STEP_DELIVERED: &str = "delivered";

/// The fixed step template, in order. Every order gets exactly these six; steps are never added or removed.
const STEP_TEMPLATE: [(&str, &str); 6] = [
    (STEP_CREATED, "Order created"),
    (STEP_PAYMENT_PENDING, "Payment pending"),
    (STEP_PAYMENT_CONFIRMED, "Payment confirmed"),
    (STEP_PREPARATION, "Preparation"),
    (STEP_SHIPPED, "Shipped"),
    (STEP_DELIVERED, "Delivered"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    fn rank(self) -> u8 {
        match self {
            StepStatus::Pending => 0,
            StepStatus::InProgress => 1,
            StepStatus::Completed => 2,
            StepStatus::Failed => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

/// The six-step timeline for one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWorkflow {
    pub order_id: OrderId,
    pub steps: Vec<WorkflowStep>,
}

impl OrderWorkflow {
    /// A fresh timeline: step one completed, everything else pending.
    pub fn new(order_id: OrderId) -> Self {
        let steps = STEP_TEMPLATE
            .iter()
            .enumerate()
            .map(|(i, (id, name))| WorkflowStep {
                id: (*id).to_string(),
                name: (*name).to_string(),
                status: if i == 0 { StepStatus::Completed } else { StepStatus::Pending },
                timestamp: if i == 0 { Some(Utc::now()) } else { None },
                metadata: None,
            })
            .collect();
        Self { order_id, steps }
    }

    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Computed, never stored: the timeline is complete once all six steps are completed.
    pub fn is_completed(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    pub fn has_failed(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }

    /// Move a step to `status` if that is an advance. Regressions are logged and ignored; the timeline is an audit
    /// trail and the more advanced step wins.
    fn advance(&mut self, step_id: &str, status: StepStatus) {
        let order_id = self.order_id.clone();
        let Some(step) = self.steps.iter_mut().find(|s| s.id == step_id) else {
            return;
        };
        if status.rank() <= step.status.rank() {
            if status != step.status {
                warn!(
                    "🧭 Conflicting workflow update for {order_id}: step '{step_id}' is already {:?}, ignoring {:?}",
                    step.status, status
                );
            }
            return;
        }
        step.status = status;
        step.timestamp = Some(Utc::now());
        trace!("🧭 {order_id} step '{step_id}' -> {status:?}");
    }

    /// Fail the step currently in progress. When nothing is in progress yet (a rejection straight out of pending),
    /// the first still-pending step carries the failure.
    fn fail_current(&mut self) {
        let target = self
            .steps
            .iter()
            .position(|s| s.status == StepStatus::InProgress)
            .or_else(|| self.steps.iter().position(|s| s.status == StepStatus::Pending));
        if let Some(i) = target {
            let id = self.steps[i].id.clone();
            self.advance(&id, StepStatus::Failed);
        }
    }
}

/// Tracks one [`OrderWorkflow`] per order, advancing them from the lifecycle transitions the reconciliation engine
/// observes.
#[derive(Debug, Default)]
pub struct WorkflowTracker {
    records: Mutex<HashMap<OrderId, OrderWorkflow>>,
}

impl WorkflowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate the step template for a newly created order. Idempotent.
    pub fn start_order(&self, order_id: &OrderId) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.entry(order_id.clone()).or_insert_with(|| {
            debug!("🧭 Workflow started for {order_id}");
            OrderWorkflow::new(order_id.clone())
        });
    }

    /// Advance the order's timeline for an observed lifecycle status.
    ///
    /// | Observed     | Effect                                                                   |
    /// |--------------|--------------------------------------------------------------------------|
    /// | `pending`    | nothing (step one was completed at creation)                             |
    /// | `declared`   | "payment pending" → in progress; "payment confirmed" stays pending       |
    /// | `processing` | "payment pending" → completed; "payment confirmed" → in progress         |
    /// | `confirmed`  | payment steps → completed; "preparation" → in progress                   |
    /// | `rejected`   | the step currently in progress → failed; no further advancement          |
    ///
    /// Returns `true` if the timeline became fully completed during this call.
    pub fn observe_transition(&self, order_id: &OrderId, new_status: LifecycleStatus) -> bool {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let workflow = records.entry(order_id.clone()).or_insert_with(|| OrderWorkflow::new(order_id.clone()));
        if workflow.has_failed() {
            warn!("🧭 {order_id} was rejected earlier; ignoring observed status '{new_status}'");
            return false;
        }
        let was_completed = workflow.is_completed();
        match new_status {
            LifecycleStatus::Pending => {},
            LifecycleStatus::Declared => {
                workflow.advance(STEP_PAYMENT_PENDING, StepStatus::InProgress);
            },
            LifecycleStatus::Processing => {
                workflow.advance(STEP_PAYMENT_PENDING, StepStatus::Completed);
                workflow.advance(STEP_PAYMENT_CONFIRMED, StepStatus::InProgress);
            },
            LifecycleStatus::Confirmed => {
                workflow.advance(STEP_PAYMENT_PENDING, StepStatus::Completed);
                workflow.advance(STEP_PAYMENT_CONFIRMED, StepStatus::Completed);
                workflow.advance(STEP_PREPARATION, StepStatus::InProgress);
            },
            LifecycleStatus::Rejected => {
                workflow.fail_current();
            },
        }
        maybe_complete_delivery(workflow);
        !was_completed && workflow.is_completed()
    }

    /// Record that a tracking reference appeared on the order: preparation and shipping are done and delivery is
    /// underway. Returns `true` if the timeline became fully completed during this call.
    pub fn observe_tracking_reference(&self, order_id: &OrderId, tracking_reference: &str) -> bool {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let workflow = records.entry(order_id.clone()).or_insert_with(|| OrderWorkflow::new(order_id.clone()));
        if workflow.has_failed() {
            warn!("🧭 {order_id} was rejected earlier; ignoring tracking reference");
            return false;
        }
        let was_completed = workflow.is_completed();
        workflow.advance(STEP_PREPARATION, StepStatus::Completed);
        workflow.advance(STEP_SHIPPED, StepStatus::Completed);
        workflow.advance(STEP_DELIVERED, StepStatus::InProgress);
        if let Some(step) = workflow.steps.iter_mut().find(|s| s.id == STEP_SHIPPED) {
            step.metadata = Some(json!({ "tracking_reference": tracking_reference }));
        }
        maybe_complete_delivery(workflow);
        !was_completed && workflow.is_completed()
    }

    pub fn workflow_for(&self, order_id: &OrderId) -> Option<OrderWorkflow> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(order_id).cloned()
    }

    pub fn is_completed(&self, order_id: &OrderId) -> bool {
        self.workflow_for(order_id).map(|w| w.is_completed()).unwrap_or(false)
    }
}

/// Delivery is considered done once payment was confirmed and the parcel was shipped. There is no dedicated
/// "delivered" signal from the remote service, so this is the closing rule for the timeline.
fn maybe_complete_delivery(workflow: &mut OrderWorkflow) {
    let confirmed = workflow.step(STEP_PAYMENT_CONFIRMED).map(|s| s.status == StepStatus::Completed).unwrap_or(false);
    let shipped = workflow.step(STEP_SHIPPED).map(|s| s.status == StepStatus::Completed).unwrap_or(false);
    if confirmed && shipped {
        workflow.advance(STEP_PREPARATION, StepStatus::Completed);
        workflow.advance(STEP_DELIVERED, StepStatus::Completed);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn oid() -> OrderId {
        OrderId::from("o-wf")
    }

    #[test]
    fn new_workflow_has_six_steps_with_first_completed() {
        let wf = OrderWorkflow::new(oid());
        assert_eq!(wf.steps.len(), 6);
        assert_eq!(wf.steps[0].status, StepStatus::Completed);
        assert!(wf.steps[1..].iter().all(|s| s.status == StepStatus::Pending));
        assert!(!wf.is_completed());
    }

    #[test]
    fn declared_then_confirmed_advances_payment_steps() {
        let tracker = WorkflowTracker::new();
        tracker.start_order(&oid());
        tracker.observe_transition(&oid(), LifecycleStatus::Declared);
        let wf = tracker.workflow_for(&oid()).unwrap();
        assert_eq!(wf.step(STEP_PAYMENT_PENDING).unwrap().status, StepStatus::InProgress);
        assert_eq!(wf.step(STEP_PAYMENT_CONFIRMED).unwrap().status, StepStatus::Pending);

        tracker.observe_transition(&oid(), LifecycleStatus::Confirmed);
        let wf = tracker.workflow_for(&oid()).unwrap();
        assert_eq!(wf.step(STEP_PAYMENT_PENDING).unwrap().status, StepStatus::Completed);
        assert_eq!(wf.step(STEP_PAYMENT_CONFIRMED).unwrap().status, StepStatus::Completed);
        assert_eq!(wf.step(STEP_PREPARATION).unwrap().status, StepStatus::InProgress);
    }

    #[test]
    fn rejection_fails_current_step_and_freezes_the_timeline() {
        let tracker = WorkflowTracker::new();
        tracker.start_order(&oid());
        tracker.observe_transition(&oid(), LifecycleStatus::Declared);
        tracker.observe_transition(&oid(), LifecycleStatus::Rejected);
        let wf = tracker.workflow_for(&oid()).unwrap();
        assert_eq!(wf.step(STEP_PAYMENT_PENDING).unwrap().status, StepStatus::Failed);

        // Nothing advances after a failure.
        tracker.observe_transition(&oid(), LifecycleStatus::Confirmed);
        let wf = tracker.workflow_for(&oid()).unwrap();
        assert_eq!(wf.step(STEP_PAYMENT_PENDING).unwrap().status, StepStatus::Failed);
        assert_eq!(wf.step(STEP_PAYMENT_CONFIRMED).unwrap().status, StepStatus::Pending);
    }

    #[test]
    fn steps_never_regress() {
        let tracker = WorkflowTracker::new();
        tracker.start_order(&oid());
        tracker.observe_transition(&oid(), LifecycleStatus::Confirmed);
        // A stale 'declared' arriving late must not pull "payment pending" back to in-progress.
        tracker.observe_transition(&oid(), LifecycleStatus::Declared);
        let wf = tracker.workflow_for(&oid()).unwrap();
        assert_eq!(wf.step(STEP_PAYMENT_PENDING).unwrap().status, StepStatus::Completed);
        assert_eq!(wf.step(STEP_PAYMENT_CONFIRMED).unwrap().status, StepStatus::Completed);
    }

    #[test]
    fn tracking_reference_then_confirmation_completes_delivery() {
        let tracker = WorkflowTracker::new();
        tracker.start_order(&oid());
        let done = tracker.observe_tracking_reference(&oid(), "TRACK-1");
        assert!(!done);
        let wf = tracker.workflow_for(&oid()).unwrap();
        assert_eq!(wf.step(STEP_SHIPPED).unwrap().status, StepStatus::Completed);
        assert_eq!(wf.step(STEP_DELIVERED).unwrap().status, StepStatus::InProgress);
        assert_eq!(
            wf.step(STEP_SHIPPED).unwrap().metadata.as_ref().unwrap()["tracking_reference"],
            "TRACK-1"
        );

        let done = tracker.observe_transition(&oid(), LifecycleStatus::Confirmed);
        assert!(done);
        assert!(tracker.is_completed(&oid()));
    }

    #[test]
    fn confirmation_then_tracking_reference_completes_delivery() {
        let tracker = WorkflowTracker::new();
        tracker.start_order(&oid());
        assert!(!tracker.observe_transition(&oid(), LifecycleStatus::Confirmed));
        assert!(tracker.observe_tracking_reference(&oid(), "TRACK-2"));
        assert!(tracker.is_completed(&oid()));
    }
}
