//! Create-order saga state machine.
//!
//! The forward path, the compensation table and the mapping from failure to
//! final order status all live here as data, so the coordinator only drives
//! them.
//!
//! ```text
//! NotStarted ──► Running ──┬──────────────────────► Completed
//!                          ├──► Compensating ──┬──► Compensated
//!                          │                   └──► Failed
//!                          └──────────────────────► Failed
//! ```

use domain::{OrderStatus, StepStatus};
use serde::{Deserialize, Serialize};

use crate::services::StepFailure;
use crate::steps;

/// Lifecycle of one saga run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    #[default]
    NotStarted,
    /// Forward steps are being executed.
    Running,
    /// A step failed and completed steps are being undone.
    Compensating,
    /// Every forward step succeeded.
    Completed,
    /// Every compensation succeeded after a rejection.
    Compensated,
    /// Ended without success and without a clean unwind.
    Failed,
}

impl SagaState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed | SagaState::Compensated | SagaState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Compensated => "Compensated",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A forward step of the create-order saga, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardStep {
    ReserveInventory,
    ChargePayment,
    Finalize,
}

impl ForwardStep {
    pub const SEQUENCE: [ForwardStep; 3] = [
        ForwardStep::ReserveInventory,
        ForwardStep::ChargePayment,
        ForwardStep::Finalize,
    ];

    /// True for steps that call a participant; finalization is local.
    pub fn is_remote(&self) -> bool {
        !matches!(self, ForwardStep::Finalize)
    }

    /// The action that undoes this step once it has completed.
    pub fn compensation(&self) -> Option<Compensation> {
        match self {
            ForwardStep::ReserveInventory => Some(Compensation::ReleaseStock),
            ForwardStep::ChargePayment => Some(Compensation::RefundPayment),
            ForwardStep::Finalize => None,
        }
    }

    /// Audit step name for the given row status.
    ///
    /// Finalization is local and has no `Pending` row.
    pub fn log_name(&self, status: StepStatus) -> Option<&'static str> {
        match (self, status) {
            (ForwardStep::ReserveInventory, StepStatus::Pending) => {
                Some(steps::INVENTORY_RESERVATION_REQUESTED)
            }
            (ForwardStep::ReserveInventory, StepStatus::Completed) => {
                Some(steps::INVENTORY_RESERVATION_COMPLETED)
            }
            (ForwardStep::ReserveInventory, StepStatus::Failed) => {
                Some(steps::INVENTORY_RESERVATION_FAILED)
            }
            (ForwardStep::ChargePayment, StepStatus::Pending) => Some(steps::PAYMENT_REQUESTED),
            (ForwardStep::ChargePayment, StepStatus::Completed) => Some(steps::PAYMENT_COMPLETED),
            (ForwardStep::ChargePayment, StepStatus::Failed) => Some(steps::PAYMENT_FAILED),
            (ForwardStep::Finalize, StepStatus::Pending) => None,
            (ForwardStep::Finalize, StepStatus::Completed) => Some(steps::ORDER_COMPLETED),
            (ForwardStep::Finalize, StepStatus::Failed) => Some(steps::ORDER_FINALIZATION_FAILED),
        }
    }

    /// Order status reached when this step succeeds.
    pub fn success_status(&self) -> OrderStatus {
        match self {
            ForwardStep::ReserveInventory => OrderStatus::InventoryReserved,
            ForwardStep::ChargePayment => OrderStatus::PaymentCompleted,
            ForwardStep::Finalize => OrderStatus::Completed,
        }
    }

    /// Human-readable name used in outcome messages.
    pub fn describe(&self) -> &'static str {
        match self {
            ForwardStep::ReserveInventory => "inventory reservation",
            ForwardStep::ChargePayment => "payment",
            ForwardStep::Finalize => "order finalization",
        }
    }
}

/// A compensating action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compensation {
    ReleaseStock,
    RefundPayment,
}

impl Compensation {
    pub fn log_name(&self, status: StepStatus) -> &'static str {
        match (self, status) {
            (Compensation::ReleaseStock, StepStatus::Pending) => steps::STOCK_RELEASE_REQUESTED,
            (Compensation::ReleaseStock, StepStatus::Completed) => steps::STOCK_RELEASE_COMPLETED,
            (Compensation::ReleaseStock, StepStatus::Failed) => steps::STOCK_RELEASE_FAILED,
            (Compensation::RefundPayment, StepStatus::Pending) => steps::PAYMENT_REFUND_REQUESTED,
            (Compensation::RefundPayment, StepStatus::Completed) => {
                steps::PAYMENT_REFUND_COMPLETED
            }
            (Compensation::RefundPayment, StepStatus::Failed) => steps::PAYMENT_REFUND_FAILED,
        }
    }
}

/// Compensations for the completed steps, most recent first.
pub fn compensation_plan(completed: &[ForwardStep]) -> Vec<Compensation> {
    completed
        .iter()
        .rev()
        .filter_map(ForwardStep::compensation)
        .collect()
}

/// Coarse classification of a step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Rejected,
    Unreachable,
    Cancelled,
    Withdrawn,
    Internal,
}

impl From<&StepFailure> for FailureClass {
    fn from(failure: &StepFailure) -> Self {
        match failure {
            StepFailure::Rejected(_) => FailureClass::Rejected,
            StepFailure::Unreachable(_) => FailureClass::Unreachable,
            StepFailure::Cancelled => FailureClass::Cancelled,
            StepFailure::Withdrawn => FailureClass::Withdrawn,
            StepFailure::Internal(_) => FailureClass::Internal,
        }
    }
}

/// Final order status after `step` failed.
///
/// `compensated` is true when every compensation that ran succeeded (or none
/// were needed).
pub fn resolve_status(step: ForwardStep, class: FailureClass, compensated: bool) -> OrderStatus {
    match (step, class, compensated) {
        (_, FailureClass::Cancelled, _) => OrderStatus::CancelledByCaller,
        (_, FailureClass::Withdrawn, true) => OrderStatus::CancelledByCaller,
        (_, FailureClass::Internal, true) => OrderStatus::FullyCompensated,
        (_, FailureClass::Withdrawn | FailureClass::Internal, false) => {
            OrderStatus::CompensationFailed
        }
        (ForwardStep::ReserveInventory, FailureClass::Rejected, _) => {
            OrderStatus::InventoryReservationFailed
        }
        (ForwardStep::ReserveInventory, FailureClass::Unreachable, _) => {
            OrderStatus::InventoryServiceError
        }
        (ForwardStep::ChargePayment, FailureClass::Unreachable, _) => {
            OrderStatus::PaymentServiceError
        }
        (ForwardStep::ChargePayment, FailureClass::Rejected, true) => {
            OrderStatus::PaymentFailedStockReleased
        }
        (ForwardStep::ChargePayment, FailureClass::Rejected, false) => OrderStatus::PaymentFailed,
        (ForwardStep::Finalize, _, true) => OrderStatus::FullyCompensated,
        (ForwardStep::Finalize, _, false) => OrderStatus::CompensationFailed,
    }
}

/// The row that closes a saga's audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaClosing {
    Completed,
    Compensated,
    Failed,
    CompensationFailed,
}

impl SagaClosing {
    /// Picks the closing row after a failure.
    ///
    /// `ran_compensations` is true when at least one compensation was attempted.
    /// Only a rejection that unwound cleanly closes as compensated.
    pub fn after_failure(class: FailureClass, ran_compensations: bool, compensated: bool) -> Self {
        match (class, ran_compensations, compensated) {
            (FailureClass::Rejected, true, true) => SagaClosing::Compensated,
            (_, true, false) => SagaClosing::CompensationFailed,
            _ => SagaClosing::Failed,
        }
    }

    pub fn log_name(&self) -> &'static str {
        match self {
            SagaClosing::Completed => steps::SAGA_COMPLETED,
            SagaClosing::Compensated => steps::SAGA_COMPENSATED,
            SagaClosing::Failed => steps::SAGA_FAILED,
            SagaClosing::CompensationFailed => steps::SAGA_COMPENSATION_FAILED,
        }
    }

    pub fn status(&self) -> StepStatus {
        match self {
            SagaClosing::Completed | SagaClosing::Compensated => StepStatus::Completed,
            SagaClosing::Failed | SagaClosing::CompensationFailed => StepStatus::Failed,
        }
    }

    pub fn saga_state(&self) -> SagaState {
        match self {
            SagaClosing::Completed => SagaState::Completed,
            SagaClosing::Compensated => SagaState::Compensated,
            SagaClosing::Failed | SagaClosing::CompensationFailed => SagaState::Failed,
        }
    }
}
