//! Per-run saga state passed to every step.

use domain::Order;

use crate::audit_log::SagaTrail;
use crate::cancel::CancelSignal;
use crate::services::{CallMetadata, ChargeRequest, StockRequest};
use crate::state::{ForwardStep, SagaState};

/// Everything one saga run knows about itself.
#[derive(Debug)]
pub struct SagaContext {
    order: Order,
    trail: SagaTrail,
    cancel: CancelSignal,
    state: SagaState,
    completed: Vec<ForwardStep>,
    payment_id: Option<String>,
}

impl SagaContext {
    pub fn new(order: Order, trail: SagaTrail, cancel: CancelSignal) -> Self {
        Self {
            order,
            trail,
            cancel,
            state: SagaState::NotStarted,
            completed: Vec::new(),
            payment_id: None,
        }
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    /// Replaces the held order once its new version has been stored.
    pub fn replace_order(&mut self, order: Order) {
        self.order = order;
    }

    pub fn trail(&self) -> &SagaTrail {
        &self.trail
    }

    pub fn cancel(&self) -> &CancelSignal {
        &self.cancel
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn set_state(&mut self, state: SagaState) {
        self.state = state;
    }

    /// Forward steps that succeeded, in execution order.
    pub fn completed(&self) -> &[ForwardStep] {
        &self.completed
    }

    pub fn mark_completed(&mut self, step: ForwardStep) {
        self.completed.push(step);
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.payment_id.as_deref()
    }

    pub fn set_payment_id(&mut self, payment_id: impl Into<String>) {
        self.payment_id = Some(payment_id.into());
    }

    pub fn call_metadata(&self) -> CallMetadata {
        CallMetadata::new(self.trail.correlation_id.clone())
    }

    pub fn stock_request(&self) -> StockRequest {
        StockRequest {
            order_id: self.order.id(),
            product_id: self.order.product_id().clone(),
            quantity: self.order.quantity(),
        }
    }

    pub fn charge_request(&self) -> ChargeRequest {
        ChargeRequest {
            order_id: self.order.id(),
            amount: self.order.amount(),
            user_id: self.order.user_id().clone(),
        }
    }
}
