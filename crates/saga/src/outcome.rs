//! Saga results as returned to callers.

use common::OrderId;
use domain::OrderStatus;
use serde::{Deserialize, Serialize};

pub const STATUS_CREATED: u16 = 201;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_UNPROCESSABLE: u16 = 422;
pub const STATUS_INTERNAL_ERROR: u16 = 500;
pub const STATUS_SERVICE_UNAVAILABLE: u16 = 503;
pub const STATUS_GATEWAY_TIMEOUT: u16 = 504;

/// Coarse result class of a create-order request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    /// Order completed.
    Success,
    /// A participant said no and the saga unwound cleanly.
    Failed,
    /// Anything else: bad input, unreachable participant, failed compensation.
    Error,
}

/// Result body returned to the caller and cached for idempotent replays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_status: Option<OrderStatus>,
    pub status: OutcomeStatus,
    pub message: String,
}

impl OrderOutcome {
    pub fn new(status: OutcomeStatus, message: impl Into<String>) -> Self {
        Self {
            order_id: None,
            order_status: None,
            status,
            message: message.into(),
        }
    }

    pub fn for_order(mut self, order_id: OrderId, order_status: OrderStatus) -> Self {
        self.order_id = Some(order_id);
        self.order_status = Some(order_status);
        self
    }
}

/// What [`SagaCoordinator::create_order`](crate::SagaCoordinator::create_order) returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderReply {
    pub outcome: OrderOutcome,
    /// HTTP status an API layer should answer with.
    pub status_code: u16,
    /// True when the reply is a cached response for a repeated idempotency key.
    pub replayed: bool,
}

impl CreateOrderReply {
    pub fn new(outcome: OrderOutcome, status_code: u16) -> Self {
        Self {
            outcome,
            status_code,
            replayed: false,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(
            OrderOutcome::new(OutcomeStatus::Error, message),
            STATUS_BAD_REQUEST,
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(
            OrderOutcome::new(OutcomeStatus::Error, message),
            STATUS_CONFLICT,
        )
    }

    pub fn internal(order_id: Option<OrderId>, message: impl Into<String>) -> Self {
        let mut outcome = OrderOutcome::new(OutcomeStatus::Error, message);
        outcome.order_id = order_id;
        Self::new(outcome, STATUS_INTERNAL_ERROR)
    }

    pub fn is_success(&self) -> bool {
        self.outcome.status == OutcomeStatus::Success
    }
}
