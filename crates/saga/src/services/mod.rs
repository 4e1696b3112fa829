//! Participant client contracts and their in-memory and HTTP implementations.
//!
//! Every call carries [`CallMetadata`] so the correlation id of the inbound
//! request reaches each participant. A call either returns the participant's
//! business answer or a [`CallFailure`] when the participant could not be
//! reached, in which case the effect of the call is unknown.

pub mod http;
pub mod inventory;
pub mod payment;

use common::CorrelationId;
use thiserror::Error;

pub use http::{HttpInventoryClient, HttpPaymentClient};
pub use inventory::{
    InMemoryInventoryService, InventoryCall, InventoryCallKind, InventoryService, StockReply,
    StockRequest,
};
pub use payment::{
    ChargeRequest, InMemoryPaymentService, PaymentCall, PaymentReply, PaymentService,
    RefundRequest,
};

/// Header used to propagate the correlation id to participants.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Request-scoped metadata attached to every outbound participant call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMetadata {
    pub correlation_id: CorrelationId,
}

impl CallMetadata {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self { correlation_id }
    }
}

/// A participant call that did not produce a business answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallFailure {
    /// Connection refused, reset, or a non-success HTTP status.
    #[error("transport error: {0}")]
    Transport(String),

    /// No answer within the configured deadline.
    #[error("call timed out")]
    Timeout,

    /// The participant answered with something that could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The participant's resilience layer refused the call.
    #[error("circuit open")]
    CircuitOpen,
}

impl CallFailure {
    /// True when the participant signalled overload rather than failing.
    pub fn is_overload(&self) -> bool {
        matches!(self, CallFailure::CircuitOpen)
    }
}

/// The three-way answer of a saga step.
///
/// `Rejected` is an explicit business "no" and is safe to compensate.
/// `Unreachable` means the effect is unknown, so nothing is compensated.
/// `Cancelled` means the caller went away before the call returned, which
/// also leaves the effect unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult<T> {
    Ok(T),
    Rejected(String),
    Unreachable(CallFailure),
    Cancelled,
}

impl<T> StepResult<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StepResult<U> {
        match self {
            StepResult::Ok(value) => StepResult::Ok(f(value)),
            StepResult::Rejected(reason) => StepResult::Rejected(reason),
            StepResult::Unreachable(failure) => StepResult::Unreachable(failure),
            StepResult::Cancelled => StepResult::Cancelled,
        }
    }

    /// Splits the result into the success value or the failure that ends the forward path.
    pub fn into_result(self) -> Result<T, StepFailure> {
        match self {
            StepResult::Ok(value) => Ok(value),
            StepResult::Rejected(reason) => Err(StepFailure::Rejected(reason)),
            StepResult::Unreachable(failure) => Err(StepFailure::Unreachable(failure)),
            StepResult::Cancelled => Err(StepFailure::Cancelled),
        }
    }
}

/// Why a forward step did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    Rejected(String),
    Unreachable(CallFailure),
    /// The caller went away while the participant call was in flight.
    Cancelled,
    /// The caller went away before the step's call was sent.
    Withdrawn,
    /// A storage or state error on the coordinator's side.
    Internal(String),
}

impl StepFailure {
    /// True when the effect of every completed step is known, so they can be
    /// undone. An unreachable or interrupted call leaves its effect unknown.
    pub fn compensates(&self) -> bool {
        matches!(
            self,
            StepFailure::Rejected(_) | StepFailure::Withdrawn | StepFailure::Internal(_)
        )
    }

    /// Text recorded in the `error` column of the failed step.
    pub fn describe(&self) -> String {
        match self {
            StepFailure::Rejected(reason) => reason.clone(),
            StepFailure::Unreachable(failure) => failure.to_string(),
            StepFailure::Cancelled => "cancelled by caller".to_string(),
            StepFailure::Withdrawn => "cancelled by caller before the step started".to_string(),
            StepFailure::Internal(error) => format!("internal error: {error}"),
        }
    }
}
