//! Payment participant contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::{CorrelationId, OrderId};
use domain::{Money, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CallFailure, CallMetadata};

/// Default per-charge limit of the in-memory payment participant.
pub const DEFAULT_PAYMENT_LIMIT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 2);

/// Charge request for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub order_id: OrderId,
    pub amount: Money,
    pub user_id: UserId,
}

/// Refund of a previously charged payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub payment_id: String,
    pub reason: String,
}

/// The payment participant's business answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReply {
    #[serde(default)]
    pub payment_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub status_message: String,
}

impl PaymentReply {
    pub fn accepted(payment_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            payment_id: Some(payment_id.into()),
            success: true,
            status_message: message.into(),
        }
    }

    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            payment_id: None,
            success: false,
            status_message: message.into(),
        }
    }
}

/// Trait for the payment participant.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Charges the user for the order.
    async fn process_payment(
        &self,
        meta: &CallMetadata,
        request: &ChargeRequest,
    ) -> Result<PaymentReply, CallFailure>;

    /// Refunds a charge. Refunding twice is a no-op.
    async fn refund_payment(
        &self,
        meta: &CallMetadata,
        request: &RefundRequest,
    ) -> Result<PaymentReply, CallFailure>;
}

#[async_trait]
impl<T: PaymentService + ?Sized> PaymentService for Arc<T> {
    async fn process_payment(
        &self,
        meta: &CallMetadata,
        request: &ChargeRequest,
    ) -> Result<PaymentReply, CallFailure> {
        (**self).process_payment(meta, request).await
    }

    async fn refund_payment(
        &self,
        meta: &CallMetadata,
        request: &RefundRequest,
    ) -> Result<PaymentReply, CallFailure> {
        (**self).refund_payment(meta, request).await
    }
}

/// A call observed by [`InMemoryPaymentService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentCall {
    Charge {
        request: ChargeRequest,
        correlation_id: CorrelationId,
    },
    Refund {
        request: RefundRequest,
        correlation_id: CorrelationId,
    },
}

impl PaymentCall {
    pub fn correlation_id(&self) -> &CorrelationId {
        match self {
            PaymentCall::Charge { correlation_id, .. }
            | PaymentCall::Refund { correlation_id, .. } => correlation_id,
        }
    }

    pub fn is_refund(&self) -> bool {
        matches!(self, PaymentCall::Refund { .. })
    }
}

#[derive(Debug)]
struct ChargeRecord {
    order_id: OrderId,
    refunded: bool,
}

#[derive(Debug)]
struct InMemoryPaymentState {
    limit: Decimal,
    payments: HashMap<String, ChargeRecord>,
    next_id: u32,
    calls: Vec<PaymentCall>,
    decline_reason: Option<String>,
    charge_failure: Option<CallFailure>,
    refund_failure: Option<CallFailure>,
    reject_refund: bool,
}

impl Default for InMemoryPaymentState {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAYMENT_LIMIT,
            payments: HashMap::new(),
            next_id: 0,
            calls: Vec::new(),
            decline_reason: None,
            charge_failure: None,
            refund_failure: None,
            reject_refund: false,
        }
    }
}

/// In-memory payment participant for tests and local runs.
///
/// Charges above the configured limit are declined.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<Mutex<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service with the default limit.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryPaymentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the maximum amount a single charge may have.
    pub fn set_limit(&self, limit: Decimal) {
        self.state().limit = limit;
    }

    /// Declines every charge with `reason` until cleared.
    pub fn set_decline_reason(&self, reason: Option<String>) {
        self.state().decline_reason = reason;
    }

    /// Makes every charge call fail with `failure` until cleared.
    pub fn set_charge_failure(&self, failure: Option<CallFailure>) {
        self.state().charge_failure = failure;
    }

    /// Makes every refund call fail with `failure` until cleared.
    pub fn set_refund_failure(&self, failure: Option<CallFailure>) {
        self.state().refund_failure = failure;
    }

    /// Makes refund calls answer with a business rejection.
    pub fn set_reject_refund(&self, reject: bool) {
        self.state().reject_refund = reject;
    }

    /// Returns the number of charges that have not been refunded.
    pub fn active_payment_count(&self) -> usize {
        self.state()
            .payments
            .values()
            .filter(|p| !p.refunded)
            .count()
    }

    /// Returns true if the payment exists and was refunded.
    pub fn is_refunded(&self, payment_id: &str) -> bool {
        self.state()
            .payments
            .get(payment_id)
            .is_some_and(|p| p.refunded)
    }

    /// Returns the payment id charged for an order, if any.
    pub fn payment_for_order(&self, order_id: OrderId) -> Option<String> {
        self.state()
            .payments
            .iter()
            .find(|(_, p)| p.order_id == order_id)
            .map(|(id, _)| id.clone())
    }

    /// Returns every call that reached the participant, oldest first.
    pub fn calls(&self) -> Vec<PaymentCall> {
        self.state().calls.clone()
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn process_payment(
        &self,
        meta: &CallMetadata,
        request: &ChargeRequest,
    ) -> Result<PaymentReply, CallFailure> {
        let mut state = self.state();
        if state.charge_failure == Some(CallFailure::CircuitOpen) {
            return Err(CallFailure::CircuitOpen);
        }
        state.calls.push(PaymentCall::Charge {
            request: request.clone(),
            correlation_id: meta.correlation_id.clone(),
        });
        if let Some(failure) = state.charge_failure.clone() {
            return Err(failure);
        }

        if let Some(reason) = state.decline_reason.clone() {
            return Ok(PaymentReply::declined(reason));
        }
        if request.amount.amount() > state.limit {
            return Ok(PaymentReply::declined(format!(
                "Amount {} exceeds limit {:.2}",
                request.amount, state.limit
            )));
        }

        state.next_id += 1;
        let payment_id = format!("PAY-{:04}", state.next_id);
        state.payments.insert(
            payment_id.clone(),
            ChargeRecord {
                order_id: request.order_id,
                refunded: false,
            },
        );
        Ok(PaymentReply::accepted(
            payment_id,
            format!("Charged {}", request.amount),
        ))
    }

    async fn refund_payment(
        &self,
        meta: &CallMetadata,
        request: &RefundRequest,
    ) -> Result<PaymentReply, CallFailure> {
        let mut state = self.state();
        if state.refund_failure == Some(CallFailure::CircuitOpen) {
            return Err(CallFailure::CircuitOpen);
        }
        state.calls.push(PaymentCall::Refund {
            request: request.clone(),
            correlation_id: meta.correlation_id.clone(),
        });
        if let Some(failure) = state.refund_failure.clone() {
            return Err(failure);
        }
        if state.reject_refund {
            return Ok(PaymentReply::declined("Refund refused"));
        }

        match state.payments.get_mut(&request.payment_id) {
            Some(record) => {
                record.refunded = true;
                Ok(PaymentReply::accepted(request.payment_id.clone(), "Refunded"))
            }
            None => Ok(PaymentReply::declined(format!(
                "Unknown payment {}",
                request.payment_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> CallMetadata {
        CallMetadata::new(CorrelationId::new("corr-1"))
    }

    fn charge(cents: i64) -> ChargeRequest {
        ChargeRequest {
            order_id: OrderId::new(),
            amount: Money::from_cents(cents).unwrap(),
            user_id: UserId::new("user-1"),
        }
    }

    #[tokio::test]
    async fn test_charge_and_refund() {
        let service = InMemoryPaymentService::new();

        let reply = service.process_payment(&meta(), &charge(5000)).await.unwrap();
        assert!(reply.success);
        let payment_id = reply.payment_id.unwrap();
        assert!(payment_id.starts_with("PAY-"));
        assert_eq!(service.active_payment_count(), 1);

        let refund = RefundRequest {
            payment_id: payment_id.clone(),
            reason: "test".to_string(),
        };
        let reply = service.refund_payment(&meta(), &refund).await.unwrap();
        assert!(reply.success);
        assert!(service.is_refunded(&payment_id));
        assert_eq!(service.active_payment_count(), 0);

        let again = service.refund_payment(&meta(), &refund).await.unwrap();
        assert!(again.success);
    }

    #[tokio::test]
    async fn test_charge_over_limit_is_declined() {
        let service = InMemoryPaymentService::new();
        let reply = service
            .process_payment(&meta(), &charge(1_000_001))
            .await
            .unwrap();
        assert!(!reply.success);
        assert!(reply.payment_id.is_none());
        assert!(reply.status_message.contains("exceeds limit"));
    }

    #[tokio::test]
    async fn test_decline_reason() {
        let service = InMemoryPaymentService::new();
        service.set_decline_reason(Some("card declined".to_string()));
        let reply = service.process_payment(&meta(), &charge(100)).await.unwrap();
        assert!(!reply.success);
        assert_eq!(reply.status_message, "card declined");
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_refund_unknown_payment_is_declined() {
        let service = InMemoryPaymentService::new();
        let refund = RefundRequest {
            payment_id: "PAY-9999".to_string(),
            reason: "test".to_string(),
        };
        let reply = service.refund_payment(&meta(), &refund).await.unwrap();
        assert!(!reply.success);
    }

    #[tokio::test]
    async fn test_circuit_open_is_not_journaled() {
        let service = InMemoryPaymentService::new();
        service.set_charge_failure(Some(CallFailure::CircuitOpen));
        let result = service.process_payment(&meta(), &charge(100)).await;
        assert_eq!(result, Err(CallFailure::CircuitOpen));
        assert!(service.calls().is_empty());
    }

    #[test]
    fn test_default_limit() {
        assert_eq!(DEFAULT_PAYMENT_LIMIT, Decimal::new(1_000_000, 2));
    }
}
