//! Input of the create-order saga.

use common::{CorrelationId, IdempotencyKey};
use rust_decimal::Decimal;
use serde::Serialize;

/// A request to create an order.
///
/// Field values are validated by the coordinator, not on construction, so
/// an invalid request still produces a proper `ERROR` outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub product_id: String,
    pub amount: Decimal,
    pub quantity: u32,
    pub correlation_id: Option<CorrelationId>,
    pub idempotency_key: Option<IdempotencyKey>,
}

#[derive(Serialize)]
struct Fingerprint<'a> {
    user_id: &'a str,
    product_id: &'a str,
    amount: String,
    quantity: u32,
}

impl CreateOrderRequest {
    /// Creates a request for one unit.
    pub fn new(user_id: impl Into<String>, product_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            user_id: user_id.into(),
            product_id: product_id.into(),
            amount,
            quantity: 1,
            correlation_id: None,
            idempotency_key: None,
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    /// Canonical bytes hashed to bind an idempotency key to this request.
    ///
    /// `50`, `50.0` and `50.00` are the same amount, and a zero quantity is
    /// the same as one.
    pub fn fingerprint(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&Fingerprint {
            user_id: &self.user_id,
            product_id: &self.product_id,
            amount: self.amount.normalize().to_string(),
            quantity: self.quantity.max(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_amount_scale_and_metadata() {
        let a = CreateOrderRequest::new("u", "p", Decimal::new(5000, 2));
        let b = CreateOrderRequest::new("u", "p", Decimal::from(50))
            .with_correlation_id(CorrelationId::new("other"))
            .with_quantity(0);
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_differs_on_fields() {
        let a = CreateOrderRequest::new("u", "p", Decimal::from(50));
        let b = CreateOrderRequest::new("u", "p", Decimal::from(51));
        let c = a.clone().with_quantity(2);
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }
}
