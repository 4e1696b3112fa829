//! Local finalization check run after payment.

use async_trait::async_trait;
use domain::Order;

/// Product id that always fails finalization, used to exercise full compensation.
pub const FAILING_PRODUCT_ID: &str = "fail-me";

/// Decides whether a paid order may be completed.
#[async_trait]
pub trait FinalizationPolicy: Send + Sync {
    /// Returns `Err(reason)` to reject the order.
    async fn check(&self, order: &Order) -> Result<(), String>;
}

/// Rejects orders for [`FAILING_PRODUCT_ID`] and accepts everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentinelProductPolicy;

#[async_trait]
impl FinalizationPolicy for SentinelProductPolicy {
    async fn check(&self, order: &Order) -> Result<(), String> {
        if order.product_id().as_str() == FAILING_PRODUCT_ID {
            return Err(format!(
                "Finalization rejected for product {FAILING_PRODUCT_ID}"
            ));
        }
        Ok(())
    }
}
