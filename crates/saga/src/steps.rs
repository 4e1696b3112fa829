//! Create-order saga constants.

/// The saga type identifier recorded on every audit row.
pub const SAGA_TYPE: &str = "CreateOrder";

/// Logical operation path idempotency keys are bound to.
pub const CREATE_ORDER_PATH: &str = "/orders";

pub const ORDER_CREATED: &str = "OrderCreated";

pub const INVENTORY_RESERVATION_REQUESTED: &str = "InventoryReservationRequested";
pub const INVENTORY_RESERVATION_COMPLETED: &str = "InventoryReservationCompleted";
pub const INVENTORY_RESERVATION_FAILED: &str = "InventoryReservationFailed";

pub const PAYMENT_REQUESTED: &str = "PaymentRequested";
pub const PAYMENT_COMPLETED: &str = "PaymentCompleted";
pub const PAYMENT_FAILED: &str = "PaymentFailed";

pub const ORDER_COMPLETED: &str = "OrderCompleted";
pub const ORDER_FINALIZATION_FAILED: &str = "OrderFinalizationFailed";

pub const STOCK_RELEASE_REQUESTED: &str = "StockReleaseRequested";
pub const STOCK_RELEASE_COMPLETED: &str = "StockReleaseCompleted";
pub const STOCK_RELEASE_FAILED: &str = "StockReleaseFailed";

pub const PAYMENT_REFUND_REQUESTED: &str = "PaymentRefundRequested";
pub const PAYMENT_REFUND_COMPLETED: &str = "PaymentRefundCompleted";
pub const PAYMENT_REFUND_FAILED: &str = "PaymentRefundFailed";

pub const SAGA_COMPLETED: &str = "SagaCompleted";
pub const SAGA_COMPENSATED: &str = "SagaCompensated";
pub const SAGA_FAILED: &str = "SagaFailed";
pub const SAGA_COMPENSATION_FAILED: &str = "SagaCompensationFailed";
