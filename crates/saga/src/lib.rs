//! Orchestrated create-order saga.
//!
//! The saga coordinator drives the order through these steps:
//! 1. Reserve inventory
//! 2. Charge payment
//! 3. Finalize the order
//!
//! Every step boundary is written to an append-only audit log. When a
//! participant rejects a step, completed steps are compensated in reverse
//! order. Requests carrying an idempotency key run at most once; repeats
//! replay the first response.

pub mod audit_log;
pub mod cancel;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod finalize;
pub mod idempotency;
pub mod outcome;
pub mod request;
pub mod services;
pub mod state;
pub mod steps;

pub use audit_log::{SagaAuditLog, SagaTrail};
pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use coordinator::SagaCoordinator;
pub use error::SagaError;
pub use finalize::{FAILING_PRODUCT_ID, FinalizationPolicy, SentinelProductPolicy};
pub use idempotency::{Admission, DEFAULT_DUPLICATE_WAIT, IdempotencyGuard, request_hash};
pub use outcome::{CreateOrderReply, OrderOutcome, OutcomeStatus};
pub use request::CreateOrderRequest;
pub use services::{
    CORRELATION_ID_HEADER, CallFailure, CallMetadata, ChargeRequest, HttpInventoryClient,
    HttpPaymentClient, InMemoryInventoryService, InMemoryPaymentService, InventoryCall,
    InventoryCallKind, InventoryService, PaymentCall, PaymentReply, PaymentService,
    RefundRequest, StepFailure, StepResult, StockReply, StockRequest,
};
pub use state::{
    Compensation, FailureClass, ForwardStep, SagaClosing, SagaState, compensation_plan,
    resolve_status,
};
