//! Saga coordinator for the create-order saga.

use std::future::Future;
use std::time::Instant;

use chrono::Duration;
use common::{CorrelationId, IdempotencyKey, OrderId};
use domain::{
    Money, Order, OrderError, OrderStatus, ProductId, SagaLogEntry, StepStatus, UserId,
};
use serde_json::json;
use store::SagaStore;

use crate::audit_log::SagaAuditLog;
use crate::cancel::CancelSignal;
use crate::context::SagaContext;
use crate::error::{Result, SagaError};
use crate::finalize::{FinalizationPolicy, SentinelProductPolicy};
use crate::idempotency::{Admission, IdempotencyGuard};
use crate::outcome::{
    CreateOrderReply, OrderOutcome, OutcomeStatus, STATUS_CREATED, STATUS_GATEWAY_TIMEOUT,
    STATUS_INTERNAL_ERROR, STATUS_SERVICE_UNAVAILABLE, STATUS_UNPROCESSABLE,
};
use crate::request::CreateOrderRequest;
use crate::services::{
    CallFailure, InventoryService, PaymentService, RefundRequest, StepFailure, StepResult,
};
use crate::state::{
    Compensation, FailureClass, ForwardStep, SagaClosing, SagaState, compensation_plan,
    resolve_status,
};
use crate::steps::{self, CREATE_ORDER_PATH, SAGA_TYPE};

/// Orchestrates the create-order saga.
///
/// The coordinator persists the order, reserves stock, charges payment and
/// finalizes, logging every step boundary before acting on it. When a
/// participant rejects a step, completed steps are compensated in reverse
/// order, as they are when the caller cancels between steps or a storage
/// write fails. When a participant cannot be reached, or the caller cancels
/// while a call is in flight, nothing is compensated since the effect of the
/// call is unknown.
pub struct SagaCoordinator<S, I, P>
where
    S: SagaStore,
    I: InventoryService,
    P: PaymentService,
{
    store: S,
    audit: SagaAuditLog<S>,
    guard: IdempotencyGuard<S>,
    inventory: I,
    payment: P,
    finalization: Box<dyn FinalizationPolicy>,
}

impl<S, I, P> SagaCoordinator<S, I, P>
where
    S: SagaStore,
    I: InventoryService,
    P: PaymentService,
{
    /// Creates a coordinator with the default finalization policy and key TTL.
    pub fn new(store: S, inventory: I, payment: P) -> Self {
        Self {
            audit: SagaAuditLog::new(store.clone()),
            guard: IdempotencyGuard::new(store.clone()),
            store,
            inventory,
            payment,
            finalization: Box::new(SentinelProductPolicy),
        }
    }

    pub fn with_finalization_policy(mut self, policy: impl FinalizationPolicy + 'static) -> Self {
        self.finalization = Box::new(policy);
        self
    }

    pub fn with_idempotency_ttl(mut self, ttl: Duration) -> Self {
        self.guard = self.guard.with_ttl(ttl);
        self
    }

    /// Caps how long a duplicate request waits for the original to finish.
    pub fn with_duplicate_wait(mut self, wait: std::time::Duration) -> Self {
        self.guard = self.guard.with_duplicate_wait(wait);
        self
    }

    /// Runs the create-order saga.
    ///
    /// Never fails: storage errors, invalid input and participant outages all
    /// become an `ERROR` outcome. A repeated idempotency key replays the first
    /// response without running the saga again.
    #[tracing::instrument(
        skip(self, request, cancel),
        fields(
            saga_type = SAGA_TYPE,
            correlation_id = tracing::field::Empty,
            order_id = tracing::field::Empty
        )
    )]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        cancel: CancelSignal,
    ) -> CreateOrderReply {
        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(CorrelationId::generate);
        tracing::Span::current().record("correlation_id", tracing::field::display(&correlation_id));

        let order = match Self::build_order(&request) {
            Ok(order) => order,
            Err(message) => {
                tracing::info!(%message, "rejected invalid create-order request");
                return CreateOrderReply::invalid(message);
            }
        };

        let Some(key) = request.idempotency_key.clone() else {
            return self.run_saga(order, correlation_id, cancel).await;
        };

        let fingerprint = match request.fingerprint() {
            Ok(bytes) => bytes,
            Err(e) => return CreateOrderReply::internal(None, format!("Internal error: {e}")),
        };
        match self
            .guard
            .check_and_begin(&key, CREATE_ORDER_PATH, &fingerprint)
            .await
        {
            Ok(Admission::New) => {}
            Ok(Admission::Duplicate { status, body }) => return Self::replay(status, &body),
            Ok(Admission::InProgress) => return self.await_original(&key, &cancel).await,
            Err(e @ SagaError::IdempotencyConflict { .. }) => {
                return CreateOrderReply::conflict(e.to_string());
            }
            Err(e) => {
                tracing::error!(error = %e, "idempotency check failed");
                return CreateOrderReply::internal(None, format!("Internal error: {e}"));
            }
        }

        let reply = self.run_saga(order, correlation_id, cancel).await;

        match serde_json::to_string(&reply.outcome) {
            Ok(body) => {
                if let Err(e) = self.guard.complete_with(&key, reply.status_code, &body).await {
                    tracing::error!(error = %e, key = %key, "failed to store idempotent response");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to encode idempotent response"),
        }
        reply
    }

    /// Loads an order by id.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.store.get_order(order_id).await?)
    }

    /// Returns the audit trail of the saga for an order.
    pub async fn history(&self, order_id: OrderId) -> Result<Vec<SagaLogEntry>> {
        self.audit.history(order_id).await
    }

    /// Deletes expired idempotency records.
    pub async fn purge_expired_keys(&self) -> Result<u64> {
        self.guard.purge_expired().await
    }

    fn build_order(request: &CreateOrderRequest) -> std::result::Result<Order, String> {
        let amount = Money::new(request.amount).map_err(|e| e.to_string())?;
        Order::new(
            UserId::new(request.user_id.trim()),
            ProductId::new(request.product_id.trim()),
            amount,
            request.quantity,
        )
        .map_err(|e| e.to_string())
    }

    /// Replays the original response once it is stored; a duplicate that
    /// gives up waiting gets a conflict.
    async fn await_original(
        &self,
        key: &IdempotencyKey,
        cancel: &CancelSignal,
    ) -> CreateOrderReply {
        tracing::info!("original request still running, waiting for its response");
        match self.guard.await_response(key, cancel).await {
            Ok(Some((status, body))) => Self::replay(status, &body),
            Ok(None) => CreateOrderReply::conflict(
                "A request with this idempotency key is still being processed",
            ),
            Err(e) => {
                tracing::error!(error = %e, "waiting for the original response failed");
                CreateOrderReply::internal(None, format!("Internal error: {e}"))
            }
        }
    }

    fn replay(status: u16, body: &str) -> CreateOrderReply {
        match serde_json::from_str::<OrderOutcome>(body) {
            Ok(outcome) => {
                tracing::info!(status, "replaying stored response");
                CreateOrderReply {
                    outcome,
                    status_code: status,
                    replayed: true,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "stored idempotent response is unreadable");
                CreateOrderReply::internal(None, "Stored response could not be decoded")
            }
        }
    }

    async fn run_saga(
        &self,
        order: Order,
        correlation_id: CorrelationId,
        cancel: CancelSignal,
    ) -> CreateOrderReply {
        metrics::counter!("saga_executions_total").increment(1);
        let started = Instant::now();
        let order_id = order.id();
        tracing::Span::current().record("order_id", tracing::field::display(order_id));

        let reply = match self.store.insert_order(&order).await {
            Ok(()) => {
                let trail = self.audit.start_saga(order_id, SAGA_TYPE, correlation_id);
                let mut ctx = SagaContext::new(order, trail, cancel);
                self.execute(&mut ctx).await
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to persist order");
                CreateOrderReply::internal(None, format!("Internal error: {e}"))
            }
        };

        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
        if reply.is_success() {
            metrics::counter!("saga_completed").increment(1);
        } else {
            metrics::counter!("saga_failed").increment(1);
        }
        reply
    }

    /// Drives the forward steps and turns the first failure into a closed saga.
    ///
    /// Cancellation is checked before each participant step, so a step whose
    /// call was never sent is not logged and the steps before it are undone.
    async fn execute(&self, ctx: &mut SagaContext) -> CreateOrderReply {
        ctx.set_state(SagaState::Running);
        if let Err(e) = self.open(ctx).await {
            return self.fail(ctx, ForwardStep::ReserveInventory, internal(e)).await;
        }

        for step in ForwardStep::SEQUENCE {
            if step.is_remote() && ctx.cancel().is_cancelled() {
                return self.fail(ctx, step, StepFailure::Withdrawn).await;
            }
            let outcome = match self.run_step(ctx, step).await {
                Ok(result) => result.into_result(),
                Err(e) => Err(internal(e)),
            };
            if let Err(failure) = outcome {
                return self.fail(ctx, step, failure).await;
            }
        }

        if let Err(e) = self.close(ctx, SagaClosing::Completed, None).await {
            tracing::error!(error = %e, "order completed but the closing row was not written");
        }
        let outcome = OrderOutcome::new(OutcomeStatus::Success, "Order completed successfully")
            .for_order(ctx.order().id(), ctx.order().status());
        CreateOrderReply::new(outcome, STATUS_CREATED)
    }

    async fn open(&self, ctx: &SagaContext) -> Result<()> {
        let snapshot = serde_json::to_value(ctx.order())?;
        self.log(ctx, steps::ORDER_CREATED, StepStatus::Completed, Some(snapshot), None).await
    }

    async fn run_step(&self, ctx: &mut SagaContext, step: ForwardStep) -> Result<StepResult<()>> {
        match step {
            ForwardStep::ReserveInventory => self.reserve_inventory(ctx).await,
            ForwardStep::ChargePayment => self.charge_payment(ctx).await,
            ForwardStep::Finalize => self.finalize(ctx).await,
        }
    }

    #[tracing::instrument(skip_all, fields(step = "ReserveInventory"))]
    async fn reserve_inventory(&self, ctx: &mut SagaContext) -> Result<StepResult<()>> {
        let step = ForwardStep::ReserveInventory;
        let request = ctx.stock_request();
        let payload = serde_json::to_value(&request)?;
        self.log_forward(ctx, step, StepStatus::Pending, Some(payload), None).await?;

        let meta = ctx.call_metadata();
        let result = match ctx
            .cancel()
            .run(self.inventory.reserve_stock(&meta, &request))
            .await
        {
            None => StepResult::Cancelled,
            Some(Err(failure)) => StepResult::Unreachable(failure),
            Some(Ok(reply)) if reply.success => StepResult::Ok(reply.message),
            Some(Ok(reply)) => {
                StepResult::Rejected(or_default(reply.message, "stock reservation refused"))
            }
        };

        let message = match result {
            StepResult::Ok(message) => message,
            failed => return Ok(failed.map(|_| ())),
        };
        // Recorded before any write so a later storage error still releases it.
        ctx.mark_completed(step);
        self.log_forward(
            ctx,
            step,
            StepStatus::Completed,
            Some(json!({ "message": message })),
            None,
        )
        .await?;
        self.advance(ctx, step.success_status()).await?;
        Ok(StepResult::Ok(()))
    }

    #[tracing::instrument(skip_all, fields(step = "ChargePayment"))]
    async fn charge_payment(&self, ctx: &mut SagaContext) -> Result<StepResult<()>> {
        let step = ForwardStep::ChargePayment;
        let request = ctx.charge_request();
        let payload = serde_json::to_value(&request)?;
        self.log_forward(ctx, step, StepStatus::Pending, Some(payload), None).await?;

        let meta = ctx.call_metadata();
        let result = match ctx
            .cancel()
            .run(self.payment.process_payment(&meta, &request))
            .await
        {
            None => StepResult::Cancelled,
            Some(Err(failure)) => StepResult::Unreachable(failure),
            Some(Ok(reply)) if reply.success => match reply.payment_id {
                Some(payment_id) => StepResult::Ok(payment_id),
                None => StepResult::Unreachable(CallFailure::Malformed(
                    "payment accepted without a payment id".to_string(),
                )),
            },
            Some(Ok(reply)) => {
                StepResult::Rejected(or_default(reply.status_message, "payment declined"))
            }
        };

        let payment_id = match result {
            StepResult::Ok(payment_id) => payment_id,
            failed => return Ok(failed.map(|_| ())),
        };
        ctx.mark_completed(step);
        ctx.set_payment_id(payment_id.clone());
        self.log_forward(
            ctx,
            step,
            StepStatus::Completed,
            Some(json!({ "payment_id": payment_id })),
            None,
        )
        .await?;
        self.commit(ctx, |order| order.record_payment(payment_id)).await?;
        Ok(StepResult::Ok(()))
    }

    /// Local check; not interrupted by cancellation.
    #[tracing::instrument(skip_all, fields(step = "Finalize"))]
    async fn finalize(&self, ctx: &mut SagaContext) -> Result<StepResult<()>> {
        let step = ForwardStep::Finalize;
        if let Err(reason) = self.finalization.check(ctx.order()).await {
            return Ok(StepResult::Rejected(reason));
        }
        self.advance(ctx, step.success_status()).await?;
        ctx.mark_completed(step);
        // The order is completed from here on; a lost audit row must not undo it.
        self.record(self.log_forward(ctx, step, StepStatus::Completed, None, None)).await;
        Ok(StepResult::Ok(()))
    }

    /// Ends the saga after `step` failed.
    ///
    /// Every write here is best effort: compensations run even when the audit
    /// log or order store is failing, and a write that does not land turns the
    /// reply into an internal error.
    async fn fail(
        &self,
        ctx: &mut SagaContext,
        step: ForwardStep,
        failure: StepFailure,
    ) -> CreateOrderReply {
        let class = FailureClass::from(&failure);
        let error = failure.describe();
        let mut recorded = true;
        if matches!(failure, StepFailure::Internal(_)) {
            tracing::error!(?step, %error, "saga step hit an internal error");
        } else {
            tracing::warn!(?step, %error, "saga step failed");
        }
        // A withdrawn step never started and a completed one already has its
        // terminal row.
        if failure != StepFailure::Withdrawn && !ctx.completed().contains(&step) {
            let row = self.log_forward(ctx, step, StepStatus::Failed, None, Some(error.clone()));
            recorded &= self.record(row).await;
        }

        let plan = if failure.compensates() {
            compensation_plan(ctx.completed())
        } else {
            Vec::new()
        };
        let compensated = self.compensate(ctx, &plan, &error).await;

        let status = resolve_status(step, class, compensated);
        recorded &= self.record(self.advance(ctx, status)).await;

        let closing = SagaClosing::after_failure(class, !plan.is_empty(), compensated);
        let closing_error = (closing != SagaClosing::Compensated).then_some(error);
        recorded &= self.record(self.close(ctx, closing, closing_error)).await;

        let (outcome_status, status_code) = match (class, compensated) {
            (FailureClass::Rejected, true) => (OutcomeStatus::Failed, STATUS_UNPROCESSABLE),
            (FailureClass::Unreachable, _) => (OutcomeStatus::Error, STATUS_SERVICE_UNAVAILABLE),
            (FailureClass::Cancelled, _) | (FailureClass::Withdrawn, true) => {
                (OutcomeStatus::Error, STATUS_GATEWAY_TIMEOUT)
            }
            _ => (OutcomeStatus::Error, STATUS_INTERNAL_ERROR),
        };
        let mut message = failure_message(step, &failure, compensated);
        let (outcome_status, status_code) = if recorded {
            (outcome_status, status_code)
        } else {
            message.push_str(". The saga outcome could not be fully recorded");
            (OutcomeStatus::Error, STATUS_INTERNAL_ERROR)
        };
        let outcome =
            OrderOutcome::new(outcome_status, message).for_order(ctx.order().id(), status);
        CreateOrderReply::new(outcome, status_code)
    }

    /// Awaits a best-effort write, logging instead of propagating.
    async fn record(&self, write: impl Future<Output = Result<()>>) -> bool {
        match write.await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "failed to write saga record");
                false
            }
        }
    }

    /// Runs every compensation in `plan`, continuing past failures.
    ///
    /// Returns true when all of them succeeded. Audit writes are best effort
    /// so a failing store never stops a compensating call.
    async fn compensate(
        &self,
        ctx: &mut SagaContext,
        plan: &[Compensation],
        reason: &str,
    ) -> bool {
        if plan.is_empty() {
            return true;
        }
        ctx.set_state(SagaState::Compensating);
        let meta = ctx.call_metadata();
        let mut all_succeeded = true;

        for &compensation in plan {
            metrics::counter!("saga_compensations_total").increment(1);
            let outcome = match compensation {
                Compensation::ReleaseStock => {
                    let request = ctx.stock_request();
                    let payload = serde_json::to_value(&request).ok();
                    self.record(self.log_compensation(
                        ctx,
                        compensation,
                        StepStatus::Pending,
                        payload,
                        None,
                    ))
                    .await;
                    match self.inventory.release_stock(&meta, &request).await {
                        Ok(reply) if reply.success => Ok(reply.message),
                        Ok(reply) => Err(or_default(reply.message, "stock release refused")),
                        Err(failure) => Err(failure.to_string()),
                    }
                }
                Compensation::RefundPayment => {
                    let request = ctx.payment_id().map(|payment_id| RefundRequest {
                        payment_id: payment_id.to_string(),
                        reason: reason.to_string(),
                    });
                    let payload = request.as_ref().and_then(|r| serde_json::to_value(r).ok());
                    self.record(self.log_compensation(
                        ctx,
                        compensation,
                        StepStatus::Pending,
                        payload,
                        None,
                    ))
                    .await;
                    match request {
                        None => Err("no payment id recorded".to_string()),
                        Some(request) => match self.payment.refund_payment(&meta, &request).await {
                            Ok(reply) if reply.success => Ok(reply.status_message),
                            Ok(reply) => Err(or_default(reply.status_message, "refund refused")),
                            Err(failure) => Err(failure.to_string()),
                        },
                    }
                }
            };

            match outcome {
                Ok(message) => {
                    self.record(self.log_compensation(
                        ctx,
                        compensation,
                        StepStatus::Completed,
                        Some(json!({ "message": message })),
                        None,
                    ))
                    .await;
                }
                Err(error) => {
                    all_succeeded = false;
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    tracing::error!(
                        order_id = %ctx.order().id(),
                        ?compensation,
                        %error,
                        "compensation failed; manual intervention required"
                    );
                    self.record(self.log_compensation(
                        ctx,
                        compensation,
                        StepStatus::Failed,
                        None,
                        Some(error),
                    ))
                    .await;
                }
            }
        }
        all_succeeded
    }

    async fn close(
        &self,
        ctx: &mut SagaContext,
        closing: SagaClosing,
        error: Option<String>,
    ) -> Result<()> {
        ctx.set_state(closing.saga_state());
        self.log(ctx, closing.log_name(), closing.status(), None, error).await?;
        tracing::info!(
            order_id = %ctx.order().id(),
            order_status = %ctx.order().status(),
            saga_state = %ctx.state(),
            "saga finished"
        );
        Ok(())
    }

    async fn advance(&self, ctx: &mut SagaContext, status: OrderStatus) -> Result<()> {
        self.commit(ctx, |order| order.transition_to(status)).await
    }

    /// Applies `change` to a copy of the order and keeps it only once stored.
    async fn commit(
        &self,
        ctx: &mut SagaContext,
        change: impl FnOnce(&mut Order) -> std::result::Result<(), OrderError>,
    ) -> Result<()> {
        let mut order = ctx.order().clone();
        change(&mut order)?;
        self.store.update_order(&order).await?;
        ctx.replace_order(order);
        Ok(())
    }

    async fn log_forward(
        &self,
        ctx: &SagaContext,
        step: ForwardStep,
        status: StepStatus,
        payload: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<()> {
        match step.log_name(status) {
            Some(name) => self.log(ctx, name, status, payload, error).await,
            None => Ok(()),
        }
    }

    async fn log_compensation(
        &self,
        ctx: &SagaContext,
        compensation: Compensation,
        status: StepStatus,
        payload: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<()> {
        self.log(ctx, compensation.log_name(status), status, payload, error).await
    }

    async fn log(
        &self,
        ctx: &SagaContext,
        step: &str,
        status: StepStatus,
        payload: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<()> {
        self.audit.log_step(ctx.trail(), step, status, payload, error).await?;
        Ok(())
    }
}

fn internal(error: SagaError) -> StepFailure {
    StepFailure::Internal(error.to_string())
}

fn or_default(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

fn failure_message(step: ForwardStep, failure: &StepFailure, compensated: bool) -> String {
    match (step, failure) {
        (_, StepFailure::Cancelled) => format!(
            "Request cancelled during {}; order needs reconciliation",
            step.describe()
        ),
        (_, StepFailure::Withdrawn) if compensated => format!(
            "Request cancelled before {}; completed steps were undone",
            step.describe()
        ),
        (_, StepFailure::Withdrawn) => format!(
            "Request cancelled before {}; compensation incomplete, manual intervention required",
            step.describe()
        ),
        (_, StepFailure::Internal(_)) if compensated => format!(
            "Internal error during {}; completed steps were undone",
            step.describe()
        ),
        (_, StepFailure::Internal(_)) => format!(
            "Internal error during {}; compensation incomplete, manual intervention required",
            step.describe()
        ),
        (_, StepFailure::Unreachable(failure)) if failure.is_overload() => {
            "System overloaded, please retry later".to_string()
        }
        (_, StepFailure::Unreachable(failure)) => {
            format!("Could not complete {}: {failure}", step.describe())
        }
        (ForwardStep::ReserveInventory, StepFailure::Rejected(reason)) => {
            format!("Inventory reservation failed: {reason}")
        }
        (ForwardStep::ChargePayment, StepFailure::Rejected(reason)) if compensated => {
            format!("Payment failed: {reason}. Reserved stock was released")
        }
        (ForwardStep::ChargePayment, StepFailure::Rejected(reason)) => format!(
            "Payment failed: {reason}. Stock release failed; manual intervention required"
        ),
        (ForwardStep::Finalize, StepFailure::Rejected(reason)) if compensated => format!(
            "Order finalization failed: {reason}. Payment refunded and stock released"
        ),
        (ForwardStep::Finalize, StepFailure::Rejected(reason)) => format!(
            "Order finalization failed: {reason}. Compensation incomplete; manual intervention required"
        ),
    }
}
