//! Inventory participant contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::{CorrelationId, OrderId};
use domain::ProductId;
use serde::{Deserialize, Serialize};

use super::{CallFailure, CallMetadata};

/// Stock reservation or release for one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRequest {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// The inventory participant's business answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReply {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

impl StockReply {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Trait for the inventory participant.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Holds `quantity` units of the product for the order.
    async fn reserve_stock(
        &self,
        meta: &CallMetadata,
        request: &StockRequest,
    ) -> Result<StockReply, CallFailure>;

    /// Returns previously reserved units. Releasing twice is a no-op.
    async fn release_stock(
        &self,
        meta: &CallMetadata,
        request: &StockRequest,
    ) -> Result<StockReply, CallFailure>;
}

#[async_trait]
impl<T: InventoryService + ?Sized> InventoryService for Arc<T> {
    async fn reserve_stock(
        &self,
        meta: &CallMetadata,
        request: &StockRequest,
    ) -> Result<StockReply, CallFailure> {
        (**self).reserve_stock(meta, request).await
    }

    async fn release_stock(
        &self,
        meta: &CallMetadata,
        request: &StockRequest,
    ) -> Result<StockReply, CallFailure> {
        (**self).release_stock(meta, request).await
    }
}

/// Which inventory operation a journaled call invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryCallKind {
    Reserve,
    Release,
}

/// A call observed by [`InMemoryInventoryService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryCall {
    pub kind: InventoryCallKind,
    pub request: StockRequest,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    stock: HashMap<ProductId, u32>,
    default_stock: u32,
    reservations: HashMap<OrderId, (ProductId, u32)>,
    calls: Vec<InventoryCall>,
    reserve_failure: Option<CallFailure>,
    release_failure: Option<CallFailure>,
    reject_release: bool,
}

impl InMemoryInventoryState {
    fn available(&self, product_id: &ProductId) -> u32 {
        self.stock
            .get(product_id)
            .copied()
            .unwrap_or(self.default_stock)
    }

    /// Journals a call unless the simulated circuit refused it outright.
    fn observe(
        &mut self,
        kind: InventoryCallKind,
        meta: &CallMetadata,
        request: &StockRequest,
        failure: Option<CallFailure>,
    ) -> Result<(), CallFailure> {
        if failure != Some(CallFailure::CircuitOpen) {
            self.calls.push(InventoryCall {
                kind,
                request: request.clone(),
                correlation_id: meta.correlation_id.clone(),
            });
        }
        failure.map_or(Ok(()), Err)
    }
}

/// In-memory inventory participant for tests and local runs.
///
/// Products without an explicit stock level start with the default stock
/// (zero unless configured with [`InMemoryInventoryService::with_default_stock`]).
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    state: Arc<Mutex<InMemoryInventoryState>>,
}

impl InMemoryInventoryService {
    /// Creates a new in-memory inventory service with no stock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service where every product starts with `units` in stock.
    pub fn with_default_stock(units: u32) -> Self {
        let service = Self::new();
        service.state().default_stock = units;
        service
    }

    fn state(&self) -> MutexGuard<'_, InMemoryInventoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the stock level of a product.
    pub fn set_stock(&self, product_id: impl Into<String>, units: u32) {
        self.state().stock.insert(ProductId::new(product_id), units);
    }

    /// Returns the units currently available for a product.
    pub fn stock_level(&self, product_id: &str) -> u32 {
        self.state().available(&ProductId::new(product_id))
    }

    /// Makes every reserve call fail with `failure` until cleared.
    pub fn set_reserve_failure(&self, failure: Option<CallFailure>) {
        self.state().reserve_failure = failure;
    }

    /// Makes every release call fail with `failure` until cleared.
    pub fn set_release_failure(&self, failure: Option<CallFailure>) {
        self.state().release_failure = failure;
    }

    /// Makes release calls answer with a business rejection.
    pub fn set_reject_release(&self, reject: bool) {
        self.state().reject_release = reject;
    }

    /// Returns the number of active reservations.
    pub fn reservation_count(&self) -> usize {
        self.state().reservations.len()
    }

    /// Returns true if stock is held for the order.
    pub fn has_reservation(&self, order_id: OrderId) -> bool {
        self.state().reservations.contains_key(&order_id)
    }

    /// Returns every call that reached the participant, oldest first.
    pub fn calls(&self) -> Vec<InventoryCall> {
        self.state().calls.clone()
    }

    /// Returns the journaled calls of one kind.
    pub fn calls_of(&self, kind: InventoryCallKind) -> Vec<InventoryCall> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn reserve_stock(
        &self,
        meta: &CallMetadata,
        request: &StockRequest,
    ) -> Result<StockReply, CallFailure> {
        let mut state = self.state();
        let failure = state.reserve_failure.clone();
        state.observe(InventoryCallKind::Reserve, meta, request, failure)?;

        if request.quantity == 0 {
            return Ok(StockReply::rejected("Quantity must be at least 1"));
        }
        if state.reservations.contains_key(&request.order_id) {
            return Ok(StockReply::accepted("Stock already reserved for order"));
        }

        let available = state.available(&request.product_id);
        if available < request.quantity {
            return Ok(StockReply::rejected(format!(
                "Insufficient stock for {}: requested {}, available {}",
                request.product_id, request.quantity, available
            )));
        }

        state
            .stock
            .insert(request.product_id.clone(), available - request.quantity);
        state.reservations.insert(
            request.order_id,
            (request.product_id.clone(), request.quantity),
        );
        Ok(StockReply::accepted(format!(
            "Reserved {} units of {}",
            request.quantity, request.product_id
        )))
    }

    async fn release_stock(
        &self,
        meta: &CallMetadata,
        request: &StockRequest,
    ) -> Result<StockReply, CallFailure> {
        let mut state = self.state();
        let failure = state.release_failure.clone();
        state.observe(InventoryCallKind::Release, meta, request, failure)?;

        if state.reject_release {
            return Ok(StockReply::rejected("Stock release refused"));
        }

        match state.reservations.remove(&request.order_id) {
            Some((product_id, units)) => {
                let available = state.available(&product_id);
                state.stock.insert(product_id.clone(), available.saturating_add(units));
                Ok(StockReply::accepted(format!(
                    "Released {units} units of {product_id}"
                )))
            }
            None => Ok(StockReply::accepted("Nothing reserved for order")),
        }
    }
}
