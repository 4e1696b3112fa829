//! Order entity.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::error::OrderError;

use super::{Money, OrderStatus, ProductId, UserId};

/// The business record of one "create order" transaction.
///
/// Created by the saga coordinator with status `PENDING` and mutated only by
/// it. Status changes go through [`Order::transition_to`], which refuses any
/// write once a terminal status is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    product_id: ProductId,
    amount: Money,
    quantity: u32,
    status: OrderStatus,
    payment_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Raw field values used by repositories to rebuild a stored order.
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub amount: Money,
    pub quantity: u32,
    pub status: OrderStatus,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new pending order with a fresh ID.
    ///
    /// A quantity of zero is treated as one.
    pub fn new(
        user_id: UserId,
        product_id: ProductId,
        amount: Money,
        quantity: u32,
    ) -> Result<Self, OrderError> {
        if user_id.as_str().trim().is_empty() {
            return Err(OrderError::EmptyField { field: "user_id" });
        }
        if product_id.as_str().trim().is_empty() {
            return Err(OrderError::EmptyField {
                field: "product_id",
            });
        }

        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            user_id,
            product_id,
            amount,
            quantity: quantity.max(1),
            status: OrderStatus::Pending,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds an order from stored values.
    pub fn from_parts(parts: OrderParts) -> Self {
        Self {
            id: parts.id,
            user_id: parts.user_id,
            product_id: parts.product_id,
            amount: parts.amount,
            quantity: parts.quantity,
            status: parts.status,
            payment_reference: parts.payment_reference,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    /// Moves the order to `next`.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidStatusTransition {
                current: self.status,
                requested: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records the participant's payment reference and advances to
    /// `PAYMENT_COMPLETED`.
    pub fn record_payment(&mut self, reference: impl Into<String>) -> Result<(), OrderError> {
        self.transition_to(OrderStatus::PaymentCompleted)?;
        self.payment_reference = Some(reference.into());
        Ok(())
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Payment reference, set only after a successful charge.
    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the order reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
