//! Order status machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OrderError;

/// The status of an order through its saga.
///
/// Transitions:
/// ```text
/// PENDING ──► INVENTORY_RESERVED ──► PAYMENT_COMPLETED ──► COMPLETED
///    │               │                      │
///    └───────────────┴──────────────────────┴──► any failure status
/// ```
/// Every status other than the first three is terminal; once reached, the
/// order is never written again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order persisted, saga started.
    #[default]
    Pending,

    /// Stock held by the inventory participant.
    InventoryReserved,

    /// Payment charged, awaiting finalization.
    PaymentCompleted,

    /// Saga finished successfully.
    Completed,

    /// Inventory participant rejected the reservation.
    InventoryReservationFailed,

    /// Inventory participant could not be reached; effect unknown.
    InventoryServiceError,

    /// Payment rejected and the stock release also failed.
    PaymentFailed,

    /// Payment rejected, reserved stock released.
    PaymentFailedStockReleased,

    /// Payment participant could not be reached; effect unknown.
    PaymentServiceError,

    /// Finalization failed, payment refunded and stock released.
    #[serde(
        rename = "FAILED_FULL_COMPENSATION_APPLIED",
        alias = "CANCELLED_AFTER_FAILURE"
    )]
    FullyCompensated,

    /// At least one compensating call failed; needs manual intervention.
    CompensationFailed,

    /// Caller went away while a participant call was in flight.
    CancelledByCaller,
}

impl OrderStatus {
    const ALL: [OrderStatus; 12] = [
        OrderStatus::Pending,
        OrderStatus::InventoryReserved,
        OrderStatus::PaymentCompleted,
        OrderStatus::Completed,
        OrderStatus::InventoryReservationFailed,
        OrderStatus::InventoryServiceError,
        OrderStatus::PaymentFailed,
        OrderStatus::PaymentFailedStockReleased,
        OrderStatus::PaymentServiceError,
        OrderStatus::FullyCompensated,
        OrderStatus::CompensationFailed,
        OrderStatus::CancelledByCaller,
    ];

    /// Returns true if this is a terminal status (no further writes).
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            OrderStatus::Pending | OrderStatus::InventoryReserved | OrderStatus::PaymentCompleted
        )
    }

    /// Returns true if the saga ended with the order fulfilled.
    pub fn is_success(&self) -> bool {
        matches!(self, OrderStatus::Completed)
    }

    /// Returns true if the order may move to `next`.
    ///
    /// Terminal statuses accept nothing; intermediate statuses only advance
    /// one step forward; any terminal status is reachable from a
    /// non-terminal one.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next.is_terminal() {
            return true;
        }
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::InventoryReserved)
                | (OrderStatus::InventoryReserved, OrderStatus::PaymentCompleted)
        )
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::InventoryReserved => "INVENTORY_RESERVED",
            OrderStatus::PaymentCompleted => "PAYMENT_COMPLETED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::InventoryReservationFailed => "INVENTORY_RESERVATION_FAILED",
            OrderStatus::InventoryServiceError => "INVENTORY_SERVICE_ERROR",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
            OrderStatus::PaymentFailedStockReleased => "PAYMENT_FAILED_STOCK_RELEASED",
            OrderStatus::PaymentServiceError => "PAYMENT_SERVICE_ERROR",
            OrderStatus::FullyCompensated => "FAILED_FULL_COMPENSATION_APPLIED",
            OrderStatus::CompensationFailed => "COMPENSATION_FAILED",
            OrderStatus::CancelledByCaller => "CANCELLED_BY_CALLER",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "CANCELLED_AFTER_FAILURE" {
            return Ok(OrderStatus::FullyCompensated);
        }
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_forward_intermediate_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::InventoryReserved));
        assert!(OrderStatus::InventoryReserved.can_transition_to(OrderStatus::PaymentCompleted));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::PaymentCompleted));
        assert!(!OrderStatus::PaymentCompleted.can_transition_to(OrderStatus::InventoryReserved));
        assert!(!OrderStatus::InventoryReserved.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_terminal_reachable_from_any_intermediate() {
        for from in [
            OrderStatus::Pending,
            OrderStatus::InventoryReserved,
            OrderStatus::PaymentCompleted,
        ] {
            assert!(from.can_transition_to(OrderStatus::Completed));
            assert!(from.can_transition_to(OrderStatus::CancelledByCaller));
        }
    }

    #[test]
    fn test_terminal_statuses_accept_nothing() {
        for status in OrderStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for next in OrderStatus::ALL {
                assert!(!status.can_transition_to(next), "{status} -> {next}");
            }
        }
    }

    #[test]
    fn test_only_three_statuses_are_in_flight() {
        let in_flight: Vec<_> = OrderStatus::ALL
            .into_iter()
            .filter(|s| !s.is_terminal())
            .collect();
        assert_eq!(
            in_flight,
            vec![
                OrderStatus::Pending,
                OrderStatus::InventoryReserved,
                OrderStatus::PaymentCompleted
            ]
        );
    }

    #[test]
    fn test_wire_names_roundtrip_through_from_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_legacy_rollback_name_is_an_alias() {
        let parsed: OrderStatus = serde_json::from_str("\"CANCELLED_AFTER_FAILURE\"").unwrap();
        assert_eq!(parsed, OrderStatus::FullyCompensated);
        assert_eq!(
            "CANCELLED_AFTER_FAILURE".parse::<OrderStatus>().unwrap(),
            OrderStatus::FullyCompensated
        );
        assert_eq!(
            OrderStatus::FullyCompensated.to_string(),
            "FAILED_FULL_COMPENSATION_APPLIED"
        );
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!(matches!(
            "SHIPPED".parse::<OrderStatus>(),
            Err(OrderError::UnknownStatus(_))
        ));
    }
}
