use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum accepted length of a caller-supplied idempotency key.
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Error returned when parsing an identifier from caller input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidIdentifier {
    #[error("invalid order id: {0}")]
    OrderId(String),

    #[error("idempotency key must not be blank")]
    BlankKey,

    #[error("idempotency key exceeds {max} characters")]
    KeyTooLong { max: usize },
}

/// Unique identifier for an order.
///
/// The saga coordinating an order is keyed by the same value, so this
/// doubles as the saga id in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Creates a new random order ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an order ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| InvalidIdentifier::OrderId(e.to_string()))
    }
}

impl From<Uuid> for OrderId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<OrderId> for Uuid {
    fn from(id: OrderId) -> Self {
        id.0
    }
}

/// Opaque value propagated across every call belonging to one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wraps a caller-supplied correlation id.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh correlation id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Uses the caller's value when present and non-blank, otherwise generates one.
    pub fn or_generate(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => Self::new(v),
            _ => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-supplied request deduplication token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validates and wraps a caller-supplied key.
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(InvalidIdentifier::BlankKey);
        }
        if trimmed.chars().count() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(InvalidIdentifier::KeyTooLong {
                max: MAX_IDEMPOTENCY_KEY_LEN,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_new_creates_unique_ids() {
        let id1 = OrderId::new();
        let id2 = OrderId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn order_id_parses_from_string() {
        let id = OrderId::new();
        let parsed: OrderId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<OrderId>().is_err());
    }

    #[test]
    fn order_id_serializes_as_plain_uuid() {
        let id = OrderId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }

    #[test]
    fn correlation_id_keeps_caller_value() {
        let id = CorrelationId::or_generate(Some("req-42"));
        assert_eq!(id.as_str(), "req-42");
    }

    #[test]
    fn correlation_id_generated_when_absent_or_blank() {
        let a = CorrelationId::or_generate(None);
        let b = CorrelationId::or_generate(Some("   "));
        assert!(!a.as_str().is_empty());
        assert!(!b.as_str().trim().is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn idempotency_key_validation() {
        assert_eq!(IdempotencyKey::parse(" abc ").unwrap().as_str(), "abc");
        assert_eq!(
            IdempotencyKey::parse("  "),
            Err(InvalidIdentifier::BlankKey)
        );
        assert_eq!(
            IdempotencyKey::parse("k".repeat(256)),
            Err(InvalidIdentifier::KeyTooLong { max: 255 })
        );
        assert!(IdempotencyKey::parse("k".repeat(255)).is_ok());
    }
}
