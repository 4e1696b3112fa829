//! Request deduplication records.

use chrono::{DateTime, Duration, Utc};
use common::IdempotencyKey;
use serde::{Deserialize, Serialize};

/// Hours a key stays bound to its request unless configured otherwise.
pub const DEFAULT_IDEMPOTENCY_TTL_HOURS: i64 = 24;

/// One deduplication entry keyed by a caller-supplied key.
///
/// Created with empty response fields when the key is first seen and
/// completed exactly once with the final response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    pub operation_path: String,
    pub request_hash: String,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Creates an empty record for a newly seen key.
    pub fn begin(
        key: IdempotencyKey,
        operation_path: impl Into<String>,
        request_hash: impl Into<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            operation_path: operation_path.into(),
            request_hash: request_hash.into(),
            response_status: None,
            response_body: None,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Returns true once `now` has reached the expiry time.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns true if the key was bound to this exact (path, hash) pair.
    pub fn matches(&self, operation_path: &str, request_hash: &str) -> bool {
        self.operation_path == operation_path && self.request_hash == request_hash
    }

    /// Returns the cached response, if the original request finished.
    pub fn response(&self) -> Option<(u16, &str)> {
        match (self.response_status, self.response_body.as_deref()) {
            (Some(status), Some(body)) => Some((status, body)),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.response().is_some()
    }
}
