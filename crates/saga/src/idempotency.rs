//! Request deduplication keyed by caller-supplied idempotency keys.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use common::IdempotencyKey;
use domain::{DEFAULT_IDEMPOTENCY_TTL_HOURS, IdempotencyRecord};
use sha2::{Digest, Sha256};
use store::{Claim, IdempotencyStore};

use crate::cancel::CancelSignal;
use crate::error::{Result, SagaError};

/// How long a duplicate waits for the original request by default.
pub const DEFAULT_DUPLICATE_WAIT: StdDuration = StdDuration::from_secs(30);

const FIRST_POLL_DELAY: StdDuration = StdDuration::from_millis(10);
const MAX_POLL_DELAY: StdDuration = StdDuration::from_millis(250);

/// What to do with an incoming keyed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// First time this key is seen; the caller now owns it.
    New,
    /// The original request finished; replay its response.
    Duplicate { status: u16, body: String },
    /// The original request is still running.
    InProgress,
}

/// Lowercase hex SHA-256 of a request body.
pub fn request_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Binds idempotency keys to requests and caches their final responses.
#[derive(Debug, Clone)]
pub struct IdempotencyGuard<S> {
    store: S,
    ttl: Duration,
    duplicate_wait: StdDuration,
}

impl<S: IdempotencyStore> IdempotencyGuard<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            ttl: Duration::hours(DEFAULT_IDEMPOTENCY_TTL_HOURS),
            duplicate_wait: DEFAULT_DUPLICATE_WAIT,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Caps how long [`await_response`](Self::await_response) waits.
    pub fn with_duplicate_wait(mut self, wait: StdDuration) -> Self {
        self.duplicate_wait = wait;
        self
    }

    /// Claims `key` for this request or reports what the key is already bound to.
    ///
    /// Fails with [`SagaError::IdempotencyConflict`] when the key is bound to a
    /// different operation or body.
    #[tracing::instrument(skip(self, key, request_body), fields(key = %key))]
    pub async fn check_and_begin(
        &self,
        key: &IdempotencyKey,
        operation_path: &str,
        request_body: &[u8],
    ) -> Result<Admission> {
        let hash = request_hash(request_body);
        let now = Utc::now();
        let record = IdempotencyRecord::begin(key.clone(), operation_path, &hash, self.ttl, now);

        match self.store.claim(record, now).await? {
            Claim::Acquired => Ok(Admission::New),
            Claim::Existing(existing) if !existing.matches(operation_path, &hash) => {
                tracing::warn!("idempotency key reused with a different request");
                metrics::counter!("idempotency_conflicts_total").increment(1);
                Err(SagaError::IdempotencyConflict { key: key.clone() })
            }
            Claim::Existing(existing) => match existing.response() {
                Some((status, body)) => {
                    metrics::counter!("idempotent_replays_total").increment(1);
                    Ok(Admission::Duplicate {
                        status,
                        body: body.to_string(),
                    })
                }
                None => Ok(Admission::InProgress),
            },
        }
    }

    /// Waits for the request that owns `key` to store its response.
    ///
    /// Returns `None` when the caller cancels, the wait limit passes, or the
    /// record is purged in the meantime.
    #[tracing::instrument(skip(self, key, cancel), fields(key = %key))]
    pub async fn await_response(
        &self,
        key: &IdempotencyKey,
        cancel: &CancelSignal,
    ) -> Result<Option<(u16, String)>> {
        let waited = cancel
            .run(tokio::time::timeout(self.duplicate_wait, self.poll_response(key)))
            .await;
        match waited {
            Some(Ok(Ok(Some(response)))) => {
                metrics::counter!("idempotent_replays_total").increment(1);
                Ok(Some(response))
            }
            Some(Ok(result)) => result,
            Some(Err(_)) => {
                tracing::warn!(
                    wait = ?self.duplicate_wait,
                    "original request did not finish in time"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn poll_response(&self, key: &IdempotencyKey) -> Result<Option<(u16, String)>> {
        let mut delay = FIRST_POLL_DELAY;
        loop {
            tokio::time::sleep(delay).await;
            let Some(record) = self.store.get_record(key).await? else {
                return Ok(None);
            };
            if let Some((status, body)) = record.response() {
                return Ok(Some((status, body.to_string())));
            }
            delay = (delay * 2).min(MAX_POLL_DELAY);
        }
    }

    /// Stores the final response for a key claimed with [`Admission::New`].
    pub async fn complete_with(&self, key: &IdempotencyKey, status: u16, body: &str) -> Result<()> {
        self.store.complete(key, status, body).await?;
        Ok(())
    }

    /// Deletes records whose TTL has elapsed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let purged = self.store.purge_expired(Utc::now()).await?;
        if purged > 0 {
            tracing::info!(purged, "purged expired idempotency keys");
        }
        Ok(purged)
    }
}
