//! Saga audit log records.

use chrono::{DateTime, Utc};
use common::{CorrelationId, OrderId};
use serde::{Deserialize, Serialize};

/// Status of one audit row.
///
/// A step's lifecycle is one `Pending` row followed by at most one terminal
/// row; rows are never edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Completed,
    Failed,
}

impl StepStatus {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "Pending",
            StepStatus::Completed => "Completed",
            StepStatus::Failed => "Failed",
        }
    }

    /// Parses a stored status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(StepStatus::Pending),
            "Completed" => Some(StepStatus::Completed),
            "Failed" => Some(StepStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An audit row before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSagaLogEntry {
    pub saga_id: OrderId,
    pub saga_type: String,
    pub step: String,
    pub status: StepStatus,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    pub correlation_id: Option<CorrelationId>,
    pub created_at: DateTime<Utc>,
    /// Set only when `status` is terminal.
    pub completed_at: Option<DateTime<Utc>>,
}

impl NewSagaLogEntry {
    /// Creates a row stamped with the current time.
    pub fn new(
        saga_id: OrderId,
        saga_type: impl Into<String>,
        step: impl Into<String>,
        status: StepStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            saga_id,
            saga_type: saga_type.into(),
            step: step.into(),
            status,
            payload: None,
            error: None,
            correlation_id: None,
            created_at: now,
            completed_at: status.is_terminal().then_some(now),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Attaches the store-assigned id.
    pub fn into_entry(self, id: i64) -> SagaLogEntry {
        SagaLogEntry {
            id,
            saga_id: self.saga_id,
            saga_type: self.saga_type,
            step: self.step,
            status: self.status,
            payload: self.payload,
            error: self.error,
            correlation_id: self.correlation_id,
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

/// A persisted audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaLogEntry {
    pub id: i64,
    pub saga_id: OrderId,
    pub saga_type: String,
    pub step: String,
    pub status: StepStatus,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    pub correlation_id: Option<CorrelationId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
