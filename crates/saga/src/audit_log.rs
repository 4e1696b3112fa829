//! Append-only audit trail of saga steps.

use common::{CorrelationId, OrderId};
use domain::{NewSagaLogEntry, SagaLogEntry, StepStatus};
use store::SagaLogStore;

use crate::error::Result;

/// Identity of one saga run, stamped on each of its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaTrail {
    pub saga_id: OrderId,
    pub saga_type: String,
    pub correlation_id: CorrelationId,
}

/// Writes and reads saga audit rows.
///
/// Rows are only ever appended. Reconstructing a saga means reading its rows
/// in creation order.
#[derive(Debug, Clone)]
pub struct SagaAuditLog<S> {
    store: S,
}

impl<S: SagaLogStore> SagaAuditLog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Opens a trail for a new saga run. Writes nothing.
    pub fn start_saga(
        &self,
        saga_id: OrderId,
        saga_type: &str,
        correlation_id: CorrelationId,
    ) -> SagaTrail {
        tracing::info!(%saga_id, saga_type, %correlation_id, "saga started");
        SagaTrail {
            saga_id,
            saga_type: saga_type.to_string(),
            correlation_id,
        }
    }

    /// Appends one row to the trail.
    pub async fn log_step(
        &self,
        trail: &SagaTrail,
        step: &str,
        status: StepStatus,
        payload: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<SagaLogEntry> {
        let mut entry = NewSagaLogEntry::new(trail.saga_id, &trail.saga_type, step, status)
            .with_correlation_id(trail.correlation_id.clone());
        if let Some(payload) = payload {
            entry = entry.with_payload(payload);
        }
        if let Some(error) = error {
            entry = entry.with_error(error);
        }

        let entry = self.store.append_entry(entry).await?;
        tracing::debug!(
            saga_id = %trail.saga_id,
            step,
            status = %status,
            "saga step logged"
        );
        Ok(entry)
    }

    /// Returns every row of a saga in creation order.
    pub async fn history(&self, saga_id: OrderId) -> Result<Vec<SagaLogEntry>> {
        Ok(self.store.entries_for_saga(saga_id).await?)
    }
}
