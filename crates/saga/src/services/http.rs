//! HTTP clients for remote inventory and payment participants.
//!
//! Both participants speak JSON over `POST`. The correlation id travels in the
//! `X-Correlation-ID` header. A `503 Service Unavailable` answer is the
//! participant's resilience layer refusing the call and maps to
//! [`CallFailure::CircuitOpen`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

use super::{
    CORRELATION_ID_HEADER, CallFailure, CallMetadata, ChargeRequest, InventoryService,
    PaymentReply, PaymentService, RefundRequest, StockReply, StockRequest,
};

/// Shared transport for the participant clients.
#[derive(Debug, Clone)]
struct JsonTransport {
    client: Client,
    base_url: String,
}

impl JsonTransport {
    fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<Req, Resp>(
        &self,
        path: &str,
        meta: &CallMetadata,
        body: &Req,
    ) -> Result<Resp, CallFailure>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header(CORRELATION_ID_HEADER, meta.correlation_id.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallFailure::Timeout
                } else {
                    CallFailure::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(CallFailure::CircuitOpen);
        }
        if !status.is_success() {
            return Err(CallFailure::Transport(format!("HTTP {status}")));
        }

        if let Some(echoed) = response.headers().get(CORRELATION_ID_HEADER)
            && echoed.as_bytes() != meta.correlation_id.as_str().as_bytes()
        {
            tracing::warn!(
                url = %url,
                expected = %meta.correlation_id,
                "participant echoed a different correlation id"
            );
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                CallFailure::Timeout
            } else {
                CallFailure::Malformed(e.to_string())
            }
        })
    }
}

/// Inventory participant reached over HTTP.
///
/// Calls `POST {base}/inventory/reserve` and `POST {base}/inventory/release`.
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    transport: JsonTransport,
}

impl HttpInventoryClient {
    /// Creates a client whose calls give up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            transport: JsonTransport::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl InventoryService for HttpInventoryClient {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn reserve_stock(
        &self,
        meta: &CallMetadata,
        request: &StockRequest,
    ) -> Result<StockReply, CallFailure> {
        self.transport.post("/inventory/reserve", meta, request).await
    }

    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn release_stock(
        &self,
        meta: &CallMetadata,
        request: &StockRequest,
    ) -> Result<StockReply, CallFailure> {
        self.transport.post("/inventory/release", meta, request).await
    }
}

/// Payment participant reached over HTTP.
///
/// Calls `POST {base}/payments/process` and `POST {base}/payments/refund`.
#[derive(Debug, Clone)]
pub struct HttpPaymentClient {
    transport: JsonTransport,
}

impl HttpPaymentClient {
    /// Creates a client whose calls give up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            transport: JsonTransport::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl PaymentService for HttpPaymentClient {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn process_payment(
        &self,
        meta: &CallMetadata,
        request: &ChargeRequest,
    ) -> Result<PaymentReply, CallFailure> {
        self.transport.post("/payments/process", meta, request).await
    }

    #[tracing::instrument(skip(self, request), fields(payment_id = %request.payment_id))]
    async fn refund_payment(
        &self,
        meta: &CallMetadata,
        request: &RefundRequest,
    ) -> Result<PaymentReply, CallFailure> {
        self.transport.post("/payments/refund", meta, request).await
    }
}
