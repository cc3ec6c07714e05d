//! Payment provider abstraction.
//!
//! A provider is chosen once at startup by [`build_payment_provider`] and
//! shared through application state. Payment creation folds provider
//! failures into [`PaymentResult`]. A status re-query keeps them apart:
//! the gateway answering "not paid" is a result, not reaching it is an error.

pub mod stub;
pub mod yookassa;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;

pub use stub::StubProvider;
pub use yookassa::YooKassaProvider;

/// Payment failures inside a provider. Callers only see their text.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Payment gateway rejected the request with status {status}")]
    Rejected { status: u16, body: String },

    #[error("Payment gateway response has no confirmation URL")]
    MissingConfirmationUrl,

    #[error("Payment gateway misconfigured: {0}")]
    Configuration(String),
}

/// Input for creating a payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub order_id: Uuid,
    pub order_number: i64,
    pub amount_cents: i64,
    pub description: String,
    pub return_url: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Outcome of a provider call; `success == false` always carries `error`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentError {
    /// Whether asking again later could give a different answer.
    pub fn is_transient(&self) -> bool {
        match self {
            PaymentError::Transport(_) => true,
            PaymentError::Rejected { status, .. } => *status == 429 || *status >= 500,
            PaymentError::MissingConfirmationUrl | PaymentError::Configuration(_) => false,
        }
    }
}

impl PaymentResult {
    pub fn succeeded(transaction_id: impl Into<String>, payment_url: Option<String>) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id.into()),
            payment_url,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("Payment failed")
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether a successful payment returns a URL the customer must visit.
    fn requires_redirect(&self) -> bool;

    async fn create_payment(&self, request: PaymentRequest) -> PaymentResult;

    /// Re-queries a payment. `Ok(None)` when the provider has no status endpoint.
    async fn check_payment(
        &self,
        _transaction_id: &str,
    ) -> Result<Option<PaymentResult>, PaymentError> {
        Ok(None)
    }
}

/// Picks the provider for this process: YooKassa when both credentials are
/// configured, the stub otherwise.
pub fn build_payment_provider(config: &AppConfig) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
    let provider: Arc<dyn PaymentProvider> = match config.yookassa_credentials() {
        Some((shop_id, secret_key)) => Arc::new(YooKassaProvider::new(
            &config.yookassa_api_url,
            shop_id,
            secret_key,
            &config.payment_currency,
            config.payment_timeout(),
        )?),
        None => Arc::new(StubProvider),
    };
    info!(
        provider = provider.name(),
        redirect = provider.requires_redirect(),
        "Payment provider selected"
    );
    Ok(provider)
}
