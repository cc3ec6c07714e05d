use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::{PaymentError, PaymentProvider, PaymentRequest, PaymentResult};
use crate::services::pricing::format_decimal_amount;

/// Gateway status meaning the money has been captured.
const STATUS_SUCCEEDED: &str = "succeeded";

#[derive(Debug, Deserialize)]
struct GatewayPayment {
    id: String,
    status: String,
    #[serde(default)]
    confirmation: Option<GatewayConfirmation>,
}

#[derive(Debug, Deserialize)]
struct GatewayConfirmation {
    #[serde(default)]
    confirmation_url: Option<String>,
}

/// YooKassa redirect payments (`/v3/payments`).
#[derive(Clone)]
pub struct YooKassaProvider {
    client: reqwest::Client,
    api_url: String,
    shop_id: String,
    secret_key: String,
    currency: String,
}

impl std::fmt::Debug for YooKassaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YooKassaProvider")
            .field("api_url", &self.api_url)
            .field("shop_id", &self.shop_id)
            .finish_non_exhaustive()
    }
}

impl YooKassaProvider {
    pub fn new(
        api_url: &str,
        shop_id: &str,
        secret_key: &str,
        currency: &str,
        timeout: Duration,
    ) -> Result<Self, PaymentError> {
        if shop_id.trim().is_empty() || secret_key.trim().is_empty() {
            return Err(PaymentError::Configuration(
                "shop id and secret key are required".into(),
            ));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            shop_id: shop_id.to_string(),
            secret_key: secret_key.to_string(),
            currency: currency.to_string(),
        })
    }

    fn request_body(&self, request: &PaymentRequest) -> serde_json::Value {
        let mut metadata = BTreeMap::new();
        metadata.insert("orderId".to_string(), request.order_id.to_string());
        metadata.insert("orderNumber".to_string(), request.order_number.to_string());
        metadata.extend(request.metadata.clone());

        serde_json::json!({
            "amount": {
                "value": format_decimal_amount(request.amount_cents),
                "currency": self.currency,
            },
            "capture": true,
            "confirmation": {
                "type": "redirect",
                "return_url": request.return_url,
            },
            "description": request.description,
            "metadata": metadata,
        })
    }

    async fn try_create(&self, request: &PaymentRequest) -> Result<(String, String), PaymentError> {
        let idempotence_key = format!("{}-{}", request.order_id, Utc::now().timestamp_millis());

        let response = self
            .client
            .post(format!("{}/payments", self.api_url))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", idempotence_key)
            .json(&self.request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let payment: GatewayPayment = response.json().await?;
        let url = payment
            .confirmation
            .and_then(|c| c.confirmation_url)
            .filter(|url| !url.is_empty())
            .ok_or(PaymentError::MissingConfirmationUrl)?;
        Ok((payment.id, url))
    }

    async fn try_check(&self, transaction_id: &str) -> Result<GatewayPayment, PaymentError> {
        let response = self
            .client
            .get(format!("{}/payments/{}", self.api_url, transaction_id))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentProvider for YooKassaProvider {
    fn name(&self) -> &'static str {
        "yookassa"
    }

    fn requires_redirect(&self) -> bool {
        true
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id, number = request.order_number))]
    async fn create_payment(&self, request: PaymentRequest) -> PaymentResult {
        match self.try_create(&request).await {
            Ok((transaction_id, payment_url)) => {
                info!(%transaction_id, "Payment created");
                PaymentResult::succeeded(transaction_id, Some(payment_url))
            }
            Err(PaymentError::Rejected { status, body }) => {
                error!(status, %body, "Payment gateway rejected payment creation");
                PaymentResult::failed(format!("Payment system error: {}", status))
            }
            Err(e) => {
                error!("Payment creation failed: {}", e);
                PaymentResult::failed(e.to_string())
            }
        }
    }

    #[instrument(skip(self))]
    async fn check_payment(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentResult>, PaymentError> {
        let result = match self.try_check(transaction_id).await {
            Ok(payment) if payment.status == STATUS_SUCCEEDED => {
                PaymentResult::succeeded(payment.id, None)
            }
            Ok(payment) => PaymentResult {
                success: false,
                transaction_id: Some(payment.id),
                payment_url: None,
                error: Some(payment.status),
            },
            Err(e) if e.is_transient() => {
                warn!("Payment status check failed: {}", e);
                return Err(e);
            }
            Err(e) => {
                warn!("Payment gateway refused status check: {}", e);
                PaymentResult::failed(e.to_string())
            }
        };
        Ok(Some(result))
    }
}
