use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::{PaymentProvider, PaymentRequest, PaymentResult};

/// Used when online payment is off: succeeds at once, charges nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct StubProvider;

#[async_trait]
impl PaymentProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn requires_redirect(&self) -> bool {
        false
    }

    async fn create_payment(&self, request: PaymentRequest) -> PaymentResult {
        let transaction_id = format!("stub-{}", Utc::now().timestamp_millis());
        debug!(order_id = %request.order_id, %transaction_id, "Stub payment accepted");
        PaymentResult::succeeded(transaction_id, None)
    }
}
