use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::AppConfig;
use crate::entities::order_item;
use crate::models::address::StoredAddress;
use crate::repositories::OrderWithItems;
use crate::services::pricing::format_major_units;

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Bot API rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Notification timed out after {0:?}")]
    Timeout(Duration),
}

/// Receives orders that became actionable for the kitchen.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn order_placed(&self, order: &OrderWithItems) -> Result<(), NotificationError>;
}

/// Delivers a notification without letting its failure reach the caller.
///
/// The attempt is bounded by `timeout`; errors are logged and counted.
pub async fn notify_order_placed(
    sink: &dyn NotificationSink,
    order: &OrderWithItems,
    timeout: Duration,
) {
    let outcome = match tokio::time::timeout(timeout, sink.order_placed(order)).await {
        Ok(result) => result,
        Err(_) => Err(NotificationError::Timeout(timeout)),
    };

    match outcome {
        Ok(()) => debug!(
            sink = sink.name(),
            number = order.order.number,
            "Order notification sent"
        ),
        Err(e) => {
            counter!("storefront_notifications_failed_total", 1);
            error!(
                sink = sink.name(),
                number = order.order.number,
                "Order notification failed: {}",
                e
            );
        }
    }
}

fn item_line(item: &order_item::Model, currency: &str) -> String {
    let name = match item.variant_snapshot.as_deref().filter(|v| !v.is_empty()) {
        Some(variant) => format!("{} ({})", item.name_snapshot, variant),
        None => item.name_snapshot.clone(),
    };
    format!(
        "  • {} × {} — {} {}",
        name,
        item.qty,
        format_major_units(item.line_total()),
        currency
    )
}

/// Plain-text order summary for staff chats.
pub fn format_order_message(order: &OrderWithItems, currency: &str) -> String {
    let o = &order.order;
    let mut lines = vec![
        format!("New order #{}", o.number),
        String::new(),
        format!("Type: {}", o.delivery_type.label()),
        format!("Name: {}", o.customer_name),
        format!("Phone: {}", o.phone),
    ];

    if let Some(raw) = o.address.as_deref() {
        let address = StoredAddress::decode(raw).display_line();
        if !address.is_empty() {
            lines.push(format!("Address: {}", address));
        }
    }
    if let Some(time) = o.desired_time.as_deref().filter(|t| !t.is_empty()) {
        lines.push(format!("Time: {}", time));
    }

    lines.push(String::new());
    lines.push("Items:".to_string());
    lines.extend(order.items.iter().map(|item| item_line(item, currency)));
    lines.push(String::new());

    lines.push(format!(
        "Subtotal: {} {}",
        format_major_units(o.subtotal),
        currency
    ));
    if o.discount > 0 {
        let promo = o
            .promo_code
            .as_deref()
            .map(|code| format!(" ({})", code))
            .unwrap_or_default();
        lines.push(format!(
            "Discount: -{} {}{}",
            format_major_units(o.discount),
            currency,
            promo
        ));
    }
    lines.push(format!("Total: {} {}", format_major_units(o.total), currency));
    if o.cutlery {
        lines.push("Cutlery: yes".to_string());
    }
    if let Some(comment) = o.comment.as_deref().filter(|c| !c.is_empty()) {
        lines.push(format!("Comment: {}", comment));
    }

    lines.join("\n")
}

/// Posts order summaries to a Telegram chat through the Bot API.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
    currency: String,
}

impl TelegramNotifier {
    pub fn new(
        api_url: &str,
        bot_token: &str,
        chat_id: &str,
        currency: &str,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            currency: currency.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    #[instrument(skip(self, order), fields(number = order.order.number))]
    async fn order_placed(&self, order: &OrderWithItems) -> Result<(), NotificationError> {
        let text = format_order_message(order, &self.currency);
        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_url, self.bot_token))
            .json(&serde_json::json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Telegram sendMessage failed");
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Sink used when no chat is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn order_placed(&self, order: &OrderWithItems) -> Result<(), NotificationError> {
        debug!(number = order.order.number, "No notification sink configured");
        Ok(())
    }
}

/// Telegram when both the bot token and chat id are configured, no-op otherwise.
pub fn build_notification_sink(
    config: &AppConfig,
) -> Result<Arc<dyn NotificationSink>, NotificationError> {
    let sink: Arc<dyn NotificationSink> = match config.telegram_credentials() {
        Some((token, chat_id)) => Arc::new(TelegramNotifier::new(
            &config.telegram_api_url,
            token,
            chat_id,
            &config.payment_currency,
            config.notification_timeout(),
        )?),
        None => Arc::new(NoopNotifier),
    };
    info!(sink = sink.name(), "Notification sink selected");
    Ok(sink)
}
