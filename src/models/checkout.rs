use crate::entities::DeliveryType;
use crate::models::address::DeliveryAddress;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Checkout submission as sent by the storefront client.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub delivery_type: DeliveryType,

    #[validate(custom = "validate_customer_name")]
    pub customer_name: String,

    #[validate(custom = "validate_phone")]
    pub phone: String,

    #[validate]
    #[serde(default)]
    pub address: Option<DeliveryAddress>,

    #[serde(default)]
    pub comment: Option<String>,

    #[serde(default)]
    pub cutlery: Option<bool>,

    #[serde(default)]
    pub desired_time: Option<String>,

    #[serde(default)]
    pub promo_code: Option<String>,

    #[validate]
    pub items: Vec<CheckoutItem>,

    #[validate(range(min = 0))]
    pub subtotal: i64,

    #[validate(range(min = 0))]
    #[serde(default)]
    pub discount: Option<i64>,

    #[validate(range(min = 0))]
    pub total: i64,
}

impl CheckoutRequest {
    /// Promo code as the customer typed it, or `None` when blank.
    pub fn promo_code(&self) -> Option<&str> {
        self.promo_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }

    pub fn comment(&self) -> Option<String> {
        non_blank(&self.comment)
    }

    pub fn desired_time(&self) -> Option<String> {
        non_blank(&self.desired_time)
    }
}

/// Length check on the trimmed value, which is what gets stored.
fn trimmed_min_len(value: &str, min: usize, message: &'static str) -> Result<(), ValidationError> {
    if value.trim().chars().count() >= min {
        return Ok(());
    }
    let mut err = ValidationError::new("length");
    err.message = Some(Cow::Borrowed(message));
    err.add_param(Cow::Borrowed("min"), &min);
    Err(err)
}

fn validate_customer_name(value: &str) -> Result<(), ValidationError> {
    trimmed_min_len(value, 2, "Name must be at least 2 characters")
}

fn validate_phone(value: &str) -> Result<(), ValidationError> {
    trimmed_min_len(value, 10, "Enter a valid phone number")
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// One cart line with the catalog data captured at order time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    #[validate(length(min = 1, message = "productId is required"))]
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[validate(length(min = 1, message = "nameSnapshot is required"))]
    pub name_snapshot: String,
    #[serde(default)]
    pub variant_snapshot: Option<String>,
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price_snapshot: i64,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub qty: i32,
}

/// Result of a checkout; `payment_url` set means the client must redirect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> serde_json::Value {
        serde_json::json!({
            "deliveryType": "PICKUP",
            "customerName": "Anna",
            "phone": "+79990001122",
            "items": [{
                "productId": "p1",
                "variantId": null,
                "nameSnapshot": "Ramen",
                "variantSnapshot": null,
                "priceSnapshot": 45000,
                "qty": 2
            }],
            "subtotal": 90000,
            "total": 90000
        })
    }

    #[test]
    fn camel_case_payload_parses_and_validates() {
        let req: CheckoutRequest = serde_json::from_value(payload()).unwrap();
        assert_eq!(req.delivery_type, DeliveryType::Pickup);
        assert!(req.validate().is_ok());
        assert_eq!(req.discount, None);
        assert_eq!(req.promo_code(), None);
    }

    #[test]
    fn zero_quantity_and_short_phone_are_rejected() {
        let mut value = payload();
        value["items"][0]["qty"] = 0.into();
        value["phone"] = "123".into();
        let req: CheckoutRequest = serde_json::from_value(value).unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.errors().contains_key("items"));
        assert!(errors.field_errors().contains_key("phone"));
    }

    #[test]
    fn whitespace_only_name_is_too_short() {
        let mut value = payload();
        value["customerName"] = "   ".into();
        value["phone"] = "  +7999  ".into();
        let req: CheckoutRequest = serde_json::from_value(value).unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert_eq!(
            fields["customer_name"][0].message.as_deref(),
            Some("Name must be at least 2 characters")
        );
        assert!(fields.contains_key("phone"));
    }

    #[test]
    fn negative_money_fields_are_rejected() {
        let mut value = payload();
        value["total"] = (-1).into();
        let req: CheckoutRequest = serde_json::from_value(value).unwrap();
        assert!(req.validate().unwrap_err().field_errors().contains_key("total"));
    }

    #[test]
    fn unknown_delivery_type_fails_to_parse() {
        let mut value = payload();
        value["deliveryType"] = "TELEPORT".into();
        assert!(serde_json::from_value::<CheckoutRequest>(value).is_err());
    }

    #[test]
    fn response_omits_missing_payment_url() {
        let response = CheckoutResponse {
            order_id: Uuid::nil(),
            number: 7,
            payment_url: None,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["number"], 7);
        assert!(value.get("paymentUrl").is_none());
    }
}
