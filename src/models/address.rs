use serde::{Deserialize, Serialize};
use validator::Validate;

/// Structured delivery address. Persisted as a JSON blob on the order row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DeliveryAddress {
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "Building is required"))]
    pub building: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apartment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doorcode: Option<String>,
}

impl DeliveryAddress {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Non-empty parts joined with ", ", in street-to-doorcode order.
    pub fn display_line(&self) -> String {
        [
            Some(self.street.as_str()),
            Some(self.building.as_str()),
            self.apartment.as_deref(),
            self.entrance.as_deref(),
            self.floor.as_deref(),
            self.doorcode.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// What an order row's address column decodes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoredAddress {
    Structured(DeliveryAddress),
    /// Anything that is not a valid encoded address is kept verbatim.
    Raw(String),
}

impl StoredAddress {
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str::<DeliveryAddress>(raw) {
            Ok(address) => StoredAddress::Structured(address),
            Err(_) => StoredAddress::Raw(raw.to_string()),
        }
    }

    pub fn display_line(&self) -> String {
        match self {
            StoredAddress::Structured(address) => address.display_line(),
            StoredAddress::Raw(raw) => raw.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeliveryAddress {
        DeliveryAddress {
            street: "Lenina".into(),
            building: "12".into(),
            apartment: Some("34".into()),
            entrance: None,
            floor: Some("".into()),
            doorcode: Some("k55".into()),
        }
    }

    #[test]
    fn display_skips_missing_and_blank_parts() {
        assert_eq!(sample().display_line(), "Lenina, 12, 34, k55");
    }

    #[test]
    fn stored_address_decodes_what_was_encoded() {
        let encoded = sample().encode().unwrap();
        assert_eq!(StoredAddress::decode(&encoded), StoredAddress::Structured(sample()));
    }

    #[test]
    fn malformed_blob_degrades_to_raw_text() {
        let stored = StoredAddress::decode("Lenina st. 12, flat 34");
        assert_eq!(stored.display_line(), "Lenina st. 12, flat 34");

        let stored = StoredAddress::decode(r#"{"street": 5}"#);
        assert!(matches!(stored, StoredAddress::Raw(_)));
    }

    #[test]
    fn street_and_building_are_required() {
        let address = DeliveryAddress::default();
        let errors = address.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("street"));
        assert!(fields.contains_key("building"));
    }
}
