use crate::entities::DeliveryType;
use crate::models::checkout::CheckoutItem;
use crate::services::pricing::{self, PricedLine};
use serde::{Deserialize, Serialize};

/// A cart line. Identity is `(product_id, variant_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub name: String,
    pub variant_name: Option<String>,
    pub price: i64,
    pub qty: i32,
}

impl CartLine {
    fn is_keyed(&self, product_id: &str, variant_id: Option<&str>) -> bool {
        self.product_id == product_id && self.variant_id.as_deref() == variant_id
    }
}

impl PricedLine for CartLine {
    fn unit_price(&self) -> i64 {
        self.price
    }

    fn quantity(&self) -> i64 {
        i64::from(self.qty)
    }
}

/// Client-held cart. Never persisted by the service; used to build checkout
/// submissions and to preview totals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub delivery_type: DeliveryType,
    pub items: Vec<CartLine>,
    pub comment: String,
    pub cutlery: bool,
    pub applied_promo: Option<String>,
}

impl Default for Cart {
    fn default() -> Self {
        Self {
            delivery_type: DeliveryType::Delivery,
            items: Vec::new(),
            comment: String::new(),
            cutlery: false,
            applied_promo: None,
        }
    }
}

impl Cart {
    /// Adds one unit; a line with the same key is bumped instead of duplicated.
    pub fn add_item(
        &mut self,
        product_id: impl Into<String>,
        variant_id: Option<String>,
        name: impl Into<String>,
        variant_name: Option<String>,
        price: i64,
    ) {
        let product_id = product_id.into();
        if let Some(line) = self
            .items
            .iter_mut()
            .find(|l| l.is_keyed(&product_id, variant_id.as_deref()))
        {
            line.qty = line.qty.saturating_add(1);
            return;
        }
        self.items.push(CartLine {
            product_id,
            variant_id,
            name: name.into(),
            variant_name,
            price,
            qty: 1,
        });
    }

    /// Applies `delta` to a line, clamping at zero; zero lines are dropped.
    pub fn update_qty(&mut self, product_id: &str, variant_id: Option<&str>, delta: i32) {
        for line in self
            .items
            .iter_mut()
            .filter(|l| l.is_keyed(product_id, variant_id))
        {
            line.qty = line.qty.saturating_add(delta).max(0);
        }
        self.items.retain(|l| l.qty > 0);
    }

    pub fn remove_item(&mut self, product_id: &str, variant_id: Option<&str>) {
        self.items.retain(|l| !l.is_keyed(product_id, variant_id));
    }

    pub fn subtotal(&self) -> i64 {
        pricing::subtotal(&self.items)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.comment.clear();
        self.cutlery = false;
        self.applied_promo = None;
    }

    pub fn to_checkout_items(&self) -> Vec<CheckoutItem> {
        self.items
            .iter()
            .map(|line| CheckoutItem {
                product_id: line.product_id.clone(),
                variant_id: line.variant_id.clone(),
                name_snapshot: line.name.clone(),
                variant_snapshot: line.variant_name.clone(),
                price_snapshot: line.price,
                qty: line.qty,
            })
            .collect()
    }
}
