pub mod order;
pub mod order_item;
pub mod promo_code;

pub use order::{DeliveryType, OrderStatus, PaymentStatus};
pub use promo_code::PromoKind;
