pub mod address;
pub mod cart;
pub mod checkout;

pub use address::{DeliveryAddress, StoredAddress};
pub use cart::{Cart, CartLine};
pub use checkout::{CheckoutItem, CheckoutRequest, CheckoutResponse};
