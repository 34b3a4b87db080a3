// kloven_storefront/src/models/mod.rs

//! Database entities and the request/response shapes built from them.

pub mod checkout;
pub mod order;
pub mod order_item;
pub mod product;
pub mod promo_code;
pub mod variant;

pub use checkout::{CheckoutLine, CheckoutRequest, CheckoutResponse};
pub use order::{NewOrder, Order, OrderItemSummary, OrderStatus, OrderSummary, OrderWithItems};
pub use order_item::{NewOrderItem, OrderItem};
pub use product::{Product, ProductFilter, ProductInput, ProductRemoval, ProductWithVariants, VariantInput};
pub use promo_code::{NewPromoCode, PromoCode};
pub use variant::ProductVariant;
