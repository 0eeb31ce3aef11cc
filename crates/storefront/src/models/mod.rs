//! Wire and domain models for the storefront client.
//!
//! These mirror the backend's JSON payloads. Store-level types that carry
//! local invariants (cart lines, order drafts) live next to their stores.

pub mod cart;
pub mod catalog;
pub mod order;
pub mod user;

pub use cart::{CartLineInput, CartQuantityUpdate, WireCartLine};
pub use catalog::{Category, CategoryInput, Product, ProductInput, ProductQuery, ProductSpec};
pub use order::{
    DeliveryInfo, Order, OrderDraft, OrderDraftItem, OrderItem, OrderListQuery, OrderStatistics,
    OrderSummary,
};
pub use user::{NewUser, RoleUpdate, Token, User, UserPatch};
