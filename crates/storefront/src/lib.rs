//! Bazaar storefront client core.
//!
//! Keeps a local mirror of the server-side session and cart consistent
//! across network failures and concurrent user actions.
//!
//! - [`api`] - REST client with transparent session refresh
//! - [`session`] - who is signed in
//! - [`cart`] - the server-authoritative cart
//! - [`checkout`] - turning the cart into an order
//! - [`state`] - the [`Storefront`] context wiring them together
//!
//! # Example
//!
//! ```rust,ignore
//! use bazaar_storefront::{Storefront, StorefrontConfig};
//!
//! let storefront = Storefront::new(StorefrontConfig::from_env()?)?;
//! storefront.start().await;
//! storefront.cart().add(product_id, 2).await?;
//! let order = storefront.checkout().checkout(&delivery).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod models;
pub mod session;
pub mod state;
pub mod telemetry;

pub use config::StorefrontConfig;
pub use state::Storefront;
