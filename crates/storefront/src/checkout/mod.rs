//! Checkout: turn the cart into an order.
//!
//! Placing the order and clearing the cart are separate server calls. If the
//! order is accepted but some lines cannot be deleted afterwards, the caller
//! gets [`CheckoutError::CartNotCleared`] carrying the placed order, so it is
//! never reported as a failed purchase.

use bazaar_core::CartLineId;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::api::{ApiClient, ApiError};
use crate::cart::{CartError, CartLine, CartStore};
use crate::models::{DeliveryInfo, Order, OrderDraft, OrderDraftItem};
use crate::telemetry;

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Nothing to order.
    #[error("cart is empty")]
    EmptyCart,

    /// A required delivery field is blank.
    #[error("delivery {0} is required")]
    MissingDeliveryInfo(&'static str),

    /// The order was not placed; the cart is unchanged.
    #[error("order submission failed: {0}")]
    Api(#[from] ApiError),

    /// The order was placed but some cart lines could not be deleted.
    #[error("order {} placed but {} cart line(s) were not cleared", order.display_number(), uncleared.len())]
    CartNotCleared {
        order: Box<Order>,
        uncleared: Vec<CartLineId>,
        #[source]
        source: CartError,
    },
}

impl CheckoutError {
    /// The placed order, if the failure happened after submission.
    #[must_use]
    pub fn placed_order(&self) -> Option<&Order> {
        match self {
            Self::CartNotCleared { order, .. } => Some(order.as_ref()),
            _ => None,
        }
    }
}

/// Builds and submits orders from the cart.
#[derive(Clone)]
pub struct Checkout {
    client: ApiClient,
    cart: CartStore,
}

impl Checkout {
    #[must_use]
    pub const fn new(client: ApiClient, cart: CartStore) -> Self {
        Self { client, cart }
    }

    /// Place an order for everything in the cart.
    ///
    /// Preconditions are checked before any network call. On success every
    /// line of the snapshot is deleted, one at a time.
    ///
    /// # Errors
    ///
    /// - `EmptyCart` / `MissingDeliveryInfo`: nothing was sent.
    /// - `Api`: the order was rejected; the cart is unchanged.
    /// - `CartNotCleared`: the order exists; listed lines remain in the cart.
    #[instrument(skip(self, info))]
    pub async fn checkout(&self, info: &DeliveryInfo) -> Result<Order, CheckoutError> {
        let snapshot = self.cart.lines();
        let draft = build_draft(&snapshot, info)?;

        let order = self
            .client
            .create_order(&draft)
            .await
            .inspect_err(|e| telemetry::report_api_error("checkout.submit", e))?;

        info!(
            order_id = %order.id,
            total = %order.total_price,
            "Order placed"
        );
        telemetry::add_breadcrumb(
            "checkout",
            "Order placed",
            Some(&[("order_id", &order.id.to_string())]),
        );

        let mut uncleared = Vec::new();
        let mut first_error = None;
        for line in &snapshot {
            if let Err(error) = self.cart.remove(line.id).await {
                warn!(line_id = %line.id, error = %error, "Failed to clear cart line after checkout");
                uncleared.push(line.id);
                first_error.get_or_insert(error);
            }
        }

        match first_error {
            None => Ok(order),
            Some(source) => Err(CheckoutError::CartNotCleared {
                order: Box::new(order),
                uncleared,
                source,
            }),
        }
    }
}

/// Build an order draft from cart lines, pricing each item at its snapshot
/// price.
///
/// # Errors
///
/// Returns `EmptyCart` without lines and `MissingDeliveryInfo` when the
/// trimmed address or phone is blank.
pub fn build_draft(lines: &[CartLine], info: &DeliveryInfo) -> Result<OrderDraft, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let address = info.address.trim();
    if address.is_empty() {
        return Err(CheckoutError::MissingDeliveryInfo("address"));
    }
    let phone = info.phone.trim();
    if phone.is_empty() {
        return Err(CheckoutError::MissingDeliveryInfo("phone"));
    }

    Ok(OrderDraft {
        items: lines
            .iter()
            .map(|line| OrderDraftItem {
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.unit_price(),
            })
            .collect(),
        delivery_address: address.to_string(),
        delivery_phone: phone.to_string(),
        delivery_method: info.delivery_method,
        payment_method: info.payment_method,
        notes: info
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::{CategoryId, DeliveryMethod, PaymentMethod, Price, ProductId};

    use super::*;
    use crate::models::Product;

    fn cart_line(product_id: i64, quantity: u32, price_minor: i64) -> CartLine {
        CartLine {
            id: CartLineId::new(product_id * 10),
            product_id: ProductId::new(product_id),
            quantity,
            product: Product {
                id: ProductId::new(product_id),
                name: "Tea".to_string(),
                description: String::new(),
                price: Price::from_minor(price_minor),
                category_id: CategoryId::new(1),
                stock: 5,
                image_url: String::new(),
            },
        }
    }

    fn info() -> DeliveryInfo {
        DeliveryInfo {
            address: " Lenina 1 ".to_string(),
            phone: "+7 900 000 00 00".to_string(),
            delivery_method: DeliveryMethod::Pickup,
            payment_method: PaymentMethod::Card,
            notes: Some("   ".to_string()),
        }
    }

    #[test]
    fn test_build_draft_uses_snapshot_prices() {
        let draft = build_draft(&[cart_line(1, 2, 10_000)], &info()).unwrap();
        assert_eq!(
            draft.items,
            vec![OrderDraftItem {
                product_id: ProductId::new(1),
                quantity: 2,
                price: Price::from_minor(10_000),
            }]
        );
        assert_eq!(draft.delivery_address, "Lenina 1");
        assert_eq!(draft.delivery_method, DeliveryMethod::Pickup);
        assert_eq!(draft.notes, None);
        assert_eq!(draft.total(), Price::from_minor(20_000));
    }

    #[test]
    fn test_build_draft_preconditions() {
        assert!(matches!(
            build_draft(&[], &info()),
            Err(CheckoutError::EmptyCart)
        ));

        let blank_address = DeliveryInfo {
            address: "  ".to_string(),
            ..info()
        };
        assert!(matches!(
            build_draft(&[cart_line(1, 1, 100)], &blank_address),
            Err(CheckoutError::MissingDeliveryInfo("address"))
        ));

        let blank_phone = DeliveryInfo {
            phone: String::new(),
            ..info()
        };
        assert!(matches!(
            build_draft(&[cart_line(1, 1, 100)], &blank_phone),
            Err(CheckoutError::MissingDeliveryInfo("phone"))
        ));
    }

    #[test]
    fn test_draft_json_shape() {
        let draft = build_draft(&[cart_line(4, 2, 10_000)], &info()).unwrap();
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["items"][0]["product_id"], 4);
        assert_eq!(json["items"][0]["quantity"], 2);
        assert_eq!(json["items"][0]["price"], 100.0);
        assert_eq!(json["delivery_method"], "pickup");
        assert_eq!(json["payment_method"], "card");
        assert!(json.get("notes").is_none());
    }
}
