//! Order models: drafts submitted at checkout and orders read back.

use bazaar_core::{DeliveryMethod, OrderId, OrderStatus, PaymentMethod, Price, ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery and payment choices entered at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryInfo {
    pub address: String,
    pub phone: String,
    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

/// One line of an order submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderDraftItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Price,
}

/// The body of `POST /orders/`, assembled from a cart snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDraft {
    pub items: Vec<OrderDraftItem>,
    pub delivery_address: String,
    pub delivery_phone: String,
    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl OrderDraft {
    /// Sum of line totals at snapshot prices.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items.iter().map(|i| i.price.times(i.quantity)).sum()
    }
}

/// A line of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

/// A placed order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub status: OrderStatus,
    pub total_price: Price,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    pub delivery_address: String,
    pub delivery_phone: String,
    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Order number for display, falling back to the numeric ID.
    #[must_use]
    pub fn display_number(&self) -> String {
        self.order_number
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// An order in a list view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: OrderId,
    #[serde(default)]
    pub order_number: Option<String>,
    pub status: OrderStatus,
    pub total_price: Price,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items_count: Option<u32>,
}

/// Paging and status filter for order listings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

/// Back-office order counters from `GET /orders/admin/statistics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatistics {
    pub total_orders: u64,
    pub pending_orders: u64,
    pub delivered_orders: u64,
    pub total_revenue: Price,
}

/// The backend emits naive timestamps (implicitly UTC); newer deployments
/// send RFC 3339. Both are accepted.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, de::Error};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(D::Error::custom)
    }
}
