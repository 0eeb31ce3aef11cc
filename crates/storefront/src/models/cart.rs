//! Cart wire models for the `/cart/` endpoints.

use bazaar_core::{CartLineId, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// A cart line exactly as the backend returns it (no product snapshot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCartLine {
    pub id: CartLineId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body for `POST /cart/`. The backend merges into an existing line.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CartLineInput {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body for `PUT /cart/{id}`: the new absolute quantity.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CartQuantityUpdate {
    pub quantity: u32,
}
