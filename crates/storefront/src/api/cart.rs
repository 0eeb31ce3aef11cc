//! Cart endpoints (not cached - mutable state).

use bazaar_core::{CartLineId, ProductId};
use tracing::instrument;

use super::{ApiClient, ApiError, ApiRequest};
use crate::models::{CartLineInput, CartQuantityUpdate, WireCartLine};

impl ApiClient {
    /// All lines in the signed-in user's cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn cart_lines(&self) -> Result<Vec<WireCartLine>, ApiError> {
        self.get_json("cart/").await
    }

    /// Add `quantity` units of a product. The backend merges into an existing
    /// line for the same product and returns the resulting line.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the product does not exist.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_cart_line(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<WireCartLine, ApiError> {
        let request = ApiRequest::post("cart/").json(&CartLineInput {
            product_id,
            quantity,
        })?;
        self.send(request).await?.json()
    }

    /// Set the quantity of a line.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the line no longer exists.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn update_cart_line(
        &self,
        line_id: CartLineId,
        quantity: u32,
    ) -> Result<WireCartLine, ApiError> {
        let request =
            ApiRequest::put(format!("cart/{line_id}")).json(&CartQuantityUpdate { quantity })?;
        self.send(request).await?.json()
    }

    /// Delete a line.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn delete_cart_line(&self, line_id: CartLineId) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("cart/{line_id}")))
            .await?;
        Ok(())
    }
}
