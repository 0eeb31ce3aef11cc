//! Customer order endpoints.

use bazaar_core::OrderId;
use tracing::instrument;

use super::{ApiClient, ApiError, ApiRequest};
use crate::models::{Order, OrderDraft, OrderListQuery, OrderSummary};

impl ApiClient {
    /// Submit an order.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` if the backend rejects the draft.
    #[instrument(skip(self, draft), fields(items = draft.items.len()))]
    pub async fn create_order(&self, draft: &OrderDraft) -> Result<Order, ApiError> {
        self.send(ApiRequest::post("orders/").json(draft)?)
            .await?
            .json()
    }

    /// The signed-in user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn my_orders(&self, query: &OrderListQuery) -> Result<Vec<OrderSummary>, ApiError> {
        self.send(ApiRequest::get("orders/my").query(query)?)
            .await?
            .json()
    }

    /// One of the signed-in user's orders.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for unknown ids and `ApiError::Forbidden`
    /// for orders of other users.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn my_order(&self, id: OrderId) -> Result<Order, ApiError> {
        self.get_json(&format!("orders/my/{id}")).await
    }
}
