//! Shopping cart.

use std::sync::Arc;

use async_trait::async_trait;
use luxus_core::{
    AddOutcome, CartPolicy, CartSummary, LineItem, ProductId, ProductSnapshot, ShippingRule,
    UserId,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use super::LocalCollection;
use crate::auth::{SessionListener, UserStore};
use crate::error::ApiError;
use crate::gateway::{ApiRequest, RequestGateway};
use crate::storage::{KeyValueStore, StorageError, keys};

/// `GET /cart/{user}` response.
#[derive(Debug, Deserialize)]
struct RemoteCart {
    #[serde(default)]
    items: Vec<RemoteCartItem>,
}

#[derive(Debug, Deserialize)]
struct RemoteCartItem {
    #[serde(default = "one")]
    quantity: u32,
    product: ProductSnapshot,
}

const fn one() -> u32 {
    1
}

/// The user's cart: local-first, mirrored to `luxus-cart`, synced with
/// `/cart/{user}` while signed in.
pub struct Cart {
    items: LocalCollection<LineItem>,
    policy: CartPolicy,
    shipping: ShippingRule,
    gateway: RequestGateway,
    users: Arc<UserStore>,
}

impl Cart {
    #[must_use]
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        gateway: RequestGateway,
        users: Arc<UserStore>,
        policy: CartPolicy,
        shipping: ShippingRule,
    ) -> Self {
        Self {
            items: LocalCollection::new("cart", keys::CART, storage),
            policy,
            shipping,
            gateway,
            users,
        }
    }

    /// Load the persisted cart.
    ///
    /// # Errors
    ///
    /// Returns the storage backend's error.
    pub async fn load(&self) -> Result<usize, StorageError> {
        self.items.load().await
    }

    #[must_use]
    pub const fn policy(&self) -> CartPolicy {
        self.policy
    }

    pub async fn items(&self) -> Vec<LineItem> {
        self.items.snapshot().await
    }

    /// Add one unit of `product`.
    ///
    /// Under [`CartPolicy::UniquePieces`] a product already in the cart is
    /// left alone and `AlreadyPresent` is returned.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add(&self, product: &ProductSnapshot) -> AddOutcome {
        let policy = self.policy;
        let outcome = self
            .items
            .mutate(|items| {
                match items.iter_mut().find(|item| item.product_id == product.id) {
                    Some(_) if policy == CartPolicy::UniquePieces => (AddOutcome::AlreadyPresent, false),
                    Some(item) => {
                        item.quantity = item.quantity.saturating_add(1);
                        (AddOutcome::QuantityIncreased(item.quantity), true)
                    }
                    None => {
                        items.push(LineItem::from_product(product));
                        (AddOutcome::Added, true)
                    }
                }
            })
            .await;

        debug!(?outcome, "Cart add");
        if !outcome.already_present()
            && let Some(user) = self.remote_user()
        {
            let request = ApiRequest::post(
                format!("/cart/{user}/add"),
                json!({"product_id": product.id, "quantity": 1}),
            );
            self.spawn_call("add", request);
        }
        outcome
    }

    /// Remove a product. Returns whether it was in the cart.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn remove(&self, id: ProductId) -> bool {
        let removed = self
            .items
            .mutate(|items| {
                let before = items.len();
                items.retain(|item| item.product_id != id);
                let removed = items.len() != before;
                (removed, removed)
            })
            .await;

        if removed && let Some(user) = self.remote_user() {
            let request =
                ApiRequest::post(format!("/cart/{user}/remove"), json!({"product_id": id}));
            let gateway = self.gateway.clone();
            self.items.spawn_remote("remove", async move {
                match gateway.call(request).await {
                    Ok(_) | Err(ApiError::NotFound(_)) => Ok(()),
                    Err(e) => Err(e),
                }
            });
        }
        removed
    }

    /// Set a line's quantity; `0` removes the line.
    ///
    /// Returns whether the product was in the cart.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` (field `quantity`) for a quantity above
    /// 1 in a unique-pieces cart.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn update_quantity(&self, id: ProductId, quantity: u32) -> Result<bool, ApiError> {
        if quantity == 0 {
            return Ok(self.remove(id).await);
        }
        if self.policy == CartPolicy::UniquePieces && quantity > 1 {
            return Err(ApiError::validation(
                "quantity",
                "Cada peça é única: a quantidade máxima é 1",
            ));
        }

        let changed = self
            .items
            .mutate(|items| {
                items
                    .iter_mut()
                    .find(|item| item.product_id == id)
                    .map_or((None, false), |item| {
                        let changed = item.quantity != quantity;
                        item.quantity = quantity;
                        (Some(changed), changed)
                    })
            })
            .await;

        if changed == Some(true)
            && let Some(user) = self.remote_user()
        {
            let request = ApiRequest::put(
                format!("/cart/{user}/update"),
                json!({"product_id": id, "quantity": quantity}),
            );
            self.spawn_call("update", request);
        }
        Ok(changed.is_some())
    }

    /// Empty the cart here and, when signed in, on the server.
    #[instrument(skip(self))]
    pub async fn clear(&self) {
        self.items.clear_local().await;
        if let Some(user) = self.remote_user() {
            self.spawn_call("clear", ApiRequest::delete(format!("/cart/{user}/clear")));
        }
    }

    /// Empty the cart locally only (logout).
    pub async fn clear_local(&self) {
        self.items.clear_local().await;
    }

    pub async fn contains(&self, id: ProductId) -> bool {
        self.items.contains(id).await
    }

    /// Units of `id` in the cart (0 when absent).
    pub async fn quantity_of(&self, id: ProductId) -> u32 {
        self.items.find(id).await.map_or(0, |item| item.quantity)
    }

    pub async fn is_empty(&self) -> bool {
        self.items.is_empty().await
    }

    /// Total units.
    pub async fn count(&self) -> u32 {
        self.summary().await.count
    }

    pub async fn subtotal(&self) -> Decimal {
        self.summary().await.subtotal
    }

    /// Flat fee below the free-shipping threshold, zero at or above it.
    pub async fn shipping_cost(&self) -> Decimal {
        self.summary().await.shipping
    }

    /// Subtotal plus shipping.
    pub async fn total(&self) -> Decimal {
        self.summary().await.total
    }

    pub async fn summary(&self) -> CartSummary {
        let items = self.items.snapshot().await;
        CartSummary::from_items(&items, &self.shipping)
    }

    /// Replace the local cart with the server's.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotSignedIn` without a user or when the session
    /// ended during the fetch, otherwise the fetch failure.
    #[instrument(skip(self))]
    pub async fn pull(&self) -> Result<usize, ApiError> {
        let generation = self.items.generation();
        let user = self.remote_user().ok_or(ApiError::NotSignedIn)?;
        let remote: RemoteCart = self.gateway.get_json(&format!("/cart/{user}")).await?;

        let mut items: Vec<LineItem> = Vec::with_capacity(remote.items.len());
        for entry in remote.items {
            let mut item = LineItem::from_product(&entry.product);
            item.quantity = match self.policy {
                CartPolicy::UniquePieces => 1,
                CartPolicy::Stocked => entry.quantity.max(1),
            };
            if !items.iter().any(|existing| existing.product_id == item.product_id) {
                items.push(item);
            }
        }

        let count = items.len();
        if !self.items.replace_if_generation(generation, items).await {
            if self.remote_user().is_none() {
                return Err(ApiError::NotSignedIn);
            }
            // Local edits made during the fetch win; push them next sync.
            self.items.mark_dirty();
            return Ok(self.items.len().await);
        }
        info!(count, "Cart pulled from server");
        Ok(count)
    }

    /// Overwrite the server's cart with the local one.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotSignedIn` without a user, or the sync failure.
    #[instrument(skip(self))]
    pub async fn push(&self) -> Result<(), ApiError> {
        let user = self.remote_user().ok_or(ApiError::NotSignedIn)?;
        let items: Vec<_> = self
            .items
            .snapshot()
            .await
            .iter()
            .map(|item| json!({"product_id": item.product_id, "quantity": item.quantity}))
            .collect();

        self.gateway
            .call(ApiRequest::post(
                format!("/cart/{user}/sync"),
                json!({ "items": items }),
            ))
            .await?;
        self.items.mark_clean();
        debug!(count = items.len(), "Cart pushed to server");
        Ok(())
    }

    /// Wait for background remote calls.
    pub async fn settle(&self) {
        self.items.settle().await;
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.items.is_dirty()
    }

    pub fn mark_dirty(&self) {
        self.items.mark_dirty();
    }

    /// The user whose remote cart mirrors this one, if signed in.
    fn remote_user(&self) -> Option<UserId> {
        if !self.gateway.credentials().is_authenticated() {
            return None;
        }
        self.users.user_id()
    }

    fn spawn_call(&self, operation: &'static str, request: ApiRequest) {
        let gateway = self.gateway.clone();
        self.items.spawn_remote(operation, async move {
            gateway.call(request).await.map(|_| ())
        });
    }
}

impl std::fmt::Debug for Cart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cart")
            .field("policy", &self.policy)
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionListener for Cart {
    async fn session_ended(&self) {
        self.clear_local().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::test_support::Harness;

    fn product(id: i32, price: Decimal) -> ProductSnapshot {
        ProductSnapshot::new(ProductId::new(id), format!("Peça {id}"), price)
    }

    fn cart(harness: &Harness, policy: CartPolicy) -> Cart {
        Cart::new(
            harness.storage.clone(),
            harness.gateway.clone(),
            harness.users.clone(),
            policy,
            ShippingRule::default(),
        )
    }

    async fn no_remote_calls() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_guest_cart_is_local_only() {
        let server = no_remote_calls().await;
        let harness = Harness::new(&server);
        let cart = cart(&harness, CartPolicy::UniquePieces);

        assert_eq!(cart.add(&product(42, Decimal::from(100))).await, AddOutcome::Added);
        assert_eq!(
            cart.add(&product(42, Decimal::from(100))).await,
            AddOutcome::AlreadyPresent
        );
        cart.settle().await;

        assert_eq!(cart.items().await.len(), 1);
        assert_eq!(cart.total().await, Decimal::from(115));
        assert!(harness.storage.get(keys::CART).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let server = no_remote_calls().await;
        let harness = Harness::new(&server);
        let cart = cart(&harness, CartPolicy::UniquePieces);
        cart.add(&product(1, Decimal::from(10))).await;

        assert!(!cart.remove(ProductId::new(99)).await);
        assert_eq!(cart.items().await.len(), 1);
        assert!(cart.remove(ProductId::new(1)).await);
        assert!(cart.is_empty().await);
    }

    #[tokio::test]
    async fn test_shipping_threshold_is_inclusive() {
        let server = no_remote_calls().await;
        let harness = Harness::new(&server);

        let at_threshold = cart(&harness, CartPolicy::UniquePieces);
        at_threshold.add(&product(1, Decimal::new(15000, 2))).await;
        assert_eq!(at_threshold.shipping_cost().await, Decimal::ZERO);

        at_threshold.clear_local().await;
        at_threshold.add(&product(2, Decimal::new(14999, 2))).await;
        assert_eq!(at_threshold.shipping_cost().await, Decimal::from(15));
    }

    #[tokio::test]
    async fn test_stocked_cart_counts_units() {
        let server = no_remote_calls().await;
        let harness = Harness::new(&server);
        let cart = cart(&harness, CartPolicy::Stocked);
        let blouse = product(5, Decimal::from(40));

        cart.add(&blouse).await;
        assert_eq!(cart.add(&blouse).await, AddOutcome::QuantityIncreased(2));
        assert!(cart.update_quantity(ProductId::new(5), 4).await.unwrap());
        assert_eq!(cart.quantity_of(ProductId::new(5)).await, 4);
        assert_eq!(cart.count().await, 4);
        assert_eq!(cart.subtotal().await, Decimal::from(160));
        assert_eq!(cart.shipping_cost().await, Decimal::ZERO);

        assert!(cart.update_quantity(ProductId::new(5), 0).await.unwrap());
        assert!(!cart.contains(ProductId::new(5)).await);
        assert!(!cart.update_quantity(ProductId::new(5), 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_unique_cart_rejects_quantities() {
        let server = no_remote_calls().await;
        let harness = Harness::new(&server);
        let cart = cart(&harness, CartPolicy::UniquePieces);
        cart.add(&product(5, Decimal::from(40))).await;

        let err = cart
            .update_quantity(ProductId::new(5), 2)
            .await
            .unwrap_err();
        assert!(err.field_errors().contains_key("quantity"));
        assert_eq!(cart.quantity_of(ProductId::new(5)).await, 1);
    }

    #[tokio::test]
    async fn test_signed_in_add_calls_remote() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cart/7/add"))
            .and(header("authorization", "Bearer access-0"))
            .and(body_json(json!({"product_id": 42, "quantity": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let harness = Harness::new(&server);
        harness.sign_in().await;
        let cart = cart(&harness, CartPolicy::UniquePieces);
        cart.add(&product(42, Decimal::from(100))).await;
        cart.add(&product(42, Decimal::from(100))).await;
        cart.settle().await;
        assert!(!cart.is_dirty());
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_item_and_marks_dirty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cart/7/add"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let harness = Harness::new(&server);
        harness.sign_in().await;
        let cart = cart(&harness, CartPolicy::UniquePieces);
        cart.add(&product(42, Decimal::from(100))).await;
        cart.settle().await;

        assert!(cart.contains(ProductId::new(42)).await);
        assert!(cart.is_dirty());
    }

    #[tokio::test]
    async fn test_pull_replaces_local_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cart/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user_id": 7,
                "items": [
                    {"product_id": 8, "quantity": 3, "product": {"id": 8, "titulo": "Casaco", "preco": 120.5}},
                    {"product_id": 9, "product": {"id": 9, "titulo": "Bolsa", "preco": "60"}}
                ]
            })))
            .mount(&server)
            .await;

        let harness = Harness::new(&server);
        harness.sign_in().await;
        let cart = cart(&harness, CartPolicy::UniquePieces);
        cart.items
            .mutate(|items| {
                items.push(LineItem::from_product(&product(1, Decimal::from(10))));
                ((), true)
            })
            .await;
        cart.mark_dirty();

        assert_eq!(cart.pull().await.unwrap(), 2);
        assert!(!cart.contains(ProductId::new(1)).await);
        assert_eq!(cart.quantity_of(ProductId::new(8)).await, 1);
        assert_eq!(cart.subtotal().await, Decimal::new(1805, 1));
        assert!(!cart.is_dirty());
    }

    #[tokio::test]
    async fn test_push_sends_sync() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cart/7/sync"))
            .and(body_json(json!({"items": [{"product_id": 3, "quantity": 1}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let harness = Harness::new(&server);
        let cart = cart(&harness, CartPolicy::UniquePieces);
        cart.add(&product(3, Decimal::from(30))).await;
        assert!(matches!(cart.push().await, Err(ApiError::NotSignedIn)));

        harness.sign_in().await;
        cart.mark_dirty();
        cart.push().await.unwrap();
        assert!(!cart.is_dirty());
    }
}
