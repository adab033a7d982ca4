//! Favorites list.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use luxus_core::{AddOutcome, FavoriteItem, ProductId, ProductSnapshot, ToggleOutcome, UserId};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use super::LocalCollection;
use crate::auth::{SessionListener, UserStore};
use crate::error::ApiError;
use crate::gateway::{ApiRequest, RequestGateway};
use crate::storage::{KeyValueStore, StorageError, keys};

/// `GET /favorites` response.
#[derive(Debug, Deserialize)]
struct RemoteFavorites {
    #[serde(default)]
    favorites: Vec<RemoteFavorite>,
}

#[derive(Debug, Deserialize)]
struct RemoteFavorite {
    product: ProductSnapshot,
    #[serde(default)]
    created_at: Option<String>,
}

/// Parse the API's timestamps, which may lack an offset (then UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|ts| ts.and_utc())
        })
        .ok()
}

/// The user's favorite products: local-first, mirrored to
/// `luxus-favorites`, synced with `/favorites` while signed in.
pub struct Favorites {
    items: LocalCollection<FavoriteItem>,
    gateway: RequestGateway,
    users: Arc<UserStore>,
}

impl Favorites {
    #[must_use]
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        gateway: RequestGateway,
        users: Arc<UserStore>,
    ) -> Self {
        Self {
            items: LocalCollection::new("favorites", keys::FAVORITES, storage),
            gateway,
            users,
        }
    }

    /// Load the persisted favorites.
    ///
    /// # Errors
    ///
    /// Returns the storage backend's error.
    pub async fn load(&self) -> Result<usize, StorageError> {
        self.items.load().await
    }

    pub async fn items(&self) -> Vec<FavoriteItem> {
        self.items.snapshot().await
    }

    pub async fn contains(&self, id: ProductId) -> bool {
        self.items.contains(id).await
    }

    pub async fn count(&self) -> usize {
        self.items.len().await
    }

    /// Favorite `product`; a product already present is left alone.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add(&self, product: &ProductSnapshot) -> AddOutcome {
        let outcome = self
            .items
            .mutate(|items| {
                if items.iter().any(|item| item.product_id == product.id) {
                    (AddOutcome::AlreadyPresent, false)
                } else {
                    items.push(FavoriteItem::new(product.clone()));
                    (AddOutcome::Added, true)
                }
            })
            .await;

        if outcome == AddOutcome::Added
            && let Some(user) = self.remote_user()
        {
            let gateway = self.gateway.clone();
            let id = product.id;
            self.items
                .spawn_remote("add", async move { remote_add(&gateway, user, id).await });
        }
        outcome
    }

    /// Unfavorite a product. Returns whether it was present.
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
            let gateway = self.gateway.clone();
            self.items
                .spawn_remote("remove", async move { remote_remove(&gateway, user, id).await });
        }
        removed
    }

    /// Add `product` if absent, remove it if present.
    pub async fn toggle(&self, product: &ProductSnapshot) -> ToggleOutcome {
        if self.remove(product.id).await {
            ToggleOutcome::Removed
        } else {
            self.add(product).await;
            ToggleOutcome::Added
        }
    }

    /// Empty the list locally only (logout).
    pub async fn clear_local(&self) {
        self.items.clear_local().await;
    }

    /// Replace local favorites with the server's.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotSignedIn` without a user or when the session
    /// ended during the fetch, otherwise the fetch failure.
    #[instrument(skip(self))]
    pub async fn pull(&self) -> Result<usize, ApiError> {
        let generation = self.items.generation();
        let user = self.remote_user().ok_or(ApiError::NotSignedIn)?;
        let remote = fetch(&self.gateway, user).await?;

        let mut items: Vec<FavoriteItem> = Vec::with_capacity(remote.favorites.len());
        for entry in remote.favorites {
            if items.iter().any(|item| item.product_id == entry.product.id) {
                continue;
            }
            let added_at = entry
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now);
            items.push(FavoriteItem::added_at(entry.product, added_at));
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
        info!(count, "Favorites pulled from server");
        Ok(count)
    }

    /// Make the server's list match the local one: add what is missing
    /// remotely, delete what is no longer local.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotSignedIn` without a user, or the first failure.
    #[instrument(skip(self))]
    pub async fn push(&self) -> Result<(), ApiError> {
        let user = self.remote_user().ok_or(ApiError::NotSignedIn)?;
        let remote: BTreeSet<ProductId> = fetch(&self.gateway, user)
            .await?
            .favorites
            .into_iter()
            .map(|entry| entry.product.id)
            .collect();
        let local: BTreeSet<ProductId> = self
            .items
            .snapshot()
            .await
            .iter()
            .map(|item| item.product_id)
            .collect();

        for id in local.difference(&remote) {
            remote_add(&self.gateway, user, *id).await?;
        }
        for id in remote.difference(&local) {
            remote_remove(&self.gateway, user, *id).await?;
        }

        self.items.mark_clean();
        debug!(
            added = local.difference(&remote).count(),
            removed = remote.difference(&local).count(),
            "Favorites pushed to server"
        );
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

    fn remote_user(&self) -> Option<UserId> {
        if !self.gateway.credentials().is_authenticated() {
            return None;
        }
        self.users.user_id()
    }
}

async fn fetch(gateway: &RequestGateway, user: UserId) -> Result<RemoteFavorites, ApiError> {
    let request = ApiRequest::get("/favorites").with_header("X-User-Id", &user.to_string())?;
    gateway.send_json(request).await
}

/// `409 Conflict` means the server already has it.
async fn remote_add(gateway: &RequestGateway, user: UserId, id: ProductId) -> Result<(), ApiError> {
    let request = ApiRequest::post("/favorites", json!({ "product_id": id }))
        .with_header("X-User-Id", &user.to_string())?;
    match gateway.call(request).await {
        Ok(_) | Err(ApiError::Conflict(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// `404 Not Found` means the server never had it.
async fn remote_remove(
    gateway: &RequestGateway,
    user: UserId,
    id: ProductId,
) -> Result<(), ApiError> {
    let request = ApiRequest::delete(format!("/favorites/{id}"))
        .with_header("X-User-Id", &user.to_string())?;
    match gateway.call(request).await {
        Ok(_) | Err(ApiError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

impl std::fmt::Debug for Favorites {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Favorites")
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionListener for Favorites {
    async fn session_ended(&self) {
        self.clear_local().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::test_support::Harness;

    fn product(id: i32) -> ProductSnapshot {
        ProductSnapshot::new(ProductId::new(id), format!("Peça {id}"), Decimal::from(50))
    }

    fn favorites(harness: &Harness) -> Favorites {
        Favorites::new(
            harness.storage.clone(),
            harness.gateway.clone(),
            harness.users.clone(),
        )
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2025-03-01T12:30:00+00:00").is_some());
        assert!(parse_timestamp("2025-03-01T12:30:00.123456").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[tokio::test]
    async fn test_toggle_guest() {
        let server = MockServer::start().await;
        let harness = Harness::new(&server);
        let favorites = favorites(&harness);

        assert_eq!(favorites.toggle(&product(1)).await, ToggleOutcome::Added);
        assert!(favorites.contains(ProductId::new(1)).await);
        assert_eq!(favorites.add(&product(1)).await, AddOutcome::AlreadyPresent);
        assert_eq!(favorites.toggle(&product(1)).await, ToggleOutcome::Removed);
        assert_eq!(favorites.count().await, 0);
        assert!(!favorites.remove(ProductId::new(1)).await);
    }

    #[tokio::test]
    async fn test_remote_conflict_counts_as_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/favorites"))
            .and(header("x-user-id", "7"))
            .and(body_json(json!({"product_id": 3})))
            .respond_with(
                ResponseTemplate::new(409)
                    .set_body_json(json!({"message": "Produto já está nos favoritos"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let harness = Harness::new(&server);
        harness.sign_in().await;
        let favorites = favorites(&harness);
        favorites.add(&product(3)).await;
        favorites.settle().await;
        assert!(!favorites.is_dirty());
    }

    #[tokio::test]
    async fn test_pull_uses_remote_timestamps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/favorites"))
            .and(header("x-user-id", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "favorites": [
                    {"product_id": 4, "created_at": "2025-01-02T03:04:05", "product": {"id": 4, "titulo": "Lenço", "preco": 25}}
                ],
                "total": 1
            })))
            .mount(&server)
            .await;

        let harness = Harness::new(&server);
        harness.sign_in().await;
        let favorites = favorites(&harness);
        assert_eq!(favorites.pull().await.unwrap(), 1);
        let items = favorites.items().await;
        assert_eq!(items[0].added_at.to_rfc3339(), "2025-01-02T03:04:05+00:00");
    }

    #[tokio::test]
    async fn test_push_adds_missing_and_removes_extra() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/favorites"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "favorites": [{"product_id": 9, "product": {"id": 9, "titulo": "Cinto", "preco": 15}}],
                "total": 1
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/favorites"))
            .and(body_json(json!({"product_id": 2})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": "ok"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/favorites/9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let harness = Harness::new(&server);
        let favorites = favorites(&harness);
        favorites.add(&product(2)).await;

        harness.sign_in().await;
        favorites.mark_dirty();
        favorites.push().await.unwrap();
        assert!(!favorites.is_dirty());
    }
}
