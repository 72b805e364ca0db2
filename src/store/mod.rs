//! Client-side state container.
//!
//! Each slice pairs a plain state struct (mutated only through reducer
//! methods) with a sync service that talks to the backend and the offline
//! cache. [`Store`] owns all of them and is constructed once by the caller.

pub mod cart;
pub mod categories;
pub mod pricing;
pub mod products;
pub mod profile;

use futures::FutureExt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::client::{ApiClient, ApiError, ApiResponse};
use crate::api::retry::{self, RetryPolicy};
use crate::api::types::{Product, UserProfile};
use crate::cache::{
  CacheKey, DataSource, KeyValueStorage, OfflineCache, PreloadReport, PreloadSources,
};
use crate::config::CatalogConfig;

use cart::{CartState, CartSync, QuantityOutcome};
use categories::{CategoryState, CategorySync};
use products::{Highlights, ProductListState, ProductQuery, ProductSync};
use profile::ProfileSync;

/// Errors surfaced to the UI layer
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
  /// Forced offline and nothing cached for this resource
  #[error("No offline data available")]
  OfflineNoData,
  /// Request failed and no cached fallback exists
  #[error("{0}")]
  Network(String),
  /// Refused locally before contacting the server
  #[error("{0}")]
  Rejected(String),
  #[error("No categories available")]
  NoCategories,
}

impl From<ApiError> for SyncError {
  fn from(e: ApiError) -> Self {
    SyncError::Network(e.message)
  }
}

/// Shared read path for the sync services: the API client plus an optional retry policy.
///
/// Only reads are retried; mutations go straight to the client.
pub struct Remote<C: ApiClient> {
  client: Arc<C>,
  retry: Option<RetryPolicy>,
}

impl<C: ApiClient> Remote<C> {
  pub fn new(client: Arc<C>) -> Self {
    Self {
      client,
      retry: None,
    }
  }

  pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
    self.retry = Some(policy);
    self
  }

  pub fn client(&self) -> &C {
    &self.client
  }

  pub fn is_online(&self) -> bool {
    !self.client.is_offline()
  }

  pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
    match self.retry {
      Some(policy) => retry::with_backoff(policy, || self.client.get(path)).await,
      None => self.client.get(path).await,
    }
  }
}

impl<C: ApiClient> Clone for Remote<C> {
  fn clone(&self) -> Self {
    Self {
      client: Arc::clone(&self.client),
      retry: self.retry,
    }
  }
}

/// Resolve a failed read against the cache.
///
/// Offline-blocked reads with nothing cached become [`SyncError::OfflineNoData`];
/// other failures surface the original message.
pub(crate) fn cache_fallback<T>(
  error: ApiError,
  cached: Option<T>,
  resource: &str,
) -> Result<(T, DataSource), SyncError> {
  match (cached, error.offline_blocked) {
    (Some(data), true) => {
      info!(resource, "offline, serving cached data");
      Ok((data, DataSource::Offline))
    }
    (Some(data), false) => {
      warn!(resource, error = %error, "request failed, serving cached data");
      Ok((data, DataSource::Cache))
    }
    (None, true) => Err(SyncError::OfflineNoData),
    (None, false) => {
      warn!(resource, error = %error, "request failed, nothing cached");
      Err(SyncError::from(error))
    }
  }
}

/// Application state container.
pub struct Store<C: ApiClient, S: KeyValueStorage> {
  pub products: ProductListState,
  pub categories: CategoryState,
  pub cart: CartState,
  pub profile: Option<UserProfile>,
  catalog: ProductSync<C, S>,
  category_sync: CategorySync<C, S>,
  cart_sync: CartSync<C, S>,
  profile_sync: ProfileSync<C, S>,
  cache: OfflineCache<S>,
}

impl<C: ApiClient, S: KeyValueStorage> Store<C, S> {
  pub fn new(remote: Remote<C>, cache: OfflineCache<S>, catalog: &CatalogConfig) -> Self {
    Self {
      products: ProductListState::new(catalog.page_size),
      categories: CategoryState::default(),
      cart: CartState::default(),
      profile: None,
      catalog: ProductSync::new(remote.clone(), cache.clone(), catalog.page_size),
      category_sync: CategorySync::new(remote.clone(), cache.clone(), catalog.max_category_pages),
      cart_sync: CartSync::new(remote.clone(), cache.clone()),
      profile_sync: ProfileSync::new(remote, cache.clone()),
      cache,
    }
  }

  /// Fetch a product page and merge it into the list.
  pub async fn load_products(&mut self, query: ProductQuery) -> Result<(), SyncError> {
    let ticket = self.products.begin(&query);
    match self.catalog.fetch_products(&query).await {
      Ok(page) => {
        self.products.fulfill(ticket, page);
        Ok(())
      }
      Err(e) => {
        self.products.reject(ticket, &e);
        Err(e)
      }
    }
  }

  /// Append the next page using the current filters. Returns false when there is none.
  pub async fn load_next_page(&mut self) -> Result<bool, SyncError> {
    let Some(query) = self.products.next_page_query() else {
      return Ok(false);
    };
    self.load_products(query).await?;
    Ok(true)
  }

  pub async fn load_product(&self, id: u64) -> Result<Product, SyncError> {
    self.catalog.fetch_product(id).await
  }

  pub async fn load_highlights(&self) -> Highlights {
    self.catalog.fetch_highlights().await
  }

  pub async fn load_categories(&mut self) -> Result<(), SyncError> {
    self.categories.begin();
    let result = self.category_sync.fetch_categories().await;
    self.categories.settle(&result);
    result.map(|_| ())
  }

  pub async fn load_cart(&mut self) -> Result<(), SyncError> {
    self.cart.loading = true;
    match self.cart_sync.fetch_cart().await {
      Ok((items, source)) => {
        self.cart.replace(items, source);
        Ok(())
      }
      Err(e) => {
        self.cart.loading = false;
        self.cart.error = Some(e.to_string());
        Err(e)
      }
    }
  }

  pub async fn load_profile(&mut self) -> Result<DataSource, SyncError> {
    let (profile, source) = self.profile_sync.fetch_profile().await?;
    self.profile = Some(profile);
    Ok(source)
  }

  pub async fn add_to_cart(
    &mut self,
    product: &Product,
    quantity: f64,
  ) -> Result<QuantityOutcome, SyncError> {
    self.cart_sync.add_to_cart(&mut self.cart, product, quantity).await
  }

  pub async fn set_quantity(
    &mut self,
    item_id: u64,
    quantity: f64,
  ) -> Result<QuantityOutcome, SyncError> {
    self.cart_sync.update_quantity(&mut self.cart, item_id, quantity).await
  }

  pub async fn increment(&mut self, item_id: u64) -> Result<QuantityOutcome, SyncError> {
    self.cart_sync.increment(&mut self.cart, item_id).await
  }

  pub async fn decrement(&mut self, item_id: u64) -> Result<QuantityOutcome, SyncError> {
    self.cart_sync.decrement(&mut self.cart, item_id).await
  }

  pub async fn remove_from_cart(&mut self, item_id: u64) -> Result<QuantityOutcome, SyncError> {
    self.cart_sync.remove_item(&mut self.cart, item_id).await
  }

  /// Fetch products, categories, profile and cart concurrently into the cache.
  pub async fn preload(&self) -> PreloadReport {
    let first_page = ProductQuery::default();
    let sources = PreloadSources {
      products: Some(
        self
          .catalog
          .fetch_remote(&first_page)
          .map(|r| r.map(|(products, _)| products))
          .boxed(),
      ),
      categories: Some(self.category_sync.fetch_remote().boxed()),
      profile: Some(self.profile_sync.fetch_remote().boxed()),
      cart: Some(self.cart_sync.fetch_remote().boxed()),
    };
    self.cache.preload_essential_data(sources).await
  }

  pub fn clear_cache(&self) {
    self.cache.clear();
  }

  pub fn evict(&self, key: CacheKey) {
    self.cache.remove(key);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::MockClient;
  use crate::api::types::{CartItem, Category};
  use crate::cache::{MemoryStorage, PreloadStatus};
  use serde_json::json;

  fn store(client: MockClient) -> Store<MockClient, MemoryStorage> {
    Store::new(
      Remote::new(Arc::new(client)),
      OfflineCache::new(MemoryStorage::new()),
      &CatalogConfig::default(),
    )
  }

  #[tokio::test]
  async fn test_load_products_scenario() {
    let client = MockClient::new();
    client.on(
      "GET",
      "products/",
      Ok(json!({"results": [{"id": 1, "title": "Bread", "price": "2.00"}], "count": 1, "next": null})),
    );
    let mut store = store(client);

    let query = ProductQuery {
      page: Some(1),
      filters: Some(products::ProductFilters {
        category: Some(5),
        ..Default::default()
      }),
      ..Default::default()
    };
    store.load_products(query).await.unwrap();

    assert_eq!(store.products.items.len(), 1);
    assert_eq!(store.products.items[0].id, 1);
    assert_eq!(store.products.pagination.page, 1);
    assert_eq!(store.products.pagination.total, 1);
    assert!(!store.products.pagination.has_next);
    assert_eq!(store.products.filters.category, Some(5));
    assert!(!store.load_next_page().await.unwrap());
  }

  #[tokio::test]
  async fn test_offline_blocked_serves_cached_products() {
    let mut store = store(MockClient::offline());
    store.cache.set(
      CacheKey::Products,
      &json!([{"id": 7, "title": "X", "price": 1.0, "sold_by_weight": false}]),
    );

    store.load_products(ProductQuery::default()).await.unwrap();

    assert_eq!(store.products.items.len(), 1);
    assert_eq!(store.products.items[0].title, "X");
    assert_eq!(store.products.error, None);
    assert_eq!(store.products.source, DataSource::Offline);
  }

  #[tokio::test]
  async fn test_preload_partial_failure() {
    let client = MockClient::new();
    client
      .on("GET", "products/", Ok(json!({"results": [{"id": 1}]})))
      .on("GET", "categories/", Ok(json!({"results": [{"id": 2, "name": "Fruit"}]})))
      .on("GET", "product-categories/", Ok(json!([])))
      .on("GET", "cart/", Ok(json!({"items": []})));
    let store = store(client);

    let report = store.preload().await;

    assert_eq!(report.products, PreloadStatus::Stored);
    assert_eq!(report.categories, PreloadStatus::Stored);
    assert!(matches!(report.profile, PreloadStatus::Failed(_)));
    assert_eq!(report.cart, PreloadStatus::Stored);

    store.evict(CacheKey::Cart);
    assert!(store.cache.get::<Vec<CartItem>>(CacheKey::Cart).is_none());
    assert!(store.cache.get::<Vec<Category>>(CacheKey::Categories).is_some());

    store.clear_cache();
    assert!(store.cache.get::<Vec<Product>>(CacheKey::Products).is_none());
  }

  #[test]
  fn test_cache_fallback_kinds() {
    let offline = cache_fallback::<u8>(ApiError::offline(), None, "x");
    assert_eq!(offline, Err(SyncError::OfflineNoData));

    let failed = cache_fallback::<u8>(ApiError::from_status(500, "<html>boom</html>"), None, "x");
    assert_eq!(failed, Err(SyncError::Network("Server error (500)".to_string())));

    let served = cache_fallback(ApiError::transport("reset"), Some(3u8), "x");
    assert_eq!(served, Ok((3, DataSource::Cache)));
  }
}
