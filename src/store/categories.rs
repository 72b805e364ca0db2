//! Category slice: paginated primary listing merged with a supplementary one.

use std::collections::HashMap;
use tracing::{debug, warn};

use super::{cache_fallback, Remote, SyncError};
use crate::api::api_types::{ApiCategory, ApiPage};
use crate::api::client::{ApiClient, ApiError};
use crate::api::types::Category;
use crate::cache::{CacheKey, DataSource, KeyValueStorage, OfflineCache};

const PRIMARY_PATH: &str = "categories/";
const SECONDARY_PATH: &str = "product-categories/";

/// Merge two sources by id. Secondary entries replace primary ones in place;
/// secondary-only entries are appended in their own order.
pub fn merge_categories(primary: Vec<Category>, secondary: Vec<Category>) -> Vec<Category> {
  let mut merged: Vec<Category> = Vec::with_capacity(primary.len() + secondary.len());
  let mut index: HashMap<u64, usize> = HashMap::new();

  for category in primary.into_iter().chain(secondary) {
    match index.get(&category.id) {
      Some(&pos) => merged[pos] = category,
      None => {
        index.insert(category.id, merged.len());
        merged.push(category);
      }
    }
  }
  merged
}

pub struct CategorySync<C: ApiClient, S: KeyValueStorage> {
  remote: Remote<C>,
  cache: OfflineCache<S>,
  max_pages: u32,
}

impl<C: ApiClient, S: KeyValueStorage> CategorySync<C, S> {
  pub fn new(remote: Remote<C>, cache: OfflineCache<S>, max_pages: u32) -> Self {
    Self {
      remote,
      cache,
      max_pages,
    }
  }

  /// Walk every page of the primary listing.
  async fn fetch_primary(&self) -> Result<Vec<Category>, ApiError> {
    let mut categories = Vec::new();
    let mut page = 1u32;

    loop {
      let response = self
        .remote
        .get(&format!("{}?page={}", PRIMARY_PATH, page))
        .await?;
      let listing = ApiPage::from_value(response.data);
      categories.extend(listing.records::<ApiCategory>().into_iter().map(Category::from));

      if !listing.has_next() {
        break;
      }
      if page >= self.max_pages {
        warn!(page, "category listing exceeds page limit, stopping");
        break;
      }
      page += 1;
    }

    Ok(categories)
  }

  /// Supplementary listing. Unreachable means empty, not failed.
  async fn fetch_secondary(&self) -> Vec<Category> {
    match self.remote.get(SECONDARY_PATH).await {
      Ok(response) => ApiPage::from_value(response.data)
        .records::<ApiCategory>()
        .into_iter()
        .map(Category::from)
        .collect(),
      Err(e) => {
        warn!(error = %e, "supplementary categories unavailable, using primary only");
        Vec::new()
      }
    }
  }

  /// Both sources merged, straight from the backend.
  pub async fn fetch_remote(&self) -> Result<Vec<Category>, ApiError> {
    let (primary, secondary) = futures::join!(self.fetch_primary(), self.fetch_secondary());
    Ok(merge_categories(primary?, secondary))
  }

  pub async fn fetch_categories(&self) -> Result<(Vec<Category>, DataSource), SyncError> {
    let (categories, source) = match self.fetch_remote().await {
      Ok(categories) => {
        debug!(count = categories.len(), "categories fetched");
        if self.remote.is_online() && !categories.is_empty() {
          self.cache.set(CacheKey::Categories, &categories);
        }
        (categories, DataSource::Network)
      }
      Err(e) => {
        let cached = self.cache.get::<Vec<Category>>(CacheKey::Categories);
        cache_fallback(e, cached, "categories")?
      }
    };

    if categories.is_empty() {
      return Err(SyncError::NoCategories);
    }
    Ok((categories, source))
  }
}

#[derive(Debug, Clone, Default)]
pub struct CategoryState {
  pub items: Vec<Category>,
  pub loading: bool,
  pub error: Option<String>,
  pub source: DataSource,
}

impl CategoryState {
  pub fn begin(&mut self) {
    self.loading = true;
    self.error = None;
  }

  /// Apply a finished fetch. Failures keep whatever was loaded before.
  pub fn settle(&mut self, result: &Result<(Vec<Category>, DataSource), SyncError>) {
    self.loading = false;
    match result {
      Ok((items, source)) => {
        self.items = items.clone();
        self.source = *source;
      }
      Err(e) => self.error = Some(e.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::MockClient;
  use crate::cache::MemoryStorage;
  use serde_json::json;
  use std::sync::Arc;

  fn category_sync(client: MockClient) -> (Arc<MockClient>, CategorySync<MockClient, MemoryStorage>) {
    let client = Arc::new(client);
    let sync = CategorySync::new(
      Remote::new(Arc::clone(&client)),
      OfflineCache::new(MemoryStorage::new()),
      50,
    );
    (client, sync)
  }

  fn category(id: u64, name: &str) -> Category {
    Category {
      id,
      name: name.to_string(),
      ..Category::default()
    }
  }

  #[test]
  fn test_secondary_wins_on_collision() {
    let merged = merge_categories(
      vec![category(1, "Fruit"), category(2, "Veg")],
      vec![category(2, "Vegetables"), category(3, "Dairy")],
    );
    let names: Vec<&str> = merged.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Fruit", "Vegetables", "Dairy"]);
  }

  #[tokio::test]
  async fn test_walks_primary_pages_and_merges() {
    let (client, sync) = category_sync(MockClient::new());
    client
      .on(
        "GET",
        "categories/",
        Ok(json!({"results": [{"id": 1, "name": "Fruit"}], "next": "categories/?page=2"})),
      )
      .on(
        "GET",
        "categories/",
        Ok(json!({"results": [{"id": 2, "name": "Veg"}], "next": null})),
      )
      .on("GET", "product-categories/", Ok(json!([{"id": 2, "name": "Greens"}])));

    let (categories, source) = sync.fetch_categories().await.unwrap();

    assert_eq!(source, DataSource::Network);
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[1].name, "Greens");
    assert!(client.calls().contains(&"GET categories/?page=2".to_string()));
  }

  #[tokio::test]
  async fn test_missing_secondary_is_not_an_error() {
    let (client, sync) = category_sync(MockClient::new());
    client.on("GET", "categories/", Ok(json!({"results": [{"id": 1, "name": "Fruit"}]})));

    let (categories, _) = sync.fetch_categories().await.unwrap();
    assert_eq!(categories, vec![category(1, "Fruit")]);
  }

  #[tokio::test]
  async fn test_zero_results_is_distinct() {
    let (client, sync) = category_sync(MockClient::new());
    client
      .on("GET", "categories/", Ok(json!({"results": []})))
      .on("GET", "product-categories/", Ok(json!([])));

    assert_eq!(sync.fetch_categories().await, Err(SyncError::NoCategories));
  }

  #[tokio::test]
  async fn test_offline_serves_cache() {
    let (_, sync) = category_sync(MockClient::offline());
    assert_eq!(sync.fetch_categories().await, Err(SyncError::OfflineNoData));

    sync.cache.set(CacheKey::Categories, &vec![category(5, "Bakery")]);
    let (categories, source) = sync.fetch_categories().await.unwrap();
    assert_eq!(source, DataSource::Offline);
    assert_eq!(categories[0].name, "Bakery");
  }

  #[test]
  fn test_settle_keeps_items_on_failure() {
    let mut state = CategoryState::default();
    state.begin();
    state.settle(&Ok((vec![category(1, "Fruit")], DataSource::Network)));
    state.begin();
    state.settle(&Err(SyncError::NoCategories));

    assert_eq!(state.items.len(), 1);
    assert_eq!(state.error.as_deref(), Some("No categories available"));
    assert!(!state.loading);
  }
}
