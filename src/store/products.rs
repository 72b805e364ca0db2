//! Product list slice: paginated, filtered, searchable listing with cache fallback.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};
use url::form_urlencoded;

use super::{cache_fallback, Remote, SyncError};
use crate::api::api_types::{ApiPage, ApiProduct};
use crate::api::client::{ApiClient, ApiError};
use crate::api::types::{PageMeta, Product};
use crate::cache::{CacheKey, DataSource, KeyValueStorage, OfflineCache};

/// Listing filters. Only set values reach the query string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFilters {
  pub category: Option<u64>,
  pub brand: Option<String>,
  pub min_price: Option<f64>,
  pub max_price: Option<f64>,
  pub in_stock: Option<bool>,
}

impl ProductFilters {
  fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(category) = self.category {
      pairs.push(("category", category.to_string()));
    }
    if let Some(brand) = self.brand.as_deref().filter(|b| !b.is_empty()) {
      pairs.push(("brand", brand.to_string()));
    }
    if let Some(min) = self.min_price {
      pairs.push(("min_price", min.to_string()));
    }
    if let Some(max) = self.max_price {
      pairs.push(("max_price", max.to_string()));
    }
    if let Some(in_stock) = self.in_stock {
      pairs.push(("in_stock", in_stock.to_string()));
    }
    pairs
  }
}

/// Input of a product fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductQuery {
  pub page: Option<u32>,
  pub search: Option<String>,
  pub filters: Option<ProductFilters>,
  /// Append to the current list instead of replacing it
  pub append: bool,
}

/// Result of a product fetch, before it is merged into state
#[derive(Debug, Clone)]
pub struct ProductPage {
  pub results: Vec<Product>,
  /// None when served from cache
  pub pagination: Option<PageMeta>,
  pub append: bool,
  pub source: DataSource,
}

/// Build the listing path: `products/?page=..&page_size=..&search=..&<filters>`.
pub fn products_path(query: &ProductQuery, page_size: u32) -> String {
  let mut params = form_urlencoded::Serializer::new(String::new());
  params.append_pair("page", &query.page.unwrap_or(1).to_string());
  params.append_pair("page_size", &page_size.to_string());
  if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
    params.append_pair("search", search);
  }
  if let Some(filters) = &query.filters {
    for (name, value) in filters.query_pairs() {
      params.append_pair(name, &value);
    }
  }
  format!("products/?{}", params.finish())
}

/// Network side of the product slice
pub struct ProductSync<C: ApiClient, S: KeyValueStorage> {
  remote: Remote<C>,
  cache: OfflineCache<S>,
  page_size: u32,
}

impl<C: ApiClient, S: KeyValueStorage> ProductSync<C, S> {
  pub fn new(remote: Remote<C>, cache: OfflineCache<S>, page_size: u32) -> Self {
    Self {
      remote,
      cache,
      page_size,
    }
  }

  /// Fetch one page from the backend, no cache involved.
  pub async fn fetch_remote(
    &self,
    query: &ProductQuery,
  ) -> Result<(Vec<Product>, PageMeta), ApiError> {
    let path = products_path(query, self.page_size);
    let response = self.remote.get(&path).await?;
    debug!(status = response.status, path = %path, "product page received");
    let page = ApiPage::from_value(response.data);
    let products = page
      .records::<ApiProduct>()
      .into_iter()
      .map(Product::from)
      .collect();
    Ok((products, page.meta()))
  }

  /// Fetch a page with write-through on success and read-through on failure.
  pub async fn fetch_products(&self, query: &ProductQuery) -> Result<ProductPage, SyncError> {
    match self.fetch_remote(query).await {
      Ok((results, meta)) => {
        debug!(count = results.len(), page = ?meta.page, "products fetched");
        if self.remote.is_online() {
          self.cache.set(CacheKey::Products, &results);
        }
        Ok(ProductPage {
          results,
          pagination: Some(meta),
          append: query.append,
          source: DataSource::Network,
        })
      }
      Err(e) => {
        let cached = self.cache.get::<Vec<Product>>(CacheKey::Products);
        let (results, source) = cache_fallback(e, cached, "products")?;
        Ok(ProductPage {
          results,
          pagination: None,
          append: query.append,
          source,
        })
      }
    }
  }

  /// Single product detail. Falls back to the cached listing.
  pub async fn fetch_product(&self, id: u64) -> Result<Product, SyncError> {
    match self.remote.get(&format!("products/{}/", id)).await {
      Ok(response) => ApiProduct::deserialize(&response.data)
        .map(Product::from)
        .map_err(|e| SyncError::Network(format!("Unexpected product payload: {}", e))),
      Err(e) => {
        let cached = self
          .cache
          .get::<Vec<Product>>(CacheKey::Products)
          .and_then(|list| list.into_iter().find(|p| p.id == id));
        cache_fallback(e, cached, "product").map(|(product, _)| product)
      }
    }
  }

  /// Featured, newest, best-selling and discounted listings, fetched concurrently.
  /// Each list succeeds or fails on its own.
  pub async fn fetch_highlights(&self) -> Highlights {
    let (featured, new_arrivals, best_sellers, on_sale) = futures::join!(
      self.fetch_listing("featured", "true"),
      self.fetch_listing("ordering", "-created_at"),
      self.fetch_listing("ordering", "-sales_count"),
      self.fetch_listing("on_sale", "true"),
    );
    Highlights {
      featured,
      new_arrivals,
      best_sellers,
      on_sale,
    }
  }

  async fn fetch_listing(&self, key: &str, value: &str) -> Result<Vec<Product>, SyncError> {
    let path = format!(
      "products/?{}",
      form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value)
        .append_pair("page_size", "10")
        .finish()
    );
    let response = self.remote.get(&path).await?;
    Ok(
      ApiPage::from_value(response.data)
        .records::<ApiProduct>()
        .into_iter()
        .map(Product::from)
        .collect(),
    )
  }
}

#[derive(Debug)]
pub struct Highlights {
  pub featured: Result<Vec<Product>, SyncError>,
  pub new_arrivals: Result<Vec<Product>, SyncError>,
  pub best_sellers: Result<Vec<Product>, SyncError>,
  pub on_sale: Result<Vec<Product>, SyncError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pagination {
  pub page: u32,
  pub page_size: u32,
  pub total: u64,
  pub has_next: bool,
}

/// Identifies one in-flight fetch. Results carrying an older ticket than the
/// latest issued one are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
  seq: u64,
  requested_page: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ProductListState {
  pub items: Vec<Product>,
  pub pagination: Pagination,
  pub filters: ProductFilters,
  pub search_query: String,
  pub loading: bool,
  pub error: Option<String>,
  pub source: DataSource,
  latest_request: u64,
}

impl ProductListState {
  pub fn new(page_size: u32) -> Self {
    Self {
      items: Vec::new(),
      pagination: Pagination {
        page: 0,
        page_size,
        total: 0,
        has_next: false,
      },
      filters: ProductFilters::default(),
      search_query: String::new(),
      loading: false,
      error: None,
      source: DataSource::Network,
      latest_request: 0,
    }
  }

  /// Mark a fetch as started. A replacing fetch also adopts the query's filters and search.
  pub fn begin(&mut self, query: &ProductQuery) -> RequestTicket {
    self.latest_request += 1;
    self.loading = true;
    self.error = None;
    if !query.append {
      self.filters = query.filters.clone().unwrap_or_default();
      self.search_query = query.search.clone().unwrap_or_default();
    }
    RequestTicket {
      seq: self.latest_request,
      requested_page: query.page,
    }
  }

  fn is_current(&self, ticket: RequestTicket) -> bool {
    if ticket.seq < self.latest_request {
      info!(
        ticket = ticket.seq,
        latest = self.latest_request,
        "discarding superseded product result"
      );
      return false;
    }
    true
  }

  /// Merge a fetched page. Returns false if the result was superseded.
  pub fn fulfill(&mut self, ticket: RequestTicket, page: ProductPage) -> bool {
    if !self.is_current(ticket) {
      return false;
    }

    let previous_page = self.pagination.page;
    self.merge(page.results, page.append);

    let fallback_page = if page.append {
      previous_page + 1
    } else {
      ticket.requested_page.unwrap_or(1)
    };
    self.pagination = match page.pagination {
      Some(meta) => Pagination {
        page: meta.page.unwrap_or(fallback_page),
        page_size: meta.page_size.unwrap_or(self.pagination.page_size),
        total: meta.total.unwrap_or(self.items.len() as u64),
        has_next: meta.has_next,
      },
      None => Pagination {
        page: if page.append { previous_page.max(1) } else { fallback_page },
        page_size: self.pagination.page_size,
        total: self.items.len() as u64,
        has_next: false,
      },
    };

    self.loading = false;
    self.error = None;
    self.source = page.source;
    true
  }

  pub fn reject(&mut self, ticket: RequestTicket, error: &SyncError) -> bool {
    if !self.is_current(ticket) {
      return false;
    }
    self.loading = false;
    self.error = Some(error.to_string());
    true
  }

  /// Append or replace. Either way ids stay unique; the first occurrence wins.
  pub fn merge(&mut self, incoming: Vec<Product>, append: bool) {
    if !append {
      self.items.clear();
    }
    let mut seen: HashSet<u64> = self.items.iter().map(|p| p.id).collect();
    self
      .items
      .extend(incoming.into_iter().filter(|p| seen.insert(p.id)));
  }

  /// Query for the page after the current one, if the backend reported one.
  pub fn next_page_query(&self) -> Option<ProductQuery> {
    if !self.pagination.has_next || self.loading {
      return None;
    }
    Some(ProductQuery {
      page: Some(self.pagination.page + 1),
      search: Some(self.search_query.clone()).filter(|s| !s.is_empty()),
      filters: Some(self.filters.clone()),
      append: true,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::MockClient;
  use crate::cache::MemoryStorage;
  use serde_json::json;
  use std::sync::Arc;

  fn product(id: u64) -> Product {
    Product {
      id,
      title: format!("P{}", id),
      ..Product::default()
    }
  }

  fn page(ids: &[u64], has_next: bool, append: bool) -> ProductPage {
    ProductPage {
      results: ids.iter().copied().map(product).collect(),
      pagination: Some(PageMeta {
        page: None,
        page_size: None,
        total: Some(100),
        has_next,
      }),
      append,
      source: DataSource::Network,
    }
  }

  fn product_sync(client: MockClient) -> (Arc<MockClient>, ProductSync<MockClient, MemoryStorage>) {
    let client = Arc::new(client);
    let sync = ProductSync::new(
      Remote::new(Arc::clone(&client)),
      OfflineCache::new(MemoryStorage::new()),
      20,
    );
    (client, sync)
  }

  #[test]
  fn test_path_includes_only_set_filters() {
    let query = ProductQuery {
      page: Some(2),
      search: Some(" red apple ".to_string()),
      filters: Some(ProductFilters {
        category: Some(5),
        in_stock: Some(true),
        ..Default::default()
      }),
      append: false,
    };
    assert_eq!(
      products_path(&query, 20),
      "products/?page=2&page_size=20&search=red+apple&category=5&in_stock=true"
    );
    assert_eq!(
      products_path(&ProductQuery::default(), 10),
      "products/?page=1&page_size=10"
    );
  }

  #[test]
  fn test_append_overlapping_page_does_not_duplicate() {
    let mut state = ProductListState::new(20);
    let t1 = state.begin(&ProductQuery::default());
    state.fulfill(t1, page(&[1, 2, 3], true, false));

    let t2 = state.begin(&ProductQuery {
      append: true,
      ..Default::default()
    });
    state.fulfill(t2, page(&[3, 4, 5], true, true));

    let ids: Vec<u64> = state.items.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(state.pagination.page, 2);

    // retrying the same page changes nothing
    let t3 = state.begin(&ProductQuery {
      append: true,
      ..Default::default()
    });
    state.fulfill(t3, page(&[3, 4, 5], false, true));
    assert_eq!(state.items.len(), 5);
    assert!(!state.pagination.has_next);
  }

  #[test]
  fn test_replace_resets_list() {
    let mut state = ProductListState::new(20);
    state.merge(vec![product(1), product(2)], false);
    let ticket = state.begin(&ProductQuery {
      search: Some("milk".to_string()),
      ..Default::default()
    });
    state.fulfill(ticket, page(&[9], false, false));

    assert_eq!(state.items, vec![product(9)]);
    assert_eq!(state.search_query, "milk");
    assert_eq!(state.pagination.page, 1);
  }

  #[test]
  fn test_replace_drops_repeated_ids() {
    let mut state = ProductListState::new(20);
    state.merge(vec![product(1), product(2)], false);
    state.merge(vec![product(3), product(4), product(3)], false);

    let ids: Vec<u64> = state.items.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![3, 4]);
  }

  #[test]
  fn test_superseded_result_is_discarded() {
    let mut state = ProductListState::new(20);
    let slow = state.begin(&ProductQuery::default());
    let fast = state.begin(&ProductQuery {
      filters: Some(ProductFilters {
        brand: Some("Acme".to_string()),
        ..Default::default()
      }),
      ..Default::default()
    });

    assert!(state.fulfill(fast, page(&[2], false, false)));
    assert!(!state.fulfill(slow, page(&[1], false, false)));
    assert!(!state.reject(slow, &SyncError::Network("late".to_string())));

    assert_eq!(state.items, vec![product(2)]);
    assert_eq!(state.error, None);
  }

  #[test]
  fn test_next_page_query_keeps_filters() {
    let mut state = ProductListState::new(20);
    let query = ProductQuery {
      page: Some(1),
      search: Some("tea".to_string()),
      filters: Some(ProductFilters {
        category: Some(3),
        ..Default::default()
      }),
      append: false,
    };
    let ticket = state.begin(&query);
    state.fulfill(ticket, page(&[1], true, false));

    let next = state.next_page_query().unwrap();
    assert_eq!(next.page, Some(2));
    assert!(next.append);
    assert_eq!(next.search.as_deref(), Some("tea"));
    assert_eq!(next.filters.unwrap().category, Some(3));
  }

  #[tokio::test]
  async fn test_network_success_writes_through() {
    let (client, sync) = product_sync(MockClient::new());
    client.on(
      "GET",
      "products/",
      Ok(json!({"results": [{"id": 1, "title": "A", "price": 3}], "count": 1, "next": null})),
    );

    let page = sync.fetch_products(&ProductQuery::default()).await.unwrap();

    assert_eq!(page.source, DataSource::Network);
    assert_eq!(page.pagination.unwrap().total, Some(1));
    let cached: Vec<Product> = sync.cache.get(CacheKey::Products).unwrap();
    assert_eq!(cached[0].title, "A");
  }

  #[tokio::test]
  async fn test_network_error_falls_back_to_cache() {
    let (client, sync) = product_sync(MockClient::new());
    client.on("GET", "products/", Err(ApiError::from_status(500, "<html></html>")));

    let err = sync.fetch_products(&ProductQuery::default()).await.unwrap_err();
    assert_eq!(err, SyncError::Network("Server error (500)".to_string()));

    sync.cache.set(CacheKey::Products, &vec![product(4)]);
    let page = sync.fetch_products(&ProductQuery::default()).await.unwrap();
    assert_eq!(page.source, DataSource::Cache);
    assert!(page.pagination.is_none());
    assert_eq!(page.results, vec![product(4)]);
  }

  #[tokio::test]
  async fn test_offline_without_cache_is_distinct_error() {
    let (client, sync) = product_sync(MockClient::offline());

    let err = sync.fetch_products(&ProductQuery::default()).await.unwrap_err();

    assert_eq!(err, SyncError::OfflineNoData);
    assert_eq!(client.call_count(), 1);
  }

  #[tokio::test]
  async fn test_highlights_fail_independently() {
    let (client, sync) = product_sync(MockClient::new());
    client.on("GET", "products/", Ok(json!({"results": [{"id": 1}]})));

    let highlights = sync.fetch_highlights().await;

    assert_eq!(highlights.featured.unwrap().len(), 1);
    assert_eq!(highlights.on_sale.unwrap().len(), 1);
    assert_eq!(client.call_count(), 4);

    let (_, offline) = product_sync(MockClient::offline());
    let highlights = offline.fetch_highlights().await;
    assert!(highlights.new_arrivals.is_err());
    assert!(highlights.best_sellers.is_err());
  }

  #[tokio::test]
  async fn test_product_detail_falls_back_to_cached_listing() {
    let (client, sync) = product_sync(MockClient::new());
    client
      .on("GET", "products/4/", Ok(json!({"id": "4", "title": "Tea", "price": "2.5"})))
      .on("GET", "products/4/", Err(ApiError::transport("reset")));

    let fresh = sync.fetch_product(4).await.unwrap();
    assert_eq!(fresh.title, "Tea");
    assert_eq!(fresh.price, 2.5);

    assert!(sync.fetch_product(4).await.is_err());
    sync.cache.set(CacheKey::Products, &vec![product(4)]);
    assert_eq!(sync.fetch_product(4).await.unwrap(), product(4));
  }
}
