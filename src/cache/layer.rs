//! Offline cache service: TTL and schema-version checked entries over a key-value storage.

use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::KeyValueStorage;
use super::traits::{CacheEntry, CacheKey};
use crate::api::types::{CartItem, Category, Product, UserProfile};

/// Schema version written into every entry. Bump when a cached type changes shape.
pub const SCHEMA_VERSION: &str = "1";

/// Offline cache over a key-value storage backend.
///
/// Every operation is best-effort: storage and decoding failures are logged
/// and degrade to "absent", never to an error for the caller.
pub struct OfflineCache<S: KeyValueStorage> {
  storage: Arc<S>,
  /// Entries older than this are evicted on read
  ttl: Duration,
  schema_version: String,
}

impl<S: KeyValueStorage> OfflineCache<S> {
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      ttl: Duration::hours(24),
      schema_version: SCHEMA_VERSION.to_string(),
    }
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  #[allow(dead_code)]
  pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
    self.schema_version = version.into();
    self
  }

  #[cfg(test)]
  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Read a payload. Missing, expired, foreign-version and undecodable entries
  /// are evicted and reported as absent.
  pub fn get<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
    let raw = match self.storage.get_item(key.storage_key()) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(%key, error = %e, "cache read failed");
        return None;
      }
    };

    let entry: CacheEntry<serde_json::Value> = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(%key, error = %e, "discarding undecodable cache entry");
        self.remove(key);
        return None;
      }
    };

    if !entry.is_valid(Utc::now().timestamp_millis(), self.ttl, &self.schema_version) {
      debug!(
        %key,
        written_at = entry.timestamp,
        schema_version = %entry.schema_version,
        "evicting stale cache entry"
      );
      self.remove(key);
      return None;
    }

    match serde_json::from_value(entry.data) {
      Ok(data) => Some(data),
      Err(e) => {
        warn!(%key, error = %e, "cached payload does not match expected type");
        self.remove(key);
        None
      }
    }
  }

  /// Write a payload, replacing whatever was stored under the key.
  pub fn set<T: Serialize>(&self, key: CacheKey, data: &T) {
    let entry = CacheEntry::new(data, &self.schema_version);
    let raw = match serde_json::to_string(&entry) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(%key, error = %e, "failed to serialize cache entry");
        return;
      }
    };

    match self.storage.set_item(key.storage_key(), &raw) {
      Ok(()) => debug!(%key, bytes = raw.len(), "cache entry written"),
      Err(e) => warn!(%key, error = %e, "cache write failed"),
    }
  }

  pub fn remove(&self, key: CacheKey) {
    if let Err(e) = self.storage.remove_item(key.storage_key()) {
      warn!(%key, error = %e, "cache remove failed");
    }
  }

  /// Remove every key in the namespace.
  pub fn clear(&self) {
    let keys: Vec<&str> = CacheKey::ALL.iter().map(|k| k.storage_key()).collect();
    match self.storage.multi_remove(&keys) {
      Ok(()) => debug!(count = keys.len(), "cache cleared"),
      Err(e) => warn!(error = %e, "cache clear failed"),
    }
  }

  /// Run every provided fetcher concurrently and store each success under its key.
  ///
  /// Sources fail independently; the report records what happened to each.
  pub async fn preload_essential_data<E: Display>(
    &self,
    sources: PreloadSources<'_, E>,
  ) -> PreloadReport {
    let (products, categories, profile, cart) = futures::join!(
      self.preload_one(CacheKey::Products, sources.products),
      self.preload_one(CacheKey::Categories, sources.categories),
      self.preload_one(CacheKey::UserProfile, sources.profile),
      self.preload_one(CacheKey::Cart, sources.cart),
    );

    PreloadReport {
      products,
      categories,
      profile,
      cart,
    }
  }

  async fn preload_one<T: Serialize, E: Display>(
    &self,
    key: CacheKey,
    source: Option<BoxFuture<'_, Result<T, E>>>,
  ) -> PreloadStatus {
    let Some(fetch) = source else {
      return PreloadStatus::Skipped;
    };

    match fetch.await {
      Ok(data) => {
        self.set(key, &data);
        PreloadStatus::Stored
      }
      Err(e) => {
        warn!(%key, error = %e, "preload failed");
        PreloadStatus::Failed(e.to_string())
      }
    }
  }
}

impl<S: KeyValueStorage> Clone for OfflineCache<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      ttl: self.ttl,
      schema_version: self.schema_version.clone(),
    }
  }
}

/// Optional fetchers for the data worth having offline.
pub struct PreloadSources<'a, E> {
  pub products: Option<BoxFuture<'a, Result<Vec<Product>, E>>>,
  pub categories: Option<BoxFuture<'a, Result<Vec<Category>, E>>>,
  pub profile: Option<BoxFuture<'a, Result<UserProfile, E>>>,
  pub cart: Option<BoxFuture<'a, Result<Vec<CartItem>, E>>>,
}

impl<E> Default for PreloadSources<'_, E> {
  fn default() -> Self {
    Self {
      products: None,
      categories: None,
      profile: None,
      cart: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadStatus {
  Skipped,
  Stored,
  Failed(String),
}

#[derive(Debug, Clone)]
pub struct PreloadReport {
  pub products: PreloadStatus,
  pub categories: PreloadStatus,
  pub profile: PreloadStatus,
  pub cart: PreloadStatus,
}

impl PreloadReport {
  pub fn stored(&self) -> usize {
    [&self.products, &self.categories, &self.profile, &self.cart]
      .into_iter()
      .filter(|s| **s == PreloadStatus::Stored)
      .count()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStorage;
  use futures::FutureExt;
  use serde_json::json;

  fn cache() -> OfflineCache<MemoryStorage> {
    OfflineCache::new(MemoryStorage::new())
  }

  #[test]
  fn test_set_then_get_round_trips() {
    let cache = cache();
    let payload = json!([{"id": 7, "title": "X"}, {"id": 8, "title": "Ünïcode"}]);

    cache.set(CacheKey::Products, &payload);
    let read: Option<serde_json::Value> = cache.get(CacheKey::Products);

    assert_eq!(read, Some(payload));
  }

  #[test]
  fn test_expired_entry_is_evicted() {
    let cache = cache();
    let stale = CacheEntry {
      data: vec![1, 2, 3],
      timestamp: Utc::now().timestamp_millis() - Duration::hours(25).num_milliseconds(),
      schema_version: SCHEMA_VERSION.to_string(),
    };
    cache
      .storage()
      .set_item(
        CacheKey::Categories.storage_key(),
        &serde_json::to_string(&stale).unwrap(),
      )
      .unwrap();

    assert_eq!(cache.get::<Vec<i32>>(CacheKey::Categories), None);
    assert_eq!(cache.storage().len(), 0);
    // second read stays absent without error
    assert_eq!(cache.get::<Vec<i32>>(CacheKey::Categories), None);
  }

  #[test]
  fn test_zero_ttl_never_serves() {
    let cache = cache().with_ttl(Duration::zero());
    cache.set(CacheKey::Cart, &vec![1]);
    assert_eq!(cache.get::<Vec<i32>>(CacheKey::Cart), None);
  }

  #[test]
  fn test_previous_schema_version_is_ignored() {
    let storage = MemoryStorage::new();
    let old = OfflineCache::new(storage).with_schema_version("0");
    old.set(CacheKey::UserProfile, &json!({"id": 1}));

    let current = old.clone().with_schema_version(SCHEMA_VERSION);
    assert_eq!(current.get::<serde_json::Value>(CacheKey::UserProfile), None);
    assert_eq!(current.storage().len(), 0);
  }

  #[test]
  fn test_garbage_entry_is_evicted() {
    let cache = cache();
    cache
      .storage()
      .set_item(CacheKey::Products.storage_key(), "{not json")
      .unwrap();

    assert_eq!(cache.get::<serde_json::Value>(CacheKey::Products), None);
    assert_eq!(cache.storage().len(), 0);
  }

  #[test]
  fn test_clear_removes_namespace_only() {
    let cache = cache();
    for key in CacheKey::ALL {
      cache.set(key, &1);
    }
    cache.storage().set_item("unrelated", "keep").unwrap();

    cache.clear();
    cache.clear();

    assert_eq!(cache.storage().len(), 1);
    cache.remove(CacheKey::Cart);
  }

  #[tokio::test]
  async fn test_preload_allows_partial_failure() {
    let cache = cache();
    let sources: PreloadSources<'_, String> = PreloadSources {
      products: Some(async { Ok(Vec::new()) }.boxed()),
      categories: Some(async { Err("boom".to_string()) }.boxed()),
      profile: None,
      cart: Some(async { Ok(Vec::new()) }.boxed()),
    };

    let report = cache.preload_essential_data(sources).await;

    assert_eq!(report.products, PreloadStatus::Stored);
    assert_eq!(report.categories, PreloadStatus::Failed("boom".to_string()));
    assert_eq!(report.profile, PreloadStatus::Skipped);
    assert_eq!(report.stored(), 2);
    assert!(cache.get::<Vec<Product>>(CacheKey::Products).is_some());
    assert!(cache.get::<Vec<Category>>(CacheKey::Categories).is_none());
  }
}
