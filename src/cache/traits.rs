//! Core types for the offline cache.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

/// Prefix shared by every key the cache owns.
pub const KEY_PREFIX: &str = "@storefront:";

/// Fixed namespace of cache keys.
///
/// Both the cache service and preload/clear operate on this set, so clearing
/// the cache never has to discover keys at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
  Products,
  Categories,
  UserProfile,
  Cart,
}

impl CacheKey {
  pub const ALL: [CacheKey; 4] = [
    CacheKey::Products,
    CacheKey::Categories,
    CacheKey::UserProfile,
    CacheKey::Cart,
  ];

  /// Storage key, including the namespace prefix.
  pub fn storage_key(self) -> &'static str {
    match self {
      CacheKey::Products => "@storefront:products",
      CacheKey::Categories => "@storefront:categories",
      CacheKey::UserProfile => "@storefront:user_profile",
      CacheKey::Cart => "@storefront:cart",
    }
  }
}

impl std::fmt::Display for CacheKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.storage_key().trim_start_matches(KEY_PREFIX))
  }
}

/// A payload wrapped with its write time and the schema version it was written under.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
  pub data: T,
  /// Milliseconds since the Unix epoch
  pub timestamp: i64,
  pub schema_version: String,
}

impl<T> CacheEntry<T> {
  pub fn new(data: T, schema_version: &str) -> Self {
    Self {
      data,
      timestamp: Utc::now().timestamp_millis(),
      schema_version: schema_version.to_string(),
    }
  }

  /// Valid only while younger than `ttl` and written under `schema_version`.
  pub fn is_valid(&self, now_ms: i64, ttl: Duration, schema_version: &str) -> bool {
    now_ms - self.timestamp < ttl.num_milliseconds() && self.schema_version == schema_version
  }
}

/// Where a piece of state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataSource {
  /// Fresh data from network
  #[default]
  Network,
  /// Network failed, cached data served instead
  Cache,
  /// Forced offline mode, serving cached data
  Offline,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_entry_validity() {
    let entry = CacheEntry {
      data: 1,
      timestamp: 1_000,
      schema_version: "2".to_string(),
    };
    let ttl = Duration::milliseconds(500);

    assert!(entry.is_valid(1_499, ttl, "2"));
    assert!(!entry.is_valid(1_500, ttl, "2"));
    assert!(!entry.is_valid(1_100, ttl, "1"));
  }

  #[test]
  fn test_entry_wire_shape() {
    let entry = CacheEntry {
      data: vec![7],
      timestamp: 42,
      schema_version: "1".to_string(),
    };
    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(
      json,
      serde_json::json!({"data": [7], "timestamp": 42, "schemaVersion": "1"})
    );
  }

  #[test]
  fn test_keys_are_namespaced() {
    for key in CacheKey::ALL {
      assert!(key.storage_key().starts_with(KEY_PREFIX));
    }
    assert_eq!(CacheKey::UserProfile.to_string(), "user_profile");
  }
}
