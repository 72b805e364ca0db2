//! Offline cache for derived API data.
//!
//! This module provides a best-effort cache that:
//! - Stores payloads under a fixed, namespaced set of keys
//! - Expires entries after a TTL and on schema version changes
//! - Never surfaces storage failures to callers (they are logged instead)
//! - Preloads the data worth having offline in one concurrent sweep

mod layer;
mod storage;
mod traits;

pub use layer::{OfflineCache, PreloadReport, PreloadSources, PreloadStatus};
pub use storage::{KeyValueStorage, MemoryStorage, SqliteStorage};
pub use traits::{CacheKey, DataSource};
