use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub catalog: CatalogConfig,
  /// Start in forced offline mode (only cached data is served)
  #[serde(default)]
  pub offline: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the shop REST API, e.g. https://shop.example.com/api/
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_ttl_hours")]
  pub ttl_hours: i64,
  /// Override the SQLite location (default: $XDG_DATA_HOME/storefront/cache.db)
  pub path: Option<PathBuf>,
  /// Keep the cache in memory only
  #[serde(default)]
  pub ephemeral: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_hours: default_ttl_hours(),
      path: None,
      ephemeral: false,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
  #[serde(default = "default_page_size")]
  pub page_size: u32,
  /// Upper bound on pages walked when listing categories
  #[serde(default = "default_max_category_pages")]
  pub max_category_pages: u32,
}

impl Default for CatalogConfig {
  fn default() -> Self {
    Self {
      page_size: default_page_size(),
      max_category_pages: default_max_category_pages(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_ttl_hours() -> i64 {
  24
}

fn default_page_size() -> u32 {
  20
}

fn default_max_category_pages() -> u32 {
  50
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./storefront.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/storefront/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/storefront/config.yaml\n\
                 with at least:\n\napi:\n  url: https://shop.example.com/api/"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("storefront.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("storefront").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.catalog.page_size == 0 {
      return Err(eyre!("catalog.page_size must be at least 1"));
    }
    Ok(config)
  }

  pub fn cache_ttl(&self) -> chrono::Duration {
    chrono::Duration::hours(self.cache.ttl_hours)
  }

  /// Get the API token from the environment.
  ///
  /// Checks STOREFRONT_API_TOKEN. Anonymous access is allowed, so a missing
  /// token is not an error.
  pub fn get_api_token() -> Option<String> {
    std::env::var("STOREFRONT_API_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}
