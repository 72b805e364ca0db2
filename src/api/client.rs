use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;

/// Successful response from the shop backend
#[derive(Debug, Clone)]
pub struct ApiResponse {
  pub data: Value,
  pub status: u16,
}

/// Failed request.
///
/// `message` is already cleaned for display; HTML error pages never reach it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
  pub message: String,
  pub status: Option<u16>,
  /// Set when the request was refused because the app is forced offline
  pub offline_blocked: bool,
}

impl ApiError {
  pub fn offline() -> Self {
    Self {
      message: "Offline mode is enabled".to_string(),
      status: None,
      offline_blocked: true,
    }
  }

  pub fn transport(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      status: None,
      offline_blocked: false,
    }
  }

  pub fn from_status(status: u16, body: &str) -> Self {
    Self {
      message: clean_error_message(status, body),
      status: Some(status),
      offline_blocked: false,
    }
  }

  /// The server says the addressed entity no longer exists.
  pub fn is_not_found(&self) -> bool {
    if self.status == Some(404) {
      return true;
    }
    let message = self.message.to_lowercase();
    message.contains("not found") || message.contains("does not exist")
  }
}

/// HTTP collaborator the state slices talk to.
#[async_trait]
pub trait ApiClient: Send + Sync {
  async fn get(&self, path: &str) -> Result<ApiResponse, ApiError>;

  async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, ApiError>;

  async fn patch(&self, path: &str, body: Value) -> Result<ApiResponse, ApiError>;

  async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError>;

  /// Whether requests are currently refused by forced offline mode.
  fn is_offline(&self) -> bool;
}

/// REST client for the shop backend
#[derive(Clone)]
pub struct RestClient {
  http: reqwest::Client,
  base_url: Url,
  token: Option<String>,
  offline: Arc<AtomicBool>,
}

impl RestClient {
  pub fn new(config: &Config) -> Result<Self> {
    // Url::join drops the last path segment unless it ends with '/'
    let mut base = config.api.url.clone();
    if !base.ends_with('/') {
      base.push('/');
    }
    let base_url =
      Url::parse(&base).map_err(|e| eyre!("Invalid API url {}: {}", config.api.url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .user_agent(concat!("storefront/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      token: Config::get_api_token(),
      offline: Arc::new(AtomicBool::new(config.offline)),
    })
  }

  /// Force (or lift) offline mode. While set every request fails fast.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::Relaxed);
  }

  fn url(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| ApiError::transport(format!("Invalid request path {}: {}", path, e)))
  }

  async fn send(
    &self,
    method: reqwest::Method,
    path: &str,
    body: Option<Value>,
  ) -> Result<ApiResponse, ApiError> {
    if self.is_offline() {
      debug!(%method, path, "request blocked by offline mode");
      return Err(ApiError::offline());
    }

    let url = self.url(path)?;
    let mut request = self.http.request(method.clone(), url);
    if let Some(token) = &self.token {
      request = request.header(reqwest::header::AUTHORIZATION, format!("Token {}", token));
    }
    if let Some(body) = body {
      request = request.json(&body);
    }

    let response = request.send().await.map_err(|e| {
      warn!(%method, path, error = %e, "request failed");
      ApiError::transport(format!("Network error: {}", e))
    })?;

    let status = response.status().as_u16();
    let text = response
      .text()
      .await
      .map_err(|e| ApiError::transport(format!("Failed to read response: {}", e)))?;

    if !(200..300).contains(&status) {
      warn!(%method, path, status, "request rejected");
      return Err(ApiError::from_status(status, &text));
    }

    debug!(%method, path, status, bytes = text.len(), "request ok");
    let data = if text.trim().is_empty() {
      Value::Null
    } else {
      serde_json::from_str(&text)
        .map_err(|e| ApiError::transport(format!("Invalid JSON from server: {}", e)))?
    };

    Ok(ApiResponse { data, status })
  }
}

#[async_trait]
impl ApiClient for RestClient {
  async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
    self.send(reqwest::Method::GET, path, None).await
  }

  async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, ApiError> {
    self.send(reqwest::Method::POST, path, Some(body)).await
  }

  async fn patch(&self, path: &str, body: Value) -> Result<ApiResponse, ApiError> {
    self.send(reqwest::Method::PATCH, path, Some(body)).await
  }

  async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
    self.send(reqwest::Method::DELETE, path, None).await
  }

  fn is_offline(&self) -> bool {
    self.offline.load(Ordering::Relaxed)
  }
}

const MAX_MESSAGE_LEN: usize = 200;

/// Reduce an error body to something fit for a status line.
///
/// HTML pages become a short placeholder; JSON bodies yield their `detail`,
/// `error` or `message` field, or the first field-level validation message.
pub fn clean_error_message(status: u16, body: &str) -> String {
  let trimmed = body.trim();
  if trimmed.is_empty() {
    return format!("Request failed with status {}", status);
  }

  let lowered = trimmed.to_lowercase();
  if lowered.starts_with("<!doctype") || lowered.starts_with("<html") || lowered.contains("<body")
  {
    return format!("Server error ({})", status);
  }

  if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
    if let Some(message) = json_message(&json) {
      return truncate(&message);
    }
  }

  truncate(trimmed)
}

fn json_message(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Array(items) => items.iter().find_map(json_message),
    Value::Object(obj) => {
      for key in ["detail", "error", "message", "non_field_errors"] {
        if let Some(message) = obj.get(key).and_then(json_message) {
          return Some(message);
        }
      }
      obj
        .iter()
        .find_map(|(field, v)| json_message(v).map(|m| format!("{}: {}", field, m)))
    }
    _ => None,
  }
}

fn truncate(message: &str) -> String {
  if message.chars().count() <= MAX_MESSAGE_LEN {
    return message.to_string();
  }
  let cut: String = message.chars().take(MAX_MESSAGE_LEN).collect();
  format!("{}…", cut)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_html_body_is_replaced() {
    let body = "<!DOCTYPE html><html><body><h1>Server Error (500)</h1></body></html>";
    assert_eq!(clean_error_message(500, body), "Server error (500)");
  }

  #[test]
  fn test_json_detail_is_used() {
    assert_eq!(
      clean_error_message(404, r#"{"detail": "Not found."}"#),
      "Not found."
    );
    assert_eq!(
      clean_error_message(400, r#"{"quantity": ["Not enough stock"]}"#),
      "quantity: Not enough stock"
    );
    assert_eq!(
      clean_error_message(400, r#"{"non_field_errors": ["Cart is locked"]}"#),
      "Cart is locked"
    );
  }

  #[test]
  fn test_plain_and_empty_bodies() {
    assert_eq!(clean_error_message(502, ""), "Request failed with status 502");
    assert_eq!(clean_error_message(503, "upstream down"), "upstream down");
    let long = "x".repeat(500);
    assert_eq!(clean_error_message(500, &long).chars().count(), MAX_MESSAGE_LEN + 1);
  }

  #[test]
  fn test_not_found_detection() {
    assert!(ApiError::from_status(404, "").is_not_found());
    assert!(ApiError::from_status(400, r#"{"detail": "Cart item does not exist"}"#).is_not_found());
    assert!(!ApiError::from_status(400, r#"{"detail": "Invalid quantity"}"#).is_not_found());
    assert!(!ApiError::offline().is_not_found());
  }
}
