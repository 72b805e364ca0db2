//! Scripted `ApiClient` for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::client::{ApiClient, ApiError, ApiResponse};

type Reply = Result<Value, ApiError>;

/// Replies are queued per `METHOD path` (query string ignored) and consumed in order.
/// The last reply of a route is repeated once the queue drains to one.
#[derive(Default)]
pub struct MockClient {
  routes: Mutex<HashMap<String, VecDeque<Reply>>>,
  calls: Mutex<Vec<String>>,
  offline: AtomicBool,
}

impl MockClient {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn offline() -> Self {
    let client = Self::default();
    client.offline.store(true, Ordering::Relaxed);
    client
  }

  pub fn on(&self, method: &str, path: &str, reply: Reply) -> &Self {
    self
      .routes
      .lock()
      .unwrap()
      .entry(route(method, path))
      .or_default()
      .push_back(reply);
    self
  }

  /// Every request made so far, as `METHOD full-path`.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  fn reply(&self, method: &str, path: &str) -> Result<ApiResponse, ApiError> {
    self
      .calls
      .lock()
      .unwrap()
      .push(format!("{} {}", method, path));

    if self.offline.load(Ordering::Relaxed) {
      return Err(ApiError::offline());
    }

    let mut routes = self.routes.lock().unwrap();
    let queue = routes
      .get_mut(&route(method, path))
      .ok_or_else(|| ApiError::from_status(404, r#"{"detail": "Not found."}"#))?;
    let reply = if queue.len() > 1 {
      queue.pop_front().unwrap()
    } else {
      queue
        .front()
        .cloned()
        .ok_or_else(|| ApiError::from_status(404, ""))?
    };

    reply.map(|data| ApiResponse { data, status: 200 })
  }
}

fn route(method: &str, path: &str) -> String {
  let path = path.split('?').next().unwrap_or(path);
  format!("{} {}", method, path)
}

#[async_trait]
impl ApiClient for MockClient {
  async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
    self.reply("GET", path)
  }

  async fn post(&self, path: &str, _body: Value) -> Result<ApiResponse, ApiError> {
    self.reply("POST", path)
  }

  async fn patch(&self, path: &str, _body: Value) -> Result<ApiResponse, ApiError> {
    self.reply("PATCH", path)
  }

  async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
    self.reply("DELETE", path)
  }

  fn is_offline(&self) -> bool {
    self.offline.load(Ordering::Relaxed)
  }
}
