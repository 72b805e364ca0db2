//! Cart slice: optimistic quantity changes reconciled against the backend.
//!
//! Every line carries a [`LineSync`] status. A change moves the line to
//! `Pending` holding both the optimistic and the last confirmed quantity, so a
//! failed request can restore exactly what was there before.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::pricing::{self, QuantityDecision};
use super::{cache_fallback, Remote, SyncError};
use crate::api::api_types::{cart_items_from_value, decimal, ApiCartItem};
use crate::api::client::{ApiClient, ApiError};
use crate::api::types::{CartItem, Product};
use crate::cache::{CacheKey, DataSource, KeyValueStorage, OfflineCache};

const CART_PATH: &str = "cart/";
const ITEMS_PATH: &str = "cart/items/";

const RESYNC_NOTICE: &str = "Your cart changed on the server and has been refreshed";

fn item_path(item_id: u64) -> String {
  format!("{}{}/", ITEMS_PATH, item_id)
}

/// Sync status of one cart line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineSync {
  Confirmed(f64),
  Pending { optimistic: f64, previous: f64 },
  RolledBack(f64),
}

impl LineSync {
  /// Last quantity the server agreed with.
  pub fn confirmed_quantity(&self) -> f64 {
    match *self {
      LineSync::Confirmed(q) | LineSync::RolledBack(q) => q,
      LineSync::Pending { previous, .. } => previous,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
  pub item: CartItem,
  pub sync: LineSync,
}

impl CartLine {
  fn confirmed(item: CartItem) -> Self {
    let sync = LineSync::Confirmed(item.quantity);
    Self { item, sync }
  }
}

/// What a cart operation ended up doing
#[derive(Debug, Clone, PartialEq)]
pub enum QuantityOutcome {
  Unchanged,
  Updated(f64),
  Added(u64),
  Removed,
  /// The server no longer knew the line; the whole cart was refetched
  Resynced,
}

#[derive(Debug, Clone, Default)]
pub struct CartState {
  pub lines: Vec<CartLine>,
  pub loading: bool,
  pub error: Option<String>,
  /// Informational message for the user (e.g. after a resync)
  pub notice: Option<String>,
  pub source: DataSource,
}

impl CartState {
  pub fn replace(&mut self, items: Vec<CartItem>, source: DataSource) {
    self.lines = items.into_iter().map(CartLine::confirmed).collect();
    self.source = source;
    self.loading = false;
    self.error = None;
  }

  pub fn items(&self) -> Vec<CartItem> {
    self.lines.iter().map(|l| l.item.clone()).collect()
  }

  pub fn line(&self, item_id: u64) -> Option<&CartLine> {
    self.lines.iter().find(|l| l.item.id == item_id)
  }

  fn line_mut(&mut self, item_id: u64) -> Option<&mut CartLine> {
    self.lines.iter_mut().find(|l| l.item.id == item_id)
  }

  pub fn line_for_product(&self, product_id: u64) -> Option<&CartLine> {
    self.lines.iter().find(|l| l.item.product.id == product_id)
  }

  /// Show `quantity` immediately. Returns the quantity being replaced.
  pub fn apply_optimistic(&mut self, item_id: u64, quantity: f64) -> Option<f64> {
    let line = self.line_mut(item_id)?;
    let previous = line.sync.confirmed_quantity();
    line.item.quantity = quantity;
    line.sync = LineSync::Pending {
      optimistic: quantity,
      previous,
    };
    Some(previous)
  }

  /// Server accepted the change; adopt its quantity when it reported one.
  pub fn confirm(&mut self, item_id: u64, server_quantity: Option<f64>) {
    if let Some(line) = self.line_mut(item_id) {
      let quantity = match (line.sync, server_quantity) {
        (_, Some(q)) => q,
        (LineSync::Pending { optimistic, .. }, None) => optimistic,
        (other, None) => other.confirmed_quantity(),
      };
      line.item.quantity = quantity;
      line.sync = LineSync::Confirmed(quantity);
    }
  }

  /// Restore the last confirmed quantity.
  pub fn roll_back(&mut self, item_id: u64) {
    if let Some(line) = self.line_mut(item_id) {
      let previous = line.sync.confirmed_quantity();
      line.item.quantity = previous;
      line.sync = LineSync::RolledBack(previous);
    }
  }

  fn take(&mut self, item_id: u64) -> Option<(usize, CartLine)> {
    let index = self.lines.iter().position(|l| l.item.id == item_id)?;
    Some((index, self.lines.remove(index)))
  }

  fn restore(&mut self, index: usize, line: CartLine) {
    let index = index.min(self.lines.len());
    self.lines.insert(index, line);
  }

  pub fn subtotal(&self) -> f64 {
    pricing::round_cents(self.lines.iter().map(|l| pricing::line_total(&l.item)).sum())
  }

  /// Units for unit-sold lines, one per weight-sold line.
  pub fn item_count(&self) -> u64 {
    self
      .lines
      .iter()
      .map(|l| {
        if l.item.is_weight_based() {
          1
        } else {
          l.item.quantity.round().max(0.0) as u64
        }
      })
      .sum()
  }
}

pub struct CartSync<C: ApiClient, S: KeyValueStorage> {
  remote: Remote<C>,
  cache: OfflineCache<S>,
}

impl<C: ApiClient, S: KeyValueStorage> CartSync<C, S> {
  pub fn new(remote: Remote<C>, cache: OfflineCache<S>) -> Self {
    Self { remote, cache }
  }

  pub async fn fetch_remote(&self) -> Result<Vec<CartItem>, ApiError> {
    let response = self.remote.get(CART_PATH).await?;
    Ok(cart_items_from_value(response.data))
  }

  pub async fn fetch_cart(&self) -> Result<(Vec<CartItem>, DataSource), SyncError> {
    match self.fetch_remote().await {
      Ok(items) => {
        debug!(count = items.len(), "cart fetched");
        if self.remote.is_online() {
          self.cache.set(CacheKey::Cart, &items);
        }
        Ok((items, DataSource::Network))
      }
      Err(e) => {
        let cached = self.cache.get::<Vec<CartItem>>(CacheKey::Cart);
        cache_fallback(e, cached, "cart")
      }
    }
  }

  pub async fn update_quantity(
    &self,
    state: &mut CartState,
    item_id: u64,
    requested: f64,
  ) -> Result<QuantityOutcome, SyncError> {
    let decision = pricing::evaluate(&self.line(state, item_id)?.item, requested);
    self.apply_decision(state, item_id, decision).await
  }

  pub async fn increment(
    &self,
    state: &mut CartState,
    item_id: u64,
  ) -> Result<QuantityOutcome, SyncError> {
    let decision = pricing::increment(&self.line(state, item_id)?.item);
    self.apply_decision(state, item_id, decision).await
  }

  pub async fn decrement(
    &self,
    state: &mut CartState,
    item_id: u64,
  ) -> Result<QuantityOutcome, SyncError> {
    let decision = pricing::decrement(&self.line(state, item_id)?.item);
    self.apply_decision(state, item_id, decision).await
  }

  fn line<'a>(&self, state: &'a CartState, item_id: u64) -> Result<&'a CartLine, SyncError> {
    state
      .line(item_id)
      .ok_or_else(|| SyncError::Rejected(format!("Item {} is not in the cart", item_id)))
  }

  async fn apply_decision(
    &self,
    state: &mut CartState,
    item_id: u64,
    decision: QuantityDecision,
  ) -> Result<QuantityOutcome, SyncError> {
    match decision {
      QuantityDecision::Reject(message) => {
        debug!(item_id, %message, "quantity change rejected locally");
        Err(SyncError::Rejected(message))
      }
      QuantityDecision::Remove => self.remove_item(state, item_id).await,
      QuantityDecision::Set(quantity) => self.submit_quantity(state, item_id, quantity).await,
    }
  }

  async fn submit_quantity(
    &self,
    state: &mut CartState,
    item_id: u64,
    quantity: f64,
  ) -> Result<QuantityOutcome, SyncError> {
    let current = self.line(state, item_id)?.item.quantity;
    if (current - quantity).abs() < f64::EPSILON {
      return Ok(QuantityOutcome::Unchanged);
    }

    state.apply_optimistic(item_id, quantity);
    state.error = None;

    let result = self
      .remote
      .client()
      .patch(&item_path(item_id), json!({ "quantity": quantity }))
      .await;

    match result {
      Ok(response) => {
        let server_quantity = response.data.get("quantity").and_then(decimal);
        state.confirm(item_id, server_quantity);
        self.persist(state);
        Ok(QuantityOutcome::Updated(server_quantity.unwrap_or(quantity)))
      }
      Err(e) if e.is_not_found() => {
        info!(item_id, "cart line vanished on the server, resyncing");
        let resynced = self.resync(state).await;
        if resynced.is_err() {
          state.roll_back(item_id);
        }
        resynced
      }
      Err(e) => {
        warn!(item_id, error = %e, "quantity update failed, rolling back");
        state.roll_back(item_id);
        state.error = Some(e.message.clone());
        Err(SyncError::from(e))
      }
    }
  }

  /// Drop a line now; put it back where it was if the server refuses.
  pub async fn remove_item(
    &self,
    state: &mut CartState,
    item_id: u64,
  ) -> Result<QuantityOutcome, SyncError> {
    let (index, line) = state
      .take(item_id)
      .ok_or_else(|| SyncError::Rejected(format!("Item {} is not in the cart", item_id)))?;

    match self.remote.client().delete(&item_path(item_id)).await {
      Ok(_) => {
        self.persist(state);
        Ok(QuantityOutcome::Removed)
      }
      Err(e) if e.is_not_found() => {
        info!(item_id, "cart line already gone on the server, resyncing");
        let resynced = self.resync(state).await;
        if resynced.is_err() {
          state.restore(index, line);
        }
        resynced
      }
      Err(e) => {
        warn!(item_id, error = %e, "remove failed, restoring line");
        state.restore(index, line);
        state.error = Some(e.message.clone());
        Err(SyncError::from(e))
      }
    }
  }

  /// Add a product. An existing line for the same product is increased instead.
  pub async fn add_to_cart(
    &self,
    state: &mut CartState,
    product: &Product,
    quantity: f64,
  ) -> Result<QuantityOutcome, SyncError> {
    if quantity <= 0.0 {
      return Err(SyncError::Rejected(
        "Quantity must be greater than zero".to_string(),
      ));
    }
    if let Some(line) = state.line_for_product(product.id) {
      let (item_id, current) = (line.item.id, line.item.quantity);
      return self.update_quantity(state, item_id, current + quantity).await;
    }

    let draft = CartItem {
      id: 0,
      product: product.clone(),
      quantity: 0.0,
      unit_price: None,
      weight_unit: product.weight_unit,
    };
    let quantity = match pricing::evaluate(&draft, quantity) {
      QuantityDecision::Set(q) => q,
      QuantityDecision::Remove => {
        return Err(SyncError::Rejected(
          "Quantity must be greater than zero".to_string(),
        ))
      }
      QuantityDecision::Reject(message) => return Err(SyncError::Rejected(message)),
    };

    let body = json!({ "product_id": product.id, "quantity": quantity });
    let response = self
      .remote
      .client()
      .post(ITEMS_PATH, body)
      .await
      .map_err(|e| {
        warn!(product_id = product.id, error = %e, "add to cart failed");
        state.error = Some(e.message.clone());
        SyncError::from(e)
      })?;

    let created = ApiCartItem::deserialize(&response.data)
      .ok()
      .and_then(ApiCartItem::into_cart_item);
    match created {
      Some(item) => {
        let id = item.id;
        state.lines.push(CartLine::confirmed(item));
        self.persist(state);
        Ok(QuantityOutcome::Added(id))
      }
      None => {
        // Response did not describe the new line, so ask for the whole cart
        self.resync(state).await?;
        let id = state
          .line_for_product(product.id)
          .map(|l| l.item.id)
          .unwrap_or_default();
        Ok(QuantityOutcome::Added(id))
      }
    }
  }

  async fn resync(&self, state: &mut CartState) -> Result<QuantityOutcome, SyncError> {
    let (items, source) = self.fetch_cart().await.map_err(|e| {
      state.error = Some(e.to_string());
      e
    })?;
    state.replace(items, source);
    state.notice = Some(RESYNC_NOTICE.to_string());
    Ok(QuantityOutcome::Resynced)
  }

  fn persist(&self, state: &CartState) {
    if self.remote.is_online() {
      self.cache.set(CacheKey::Cart, &state.items());
    }
  }
}
