//! Serde-deserializable types matching shop backend responses.
//!
//! The backend has shipped several shapes for the same field over time (brand
//! as a string or an object, images under four different names, decimals as
//! strings). Each field is resolved by an adapter with a fixed priority list
//! so domain types stay strongly typed.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use super::types::{CartItem, Category, PageMeta, Product, UserProfile, WeightUnit};

// ============================================================================
// Envelopes
// ============================================================================

/// Paginated list envelope (`results`/`count`/`next`), or a bare array.
#[derive(Debug, Default)]
pub struct ApiPage {
  pub results: Vec<Value>,
  pub count: Option<u64>,
  pub next: Option<String>,
  pub page: Option<u32>,
  pub page_size: Option<u32>,
}

impl ApiPage {
  pub fn from_value(value: Value) -> Self {
    match value {
      Value::Array(results) => Self {
        count: Some(results.len() as u64),
        results,
        ..Self::default()
      },
      Value::Object(mut obj) => {
        let results = match obj.remove("results").or_else(|| obj.remove("items")) {
          Some(Value::Array(items)) => items,
          _ => Vec::new(),
        };
        Self {
          results,
          count: obj.get("count").and_then(Value::as_u64),
          next: obj
            .get("next")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from),
          page: obj
            .get("page")
            .or_else(|| obj.get("current_page"))
            .and_then(Value::as_u64)
            .map(|p| p as u32),
          page_size: obj
            .get("page_size")
            .and_then(Value::as_u64)
            .map(|p| p as u32),
        }
      }
      _ => Self::default(),
    }
  }

  pub fn has_next(&self) -> bool {
    self.next.is_some()
  }

  pub fn meta(&self) -> PageMeta {
    PageMeta {
      page: self.page,
      page_size: self.page_size,
      total: self.count,
      has_next: self.has_next(),
    }
  }

  /// Convert every record, skipping (and logging) records that lack an id.
  pub fn records<T: for<'de> Deserialize<'de>>(&self) -> Vec<T> {
    self
      .results
      .iter()
      .filter_map(|raw| match T::deserialize(raw) {
        Ok(record) => Some(record),
        Err(e) => {
          warn!(error = %e, "skipping malformed record");
          None
        }
      })
      .collect()
  }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiProduct {
  #[serde(deserialize_with = "flexible_id")]
  pub id: u64,
  #[serde(flatten)]
  pub fields: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCategory {
  #[serde(deserialize_with = "flexible_id")]
  pub id: u64,
  #[serde(flatten)]
  pub fields: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCartItem {
  #[serde(deserialize_with = "flexible_id")]
  pub id: u64,
  #[serde(flatten)]
  pub fields: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiProfile {
  #[serde(deserialize_with = "flexible_id")]
  pub id: u64,
  #[serde(default)]
  pub username: String,
  pub email: Option<String>,
  pub first_name: Option<String>,
  pub last_name: Option<String>,
  #[serde(alias = "phone_number")]
  pub phone: Option<String>,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl ApiProduct {
  pub fn into_product(self) -> Product {
    let f = &self.fields;
    Product {
      id: self.id,
      title: first_string(f, &["title", "name"]).unwrap_or_default(),
      description: first_string(f, &["description"]),
      price: first_decimal(f, &["price", "regular_price"]).unwrap_or_default(),
      discount_price: first_decimal(f, &["discount_price", "sale_price"]),
      brand: extract_brand(f),
      image: extract_image(f),
      category: f.get("category").and_then(value_id).or_else(|| {
        f.get("category_id").and_then(value_id)
      }),
      stock: first_decimal(f, &["stock", "quantity_in_stock", "inventory"]),
      sold_by_weight: is_sold_by_weight(f),
      weight_unit: first_string(f, &["weight_unit", "unit"]).and_then(|u| WeightUnit::parse(&u)),
      weight_price: first_decimal(f, &["price_per_weight", "weight_price"]),
      weight_discount_price: first_decimal(
        f,
        &["discount_price_per_weight", "weight_discount_price"],
      ),
      available_weight: first_decimal(f, &["available_weight", "stock_weight"]),
    }
  }
}

impl From<ApiProduct> for Product {
  fn from(api: ApiProduct) -> Self {
    api.into_product()
  }
}

impl From<ApiCategory> for Category {
  fn from(api: ApiCategory) -> Self {
    let f = &api.fields;
    Category {
      id: api.id,
      name: first_string(f, &["name", "title"]).unwrap_or_default(),
      slug: first_string(f, &["slug"]),
      parent: f.get("parent").and_then(value_id),
      image: extract_image(f),
    }
  }
}

impl ApiCartItem {
  pub fn into_cart_item(self) -> Option<CartItem> {
    let f = self.fields;
    let product_value = f
      .get("product")
      .filter(|v| v.is_object())
      .or_else(|| f.get("product_details"))?;

    let product = match ApiProduct::deserialize(product_value) {
      Ok(p) => p.into_product(),
      Err(e) => {
        warn!(item = self.id, error = %e, "cart item has no usable product");
        return None;
      }
    };

    Some(CartItem {
      id: self.id,
      quantity: first_decimal(&f, &["quantity"]).unwrap_or(1.0),
      unit_price: first_decimal(&f, &["unit_price", "price"]),
      weight_unit: first_string(&f, &["weight_unit"]).and_then(|u| WeightUnit::parse(&u)),
      product,
    })
  }
}

impl From<ApiProfile> for UserProfile {
  fn from(api: ApiProfile) -> Self {
    UserProfile {
      id: api.id,
      username: api.username,
      email: api.email,
      first_name: api.first_name,
      last_name: api.last_name,
      phone: api.phone,
    }
  }
}

/// Cart endpoints answer with `{items: [...]}`, a paginated envelope, or a bare list.
pub fn cart_items_from_value(value: Value) -> Vec<CartItem> {
  ApiPage::from_value(value)
    .records::<ApiCartItem>()
    .into_iter()
    .filter_map(ApiCartItem::into_cart_item)
    .collect()
}

// ============================================================================
// Field adapters
// ============================================================================

/// Brand priority: `brand` string, `brand.name`, `brand_name`.
pub fn extract_brand(fields: &HashMap<String, Value>) -> Option<String> {
  if let Some(brand) = fields.get("brand") {
    if let Some(s) = non_empty_str(brand) {
      return Some(s);
    }
    if let Some(name) = brand.get("name").and_then(non_empty_str) {
      return Some(name);
    }
  }
  first_string(fields, &["brand_name"])
}

/// Image priority: `image`, `image_url`, `thumbnail`, first of `images`.
pub fn extract_image(fields: &HashMap<String, Value>) -> Option<String> {
  if let Some(url) = first_string(fields, &["image", "image_url", "thumbnail"]) {
    return Some(url);
  }

  let first = fields.get("images")?.as_array()?.first()?;
  non_empty_str(first)
    .or_else(|| first.get("image").and_then(non_empty_str))
    .or_else(|| first.get("url").and_then(non_empty_str))
}

fn is_sold_by_weight(fields: &HashMap<String, Value>) -> bool {
  if let Some(sold_by) = fields.get("sold_by").and_then(Value::as_str) {
    return sold_by.eq_ignore_ascii_case("weight");
  }
  ["is_weight_based", "sold_by_weight"]
    .iter()
    .any(|k| fields.get(*k).and_then(Value::as_bool).unwrap_or(false))
}

fn first_string(fields: &HashMap<String, Value>, keys: &[&str]) -> Option<String> {
  keys
    .iter()
    .find_map(|k| fields.get(*k).and_then(non_empty_str))
}

fn first_decimal(fields: &HashMap<String, Value>, keys: &[&str]) -> Option<f64> {
  keys.iter().find_map(|k| fields.get(*k).and_then(decimal))
}

fn non_empty_str(value: &Value) -> Option<String> {
  value
    .as_str()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(String::from)
}

/// Decimal fields come as JSON numbers or as strings like `"12.50"`.
pub fn decimal(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// Foreign keys come as numbers, numeric strings, or nested objects with an `id`.
fn value_id(value: &Value) -> Option<u64> {
  match value {
    Value::Number(n) => n.as_u64(),
    Value::String(s) => s.trim().parse().ok(),
    Value::Object(obj) => obj.get("id").and_then(value_id),
    _ => None,
  }
}

fn flexible_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Value::deserialize(deserializer)?;
  value_id(&value).ok_or_else(|| serde::de::Error::custom(format!("invalid id: {}", value)))
}
