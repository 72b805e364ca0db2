use serde::{Deserialize, Serialize};

/// Unit a weight-sold product is priced in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
  #[default]
  Kg,
  G,
}

impl WeightUnit {
  pub fn parse(value: &str) -> Option<Self> {
    match value.trim().to_lowercase().as_str() {
      "kg" | "kilogram" | "kilograms" => Some(WeightUnit::Kg),
      "g" | "gr" | "gram" | "grams" => Some(WeightUnit::G),
      _ => None,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      WeightUnit::Kg => "kg",
      WeightUnit::G => "g",
    }
  }
}

/// Product as used throughout the app
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Product {
  pub id: u64,
  pub title: String,
  pub description: Option<String>,
  pub price: f64,
  pub discount_price: Option<f64>,
  pub brand: Option<String>,
  pub image: Option<String>,
  pub category: Option<u64>,
  /// Units in stock, when the backend reports it
  pub stock: Option<f64>,
  pub sold_by_weight: bool,
  pub weight_unit: Option<WeightUnit>,
  pub weight_price: Option<f64>,
  pub weight_discount_price: Option<f64>,
  pub available_weight: Option<f64>,
}

/// Product category
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Category {
  pub id: u64,
  pub name: String,
  pub slug: Option<String>,
  pub parent: Option<u64>,
  pub image: Option<String>,
}

/// Line in the shopping cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
  pub id: u64,
  pub product: Product,
  /// Fractional for weight-sold products
  pub quantity: f64,
  pub unit_price: Option<f64>,
  pub weight_unit: Option<WeightUnit>,
}

impl CartItem {
  pub fn is_weight_based(&self) -> bool {
    self.product.sold_by_weight
  }

  pub fn weight_unit(&self) -> WeightUnit {
    self
      .weight_unit
      .or(self.product.weight_unit)
      .unwrap_or_default()
  }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserProfile {
  pub id: u64,
  pub username: String,
  pub email: Option<String>,
  pub first_name: Option<String>,
  pub last_name: Option<String>,
  pub phone: Option<String>,
}

impl UserProfile {
  pub fn display_name(&self) -> String {
    match (&self.first_name, &self.last_name) {
      (Some(first), Some(last)) => format!("{} {}", first, last),
      (Some(first), None) => first.clone(),
      _ => self.username.clone(),
    }
  }
}

/// Page metadata reported by list endpoints
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageMeta {
  pub page: Option<u32>,
  pub page_size: Option<u32>,
  pub total: Option<u64>,
  pub has_next: bool,
}
