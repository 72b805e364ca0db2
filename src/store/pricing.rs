//! Cart pricing and quantity policy.
//!
//! Weight-sold lines move in half-unit steps and never go below half a unit;
//! unit-sold lines are whole numbers bounded by stock.

use crate::api::types::{CartItem, Product};

pub const WEIGHT_STEP: f64 = 0.5;
pub const MIN_WEIGHT: f64 = 0.5;

const EPSILON: f64 = 1e-9;

/// Outcome of checking a requested quantity against the policy.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantityDecision {
  /// Drop the line
  Remove,
  /// Submit this (normalized) quantity
  Set(f64),
  /// Refuse without touching state; the message is meant for the user
  Reject(String),
}

/// Price of one unit (or one kg/g) of a line.
///
/// Priority: explicit line price, then for weight-sold products the weight
/// discount price and weight price, then the product discount and normal price.
pub fn unit_price(item: &CartItem) -> f64 {
  if let Some(price) = item.unit_price {
    return price;
  }
  product_unit_price(&item.product)
}

pub fn product_unit_price(product: &Product) -> f64 {
  let weight_prices = if product.sold_by_weight {
    product.weight_discount_price.or(product.weight_price)
  } else {
    None
  };
  weight_prices
    .or(product.discount_price)
    .unwrap_or(product.price)
}

pub fn line_total(item: &CartItem) -> f64 {
  round_cents(unit_price(item) * item.quantity)
}

pub fn round_cents(amount: f64) -> f64 {
  (amount * 100.0).round() / 100.0
}

/// Round to the nearest half step.
pub fn snap_to_step(quantity: f64) -> f64 {
  (quantity / WEIGHT_STEP).round() * WEIGHT_STEP
}

/// Largest half step not above `quantity`.
fn floor_to_step(quantity: f64) -> f64 {
  ((quantity + EPSILON) / WEIGHT_STEP).floor() * WEIGHT_STEP
}

fn available_weight(product: &Product) -> Option<f64> {
  product.available_weight.or(product.stock)
}

fn format_amount(value: f64) -> String {
  if value.fract().abs() < EPSILON {
    format!("{}", value as i64)
  } else {
    format!("{}", value)
  }
}

/// Check an explicitly requested quantity.
pub fn evaluate(item: &CartItem, requested: f64) -> QuantityDecision {
  if requested <= 0.0 {
    return QuantityDecision::Remove;
  }

  if item.is_weight_based() {
    let unit = item.weight_unit().label();
    if requested + EPSILON < MIN_WEIGHT {
      return QuantityDecision::Reject(format!(
        "Minimum quantity is {} {}",
        format_amount(MIN_WEIGHT),
        unit
      ));
    }
    let mut quantity = snap_to_step(requested);
    if let Some(available) = available_weight(&item.product) {
      if requested > available + EPSILON {
        return QuantityDecision::Reject(format!(
          "Only {} {} available",
          format_amount(available),
          unit
        ));
      }
      // Snapping may round past the limit; fall back to the last step below it.
      if quantity > available + EPSILON {
        quantity = floor_to_step(available);
      }
    }
    return QuantityDecision::Set(quantity);
  }

  // Any positive request keeps at least one unit.
  let quantity = requested.round().max(1.0);
  if let Some(stock) = item.product.stock {
    if quantity > stock + EPSILON {
      return QuantityDecision::Reject(format!("Only {} in stock", format_amount(stock)));
    }
  }
  QuantityDecision::Set(quantity)
}

/// One step up. Weight lines clamp to what is available and are rejected only
/// when no increase is possible at all.
pub fn increment(item: &CartItem) -> QuantityDecision {
  if !item.is_weight_based() {
    return evaluate(item, item.quantity + 1.0);
  }

  let current = item.quantity;
  let target = snap_to_step(current + WEIGHT_STEP);
  match available_weight(&item.product) {
    Some(available) if target > available + EPSILON => {
      let clamped = floor_to_step(available);
      if clamped <= current + EPSILON {
        QuantityDecision::Reject(format!(
          "Only {} {} available",
          format_amount(available),
          item.weight_unit().label()
        ))
      } else {
        QuantityDecision::Set(clamped)
      }
    }
    _ => QuantityDecision::Set(target),
  }
}

/// One step down; stepping below the minimum removes the line.
pub fn decrement(item: &CartItem) -> QuantityDecision {
  if !item.is_weight_based() {
    return evaluate(item, item.quantity - 1.0);
  }

  let target = snap_to_step(item.quantity - WEIGHT_STEP);
  if target + EPSILON < MIN_WEIGHT {
    QuantityDecision::Remove
  } else {
    QuantityDecision::Set(target)
  }
}
