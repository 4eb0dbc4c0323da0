//! Cart line items and their derived aggregate.
//!
//! A cart line is identified by its [`CartLineKey`]: the same product in a
//! different color or size is a different line. The aggregate is always
//! derived from the lines and never stored.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::{CurrencyCode, Price};

/// Uniqueness key for a cart line: `(product, color, size)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CartLineKey {
    pub product_id: ProductId,
    pub color: String,
    pub size: String,
}

impl CartLineKey {
    /// Create a new line key.
    #[must_use]
    pub fn new(product_id: ProductId, color: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            product_id,
            color: color.into(),
            size: size.into(),
        }
    }
}

/// A single line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Price,
    /// Always at least 1 once the line is in a cart.
    pub quantity: u32,
    pub color: String,
    pub size: String,
    /// Opaque reference to the product image (URL or bundled asset name).
    pub image_ref: Option<String>,
}

impl CartLine {
    /// The key this line merges on.
    #[must_use]
    pub fn key(&self) -> CartLineKey {
        CartLineKey::new(
            self.product_id.clone(),
            self.color.clone(),
            self.size.clone(),
        )
    }

    /// Whether this line has the given key, without allocating.
    #[must_use]
    pub fn matches(&self, key: &CartLineKey) -> bool {
        self.product_id == key.product_id && self.color == key.color && self.size == key.size
    }

    /// `quantity × unit_price`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Derived cart totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartAggregate {
    /// Sum of all line quantities.
    pub total_items: u64,
    /// Sum of `quantity × unit_price` over all lines.
    pub total_price: Price,
}

impl CartAggregate {
    /// The aggregate of an empty cart.
    #[must_use]
    pub const fn empty(currency_code: CurrencyCode) -> Self {
        Self {
            total_items: 0,
            total_price: Price::zero(currency_code),
        }
    }

    /// Compute the aggregate over a set of lines.
    ///
    /// All lines are expected to share `currency_code`; the cart store
    /// enforces this on insertion.
    #[must_use]
    pub fn from_lines<'a>(
        lines: impl IntoIterator<Item = &'a CartLine>,
        currency_code: CurrencyCode,
    ) -> Self {
        lines
            .into_iter()
            .fold(Self::empty(currency_code), |mut acc, line| {
                acc.total_items += u64::from(line.quantity);
                acc.total_price.amount += line.line_total().amount;
                acc
            })
    }

    /// Format the total for display (e.g., "$19.99").
    #[must_use]
    pub fn formatted_total(&self) -> String {
        self.total_price.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product: &str, color: &str, size: &str, cents: i64, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(product),
            name: format!("Product {product}"),
            unit_price: Price::from_minor(cents, CurrencyCode::USD),
            quantity,
            color: color.to_string(),
            size: size.to_string(),
            image_ref: None,
        }
    }

    #[test]
    fn test_key_distinguishes_color_and_size() {
        let red = line("1", "red", "M", 100, 1);
        let blue = line("1", "blue", "M", 100, 1);
        let red_large = line("1", "red", "L", 100, 1);

        assert_ne!(red.key(), blue.key());
        assert_ne!(red.key(), red_large.key());
        assert!(red.matches(&red.key()));
        assert!(!red.matches(&blue.key()));
    }

    #[test]
    fn test_aggregate_sums_quantities_and_prices() {
        let lines = vec![line("1", "red", "M", 1000, 2), line("2", "blue", "S", 250, 3)];
        let aggregate = CartAggregate::from_lines(&lines, CurrencyCode::USD);

        assert_eq!(aggregate.total_items, 5);
        assert_eq!(aggregate.formatted_total(), "$27.50");
    }

    #[test]
    fn test_empty_aggregate() {
        let aggregate = CartAggregate::from_lines(&[], CurrencyCode::USD);
        assert_eq!(aggregate, CartAggregate::empty(CurrencyCode::USD));
        assert_eq!(aggregate.formatted_total(), "$0.00");
    }
}
