//! In-memory sale being built at the register.
//!
//! Lines keep insertion order (display order) and are merged by product id,
//! so scanning the same product twice bumps the quantity of its line.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{PosError, Result};
use crate::models::Product;
use crate::money::line_subtotal;
use crate::sales::SaleItem;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartLine {
    pub product_id: i64,
    pub barcode: String,
    pub name: String,
    pub unit_price: Decimal,
    /// Never negative.
    pub quantity: i64,
    /// Stock seen in the cache when the line was last touched.
    pub stock: i64,
}

impl CartLine {
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        Self {
            product_id: product.id,
            barcode: product.barcode.clone(),
            name: product.name.clone(),
            unit_price: product.price,
            quantity: quantity.max(0),
            stock: product.stock,
        }
    }

    pub fn subtotal(&self) -> Decimal {
        line_subtotal(self.unit_price, self.quantity)
    }

    pub fn has_stock(&self) -> bool {
        self.stock >= self.quantity
    }
}

/// A line whose requested quantity exceeds the cached stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockShortfall {
    pub product_id: i64,
    pub name: String,
    pub requested: i64,
    pub available: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

fn grow(line: &CartLine, by: i64) -> Result<i64> {
    line.quantity.checked_add(by).ok_or_else(|| {
        PosError::validation(format!("quantity too large for {}", line.name))
    })
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Add `quantity` of `product`, merging with an existing line.
    /// Returns the index of the affected line.
    pub fn add_product(&mut self, product: &Product, quantity: i64) -> Result<usize> {
        self.add_line(CartLine::from_product(product, quantity))
    }

    /// Add a prepared line, merging by product id.
    pub fn add_line(&mut self, line: CartLine) -> Result<usize> {
        let quantity = line.quantity.max(0);
        if let Some(idx) = self
            .lines
            .iter()
            .position(|l| l.product_id == line.product_id)
        {
            let existing = &mut self.lines[idx];
            existing.quantity = grow(existing, quantity)?;
            existing.stock = line.stock;
            return Ok(idx);
        }
        self.lines.push(CartLine { quantity, ..line });
        Ok(self.lines.len() - 1)
    }

    fn line_mut(&mut self, index: usize) -> Result<&mut CartLine> {
        let len = self.lines.len();
        self.lines
            .get_mut(index)
            .ok_or_else(|| PosError::validation(format!("no cart line {index} (cart has {len})")))
    }

    /// Set the quantity of a line; negative values clamp to zero.
    pub fn set_quantity(&mut self, index: usize, quantity: i64) -> Result<()> {
        self.line_mut(index)?.quantity = quantity.max(0);
        Ok(())
    }

    pub fn increment(&mut self, index: usize) -> Result<()> {
        let line = self.line_mut(index)?;
        line.quantity = grow(line, 1)?;
        Ok(())
    }

    /// Decrease by one, never below 1. Use [`Cart::remove`] to drop a line.
    pub fn decrement(&mut self, index: usize) -> Result<()> {
        let line = self.line_mut(index)?;
        if line.quantity > 1 {
            line.quantity -= 1;
        }
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<CartLine> {
        if index >= self.lines.len() {
            return Err(PosError::validation(format!(
                "no cart line {index} (cart has {})",
                self.lines.len()
            )));
        }
        Ok(self.lines.remove(index))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    /// No tax or discount is applied at the cart level.
    pub fn total(&self) -> Decimal {
        self.subtotal()
    }

    pub fn item_count(&self) -> i64 {
        self.lines
            .iter()
            .fold(0i64, |acc, l| acc.saturating_add(l.quantity))
    }

    pub fn stock_shortfalls(&self) -> Vec<StockShortfall> {
        self.lines
            .iter()
            .filter(|l| !l.has_stock())
            .map(|l| StockShortfall {
                product_id: l.product_id,
                name: l.name.clone(),
                requested: l.quantity,
                available: l.stock,
            })
            .collect()
    }

    /// Lines ready for commit. Zero-quantity lines are dropped.
    pub fn sale_items(&self) -> Vec<SaleItem> {
        self.lines
            .iter()
            .filter(|l| l.quantity > 0)
            .map(|l| SaleItem {
                product_id: l.product_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
            })
            .collect()
    }
}
