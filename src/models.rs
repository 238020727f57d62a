//! Row types mirrored from the database.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::payment::PaymentMethod;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: i64,
    pub barcode: String,
    pub name: String,
    pub price: Decimal,
    pub stock: i64,
    pub category_id: Option<i64>,
    /// Empty when the product has no category.
    pub category_name: String,
    pub min_stock: i64,
    pub supplier: String,
    pub active: bool,
}

impl Product {
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::classify(self.stock)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointOfSale {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub phone: String,
}

/// One persisted line of a sale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleLine {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sale {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub total: Decimal,
    pub discount_percent: Decimal,
    pub payment_method: PaymentMethod,
    pub amount_received: Decimal,
    pub change: Decimal,
    pub point_of_sale_id: Option<i64>,
    /// Sum of line quantities.
    pub item_count: i64,
    /// Empty for summary listings.
    pub lines: Vec<SaleLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    /// Decrement recorded by a sale.
    Venta,
    /// Manual stock edit.
    Ajuste,
}

impl MovementKind {
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Venta => "VENTA",
            Self::Ajuste => "AJUSTE",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "VENTA" => Some(Self::Venta),
            "AJUSTE" => Some(Self::Ajuste),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockMovement {
    pub id: i64,
    pub product_id: i64,
    pub kind: MovementKind,
    pub quantity: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub sale_id: Option<i64>,
    pub timestamp: NaiveDateTime,
}

// ---------------------------------------------------------------------------
// Stock classification
// ---------------------------------------------------------------------------

pub const LOW_STOCK_LIMIT: i64 = 5;
pub const EXCESS_STOCK_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    Low,
    Optimal,
    Excess,
}

impl StockStatus {
    /// Negative stock (oversold) counts as out of stock.
    pub fn classify(stock: i64) -> Self {
        if stock <= 0 {
            Self::OutOfStock
        } else if stock < LOW_STOCK_LIMIT {
            Self::Low
        } else if stock > EXCESS_STOCK_LIMIT {
            Self::Excess
        } else {
            Self::Optimal
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::OutOfStock => "Out of stock",
            Self::Low => "Low",
            Self::Optimal => "Optimal",
            Self::Excess => "Excess",
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
