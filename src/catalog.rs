//! Product and category CRUD.
//!
//! Every mutation validates its input first and touches the database inside
//! at most one transaction. Stock edits always leave an `AJUSTE` row in
//! `movimientos_stock`.

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use rust_decimal::Decimal;
use tracing::info;

use crate::db::{format_timestamp, money_col, now_timestamp, timestamp_col};
use crate::error::{PosError, Result};
use crate::models::{Category, MovementKind, Product, StockMovement};

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

const MIN_CATEGORY_NAME_LEN: usize = 2;

fn map_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt =
        conn.prepare("SELECT id, nombre, descripcion FROM categorias ORDER BY nombre")?;
    let rows = stmt
        .query_map([], map_category)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn find_category(conn: &Connection, id: i64) -> Result<Option<Category>> {
    Ok(conn
        .query_row(
            "SELECT id, nombre, descripcion FROM categorias WHERE id = ?1",
            params![id],
            map_category,
        )
        .optional()?)
}

/// Validate a category name against the existing categories.
///
/// Names are trimmed, need at least two characters and must be unique
/// ignoring case. `exclude_id` skips the category being edited.
pub fn check_category_name(
    name: &str,
    existing: &[Category],
    exclude_id: Option<i64>,
) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PosError::validation("category name is required"));
    }
    if name.chars().count() < MIN_CATEGORY_NAME_LEN {
        return Err(PosError::validation(format!(
            "category name must have at least {MIN_CATEGORY_NAME_LEN} characters"
        )));
    }
    let lowered = name.to_lowercase();
    if existing
        .iter()
        .any(|c| Some(c.id) != exclude_id && c.name.to_lowercase() == lowered)
    {
        return Err(PosError::validation(format!("category '{name}' already exists")));
    }
    Ok(name.to_string())
}

pub fn add_category(conn: &Connection, name: &str, description: &str) -> Result<i64> {
    let existing = list_categories(conn)?;
    let name = check_category_name(name, &existing, None)?;
    conn.execute(
        "INSERT INTO categorias (nombre, descripcion) VALUES (?1, ?2)",
        params![name, description.trim()],
    )?;
    let id = conn.last_insert_rowid();
    info!(category_id = id, name = %name, "Category added");
    Ok(id)
}

pub fn update_category(conn: &Connection, id: i64, name: &str, description: &str) -> Result<()> {
    let existing = list_categories(conn)?;
    if !existing.iter().any(|c| c.id == id) {
        return Err(PosError::not_found(format!("category {id}")));
    }
    let name = check_category_name(name, &existing, Some(id))?;
    conn.execute(
        "UPDATE categorias SET nombre = ?1, descripcion = ?2 WHERE id = ?3",
        params![name, description.trim(), id],
    )?;
    info!(category_id = id, "Category updated");
    Ok(())
}

/// Delete a category. Refused while any product references it.
pub fn delete_category(conn: &Connection, id: i64) -> Result<()> {
    let in_use: i64 = conn.query_row(
        "SELECT COUNT(*) FROM productos WHERE categoria_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if in_use > 0 {
        return Err(PosError::validation(format!(
            "category {id} is used by {in_use} product(s)"
        )));
    }
    let n = conn.execute("DELETE FROM categorias WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(PosError::not_found(format!("category {id}")));
    }
    info!(category_id = id, "Category deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

const PRODUCT_SELECT: &str = "SELECT p.id, p.codigo_barras, p.nombre, p.precio, p.stock,
        p.categoria_id, COALESCE(c.nombre, ''), p.stock_minimo, p.proveedor, p.activo
     FROM productos p
     LEFT JOIN categorias c ON c.id = p.categoria_id";

fn map_product(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        barcode: row.get(1)?,
        name: row.get(2)?,
        price: money_col(row, 3)?,
        stock: row.get(4)?,
        category_id: row.get(5)?,
        category_name: row.get(6)?,
        min_stock: row.get(7)?,
        supplier: row.get(8)?,
        active: row.get::<_, i64>(9)? != 0,
    })
}

fn query_products(conn: &Connection, sql: &str, args: &[&dyn ToSql]) -> Result<Vec<Product>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, map_product)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// All products with their category name, ordered by name.
pub fn list_products(conn: &Connection) -> Result<Vec<Product>> {
    query_products(conn, &format!("{PRODUCT_SELECT} ORDER BY p.nombre"), &[])
}

/// Products grouped for the stock report: by category, then name.
pub fn list_products_for_report(conn: &Connection) -> Result<Vec<Product>> {
    query_products(
        conn,
        &format!("{PRODUCT_SELECT} ORDER BY COALESCE(c.nombre, ''), p.nombre"),
        &[],
    )
}

/// Active products that can still be sold.
pub fn list_sellable(conn: &Connection) -> Result<Vec<Product>> {
    query_products(
        conn,
        &format!("{PRODUCT_SELECT} WHERE p.activo = 1 AND p.stock > 0 ORDER BY p.nombre"),
        &[],
    )
}

/// Exact barcode or name substring.
pub fn search_products(conn: &Connection, term: &str) -> Result<Vec<Product>> {
    let term = term.trim();
    let pattern = format!("%{}%", escape_like(term));
    query_products(
        conn,
        &format!(
            "{PRODUCT_SELECT} WHERE p.codigo_barras = ?1 OR p.nombre LIKE ?2 ESCAPE '\\' ORDER BY p.nombre"
        ),
        &[&term, &pattern],
    )
}

/// Make `%`, `_` and `\` match literally inside a LIKE pattern.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn find_product(conn: &Connection, id: i64) -> Result<Option<Product>> {
    Ok(conn
        .query_row(
            &format!("{PRODUCT_SELECT} WHERE p.id = ?1"),
            params![id],
            map_product,
        )
        .optional()?)
}

pub fn find_by_barcode(conn: &Connection, barcode: &str) -> Result<Option<Product>> {
    Ok(conn
        .query_row(
            &format!("{PRODUCT_SELECT} WHERE p.codigo_barras = ?1"),
            params![barcode.trim()],
            map_product,
        )
        .optional()?)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    /// Generated as `AUTO-<unix millis>` when absent.
    pub barcode: Option<String>,
    pub name: String,
    pub price: Decimal,
    pub stock: i64,
    pub category_id: Option<i64>,
    pub min_stock: i64,
    pub supplier: String,
    pub active: bool,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, price: Decimal, stock: i64) -> Self {
        Self {
            barcode: None,
            name: name.into(),
            price,
            stock,
            category_id: None,
            min_stock: 0,
            supplier: String::new(),
            active: true,
        }
    }
}

/// Partial product edit; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductUpdate {
    pub barcode: Option<String>,
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i64>,
    /// `Some(None)` clears the category.
    pub category_id: Option<Option<i64>>,
    pub min_stock: Option<i64>,
    pub supplier: Option<String>,
    pub active: Option<bool>,
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(PosError::validation("product name is required"));
    }
    Ok(())
}

fn validate_price(price: Decimal) -> Result<()> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(PosError::validation("price cannot be negative"));
    }
    Ok(())
}

fn validate_stock(stock: i64) -> Result<()> {
    if stock < 0 {
        return Err(PosError::validation("stock cannot be negative"));
    }
    Ok(())
}

fn ensure_category(conn: &Connection, category_id: Option<i64>) -> Result<()> {
    match category_id {
        Some(id) if find_category(conn, id)?.is_none() => {
            Err(PosError::not_found(format!("category {id}")))
        }
        _ => Ok(()),
    }
}

/// `AUTO-<unix millis>`, suffixed when several products land in the same
/// millisecond.
fn auto_barcode(conn: &Connection) -> Result<String> {
    let base = format!("AUTO-{}", Utc::now().timestamp_millis());
    let mut candidate = base.clone();
    let mut n = 1;
    while find_by_barcode(conn, &candidate)?.is_some() {
        n += 1;
        candidate = format!("{base}-{n}");
    }
    Ok(candidate)
}

pub fn add_product(conn: &Connection, product: &NewProduct) -> Result<i64> {
    validate_name(&product.name)?;
    validate_price(product.price)?;
    validate_stock(product.stock)?;
    ensure_category(conn, product.category_id)?;

    let barcode = match product.barcode.as_deref().map(str::trim) {
        Some(b) if !b.is_empty() => b.to_string(),
        _ => auto_barcode(conn)?,
    };

    conn.execute(
        "INSERT INTO productos (codigo_barras, nombre, precio, stock, categoria_id,
            stock_minimo, proveedor, activo)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            barcode,
            product.name.trim(),
            product.price.to_string(),
            product.stock,
            product.category_id,
            product.min_stock,
            product.supplier.trim(),
            product.active as i64,
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(product_id = id, barcode = %barcode, "Product added");
    Ok(id)
}

/// Apply a partial edit. Always stamps `fecha_modificacion`; a stock change
/// records an adjustment movement in the same transaction.
pub fn update_product(conn: &Connection, id: i64, update: &ProductUpdate) -> Result<()> {
    if let Some(name) = &update.name {
        validate_name(name)?;
    }
    if let Some(price) = update.price {
        validate_price(price)?;
    }
    if let Some(stock) = update.stock {
        validate_stock(stock)?;
    }
    ensure_category(conn, update.category_id.flatten())?;

    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(barcode) = &update.barcode {
        sets.push("codigo_barras = ?");
        values.push(Box::new(barcode.trim().to_string()));
    }
    if let Some(name) = &update.name {
        sets.push("nombre = ?");
        values.push(Box::new(name.trim().to_string()));
    }
    if let Some(price) = update.price {
        sets.push("precio = ?");
        values.push(Box::new(price.to_string()));
    }
    if let Some(category_id) = update.category_id {
        sets.push("categoria_id = ?");
        values.push(Box::new(category_id));
    }
    if let Some(min_stock) = update.min_stock {
        sets.push("stock_minimo = ?");
        values.push(Box::new(min_stock));
    }
    if let Some(supplier) = &update.supplier {
        sets.push("proveedor = ?");
        values.push(Box::new(supplier.trim().to_string()));
    }
    if let Some(active) = update.active {
        sets.push("activo = ?");
        values.push(Box::new(active as i64));
    }
    sets.push("fecha_modificacion = ?");
    values.push(Box::new(format_timestamp(&now_timestamp())));
    values.push(Box::new(id));

    let sql = format!("UPDATE productos SET {} WHERE id = ?", sets.join(", "));

    conn.execute_batch("BEGIN IMMEDIATE")?;

    let result = (|| -> Result<()> {
        let n = conn.execute(&sql, params_from_iter(values.iter()))?;
        if n == 0 {
            return Err(PosError::not_found(format!("product {id}")));
        }
        if let Some(stock) = update.stock {
            apply_stock_adjustment(conn, id, stock)?;
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            info!(product_id = id, fields = sets.len() - 1, "Product updated");
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

pub fn update_price(conn: &Connection, id: i64, price: Decimal) -> Result<()> {
    update_product(
        conn,
        id,
        &ProductUpdate {
            price: Some(price),
            ..ProductUpdate::default()
        },
    )
}

pub fn set_active(conn: &Connection, id: i64, active: bool) -> Result<()> {
    update_product(
        conn,
        id,
        &ProductUpdate {
            active: Some(active),
            ..ProductUpdate::default()
        },
    )
}

/// Set the absolute stock of a product, recording the adjustment.
pub fn update_stock(conn: &Connection, id: i64, stock: i64) -> Result<()> {
    update_product(
        conn,
        id,
        &ProductUpdate {
            stock: Some(stock),
            ..ProductUpdate::default()
        },
    )
}

/// Write the new stock and its `AJUSTE` movement. Caller owns the transaction.
fn apply_stock_adjustment(conn: &Connection, id: i64, stock: i64) -> Result<()> {
    let before: i64 = conn
        .query_row(
            "SELECT stock FROM productos WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| PosError::not_found(format!("product {id}")))?;
    if before == stock {
        return Ok(());
    }
    conn.execute(
        "UPDATE productos SET stock = ?1 WHERE id = ?2",
        params![stock, id],
    )?;
    conn.execute(
        "INSERT INTO movimientos_stock (producto_id, tipo, cantidad, stock_anterior, stock_nuevo, fecha)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            MovementKind::Ajuste.as_db(),
            stock - before,
            before,
            stock,
            format_timestamp(&now_timestamp()),
        ],
    )?;
    info!(product_id = id, before, after = stock, "Stock adjusted");
    Ok(())
}

/// Audit trail of one product, newest first.
pub fn list_movements(conn: &Connection, product_id: i64) -> Result<Vec<StockMovement>> {
    let mut stmt = conn.prepare(
        "SELECT id, producto_id, tipo, cantidad, stock_anterior, stock_nuevo, venta_id, fecha
         FROM movimientos_stock WHERE producto_id = ?1 ORDER BY id DESC",
    )?;
    let rows = stmt
        .query_map(params![product_id], |row| {
            let kind: String = row.get(2)?;
            Ok(StockMovement {
                id: row.get(0)?,
                product_id: row.get(1)?,
                kind: MovementKind::from_db(&kind).ok_or_else(|| {
                    rusqlite::Error::InvalidColumnType(
                        2,
                        kind.clone(),
                        rusqlite::types::Type::Text,
                    )
                })?,
                quantity: row.get(3)?,
                stock_before: row.get(4)?,
                stock_after: row.get(5)?,
                sale_id: row.get(6)?,
                timestamp: timestamp_col(row, 7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ===========================================================================
// Tests
// ===========================================================================
