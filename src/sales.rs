//! Sale commit and sales history.

use chrono::{Duration, NaiveDate};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info};

use crate::db::{format_timestamp, money_col, now_timestamp, timestamp_col};
use crate::error::{PosError, Result};
use crate::models::{MovementKind, Sale, SaleLine};
use crate::money::{line_subtotal, round_money};
use crate::payment::{self, PaymentMethod};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One finalized line handed to [`create_sale`].
#[derive(Debug, Clone, PartialEq)]
pub struct SaleItem {
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSale {
    pub point_of_sale_id: Option<i64>,
    pub items: Vec<SaleItem>,
    /// Percentage in `0..=100`.
    pub discount_percent: Decimal,
    pub payment_method: PaymentMethod,
    /// Cash handed over; `None` means exact.
    pub amount_received: Option<Decimal>,
}

impl NewSale {
    pub fn new(items: Vec<SaleItem>, payment_method: PaymentMethod) -> Self {
        Self {
            point_of_sale_id: None,
            items,
            discount_percent: Decimal::ZERO,
            payment_method,
            amount_received: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub sales: i64,
    pub total: Decimal,
}

// ---------------------------------------------------------------------------
// Totals
// ---------------------------------------------------------------------------

/// Sum of the rounded line subtotals.
pub fn sale_subtotal(items: &[SaleItem]) -> Decimal {
    items
        .iter()
        .map(|i| line_subtotal(i.unit_price, i.quantity))
        .sum()
}

/// Subtotal less a percentage discount, rounded to cents.
pub fn apply_discount(subtotal: Decimal, discount_percent: Decimal) -> Decimal {
    let factor = Decimal::ONE - discount_percent / Decimal::ONE_HUNDRED;
    round_money(subtotal * factor)
}

fn validate(sale: &NewSale) -> Result<()> {
    if sale.items.is_empty() {
        return Err(PosError::EmptyCart);
    }
    if sale.discount_percent < Decimal::ZERO || sale.discount_percent > Decimal::ONE_HUNDRED {
        return Err(PosError::validation("discount must be between 0 and 100"));
    }
    for item in &sale.items {
        if item.quantity <= 0 {
            return Err(PosError::validation(format!(
                "quantity for product {} must be positive",
                item.product_id
            )));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(PosError::validation(format!(
                "price for product {} cannot be negative",
                item.product_id
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Persist a sale atomically.
///
/// Inserts the `ventas` row, then per line the `detalle_venta` row, the stock
/// decrement and its `VENTA` movement. Any failure rolls the whole sale back
/// and is returned unchanged. Payment is settled before the transaction opens,
/// so a short cash payment never reaches the database.
///
/// Stock is not re-checked here: the caller warns about shortfalls and the
/// stock column may go negative.
pub fn create_sale(conn: &Connection, sale: &NewSale) -> Result<Sale> {
    validate(sale)?;

    let subtotal = sale_subtotal(&sale.items);
    let total = apply_discount(subtotal, sale.discount_percent);
    let settlement = payment::settle(total, sale.payment_method, sale.amount_received)?;
    let timestamp = now_timestamp();
    let fecha = format_timestamp(&timestamp);

    conn.execute_batch("BEGIN IMMEDIATE")?;

    let result = (|| -> Result<(i64, Vec<SaleLine>)> {
        conn.execute(
            "INSERT INTO ventas (fecha, total, descuento, forma_pago, monto_recibido, vuelto, punto_venta_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                fecha,
                total.to_string(),
                sale.discount_percent.to_string(),
                settlement.method.as_db(),
                settlement.received.to_string(),
                settlement.change.to_string(),
                sale.point_of_sale_id,
            ],
        )?;
        let sale_id = conn.last_insert_rowid();

        let mut lines = Vec::with_capacity(sale.items.len());
        for item in &sale.items {
            let (stock_before, name): (i64, String) = conn
                .query_row(
                    "SELECT stock, nombre FROM productos WHERE id = ?1",
                    params![item.product_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or_else(|| PosError::not_found(format!("product {}", item.product_id)))?;

            let line_total = line_subtotal(item.unit_price, item.quantity);
            conn.execute(
                "INSERT INTO detalle_venta (venta_id, producto_id, cantidad, precio_unitario, subtotal)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    sale_id,
                    item.product_id,
                    item.quantity,
                    item.unit_price.to_string(),
                    line_total.to_string(),
                ],
            )?;

            let stock_after = stock_before - item.quantity;
            conn.execute(
                "UPDATE productos SET stock = ?1 WHERE id = ?2",
                params![stock_after, item.product_id],
            )?;

            conn.execute(
                "INSERT INTO movimientos_stock
                    (producto_id, tipo, cantidad, stock_anterior, stock_nuevo, venta_id, fecha)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    item.product_id,
                    MovementKind::Venta.as_db(),
                    item.quantity,
                    stock_before,
                    stock_after,
                    sale_id,
                    fecha,
                ],
            )?;

            lines.push(SaleLine {
                product_id: item.product_id,
                product_name: name,
                quantity: item.quantity,
                unit_price: item.unit_price,
                subtotal: line_total,
            });
        }
        Ok((sale_id, lines))
    })();

    let (sale_id, lines) = match result {
        Ok(v) => v,
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            error!(error = %e, "Sale rolled back");
            return Err(e);
        }
    };
    if let Err(e) = conn.execute_batch("COMMIT") {
        let _ = conn.execute_batch("ROLLBACK");
        error!(error = %e, "Sale commit failed");
        return Err(e.into());
    }

    let item_count = lines.iter().map(|l| l.quantity).sum();
    info!(
        sale_id,
        total = %total,
        method = %settlement.method,
        lines = lines.len(),
        "Sale committed"
    );

    Ok(Sale {
        id: sale_id,
        timestamp,
        total,
        discount_percent: sale.discount_percent,
        payment_method: settlement.method,
        amount_received: settlement.received,
        change: settlement.change,
        point_of_sale_id: sale.point_of_sale_id,
        item_count,
        lines,
    })
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

const SALE_SELECT: &str = "SELECT v.id, v.fecha, v.total, v.descuento, v.forma_pago,
        v.monto_recibido, v.vuelto, v.punto_venta_id,
        COALESCE((SELECT SUM(d.cantidad) FROM detalle_venta d WHERE d.venta_id = v.id), 0)
     FROM ventas v";

fn map_sale(row: &Row<'_>) -> rusqlite::Result<Sale> {
    let code: String = row.get(4)?;
    let payment_method = PaymentMethod::from_db(&code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown payment method '{code}'").into(),
        )
    })?;
    Ok(Sale {
        id: row.get(0)?,
        timestamp: timestamp_col(row, 1)?,
        total: money_col(row, 2)?,
        discount_percent: money_col(row, 3)?,
        payment_method,
        amount_received: money_col(row, 5)?,
        change: money_col(row, 6)?,
        point_of_sale_id: row.get(7)?,
        item_count: row.get(8)?,
        lines: Vec::new(),
    })
}

fn query_sales(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Sale>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, map_sale)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Latest `limit` sales, newest first, without lines.
pub fn list_sales(conn: &Connection, limit: usize) -> Result<Vec<Sale>> {
    query_sales(
        conn,
        &format!("{SALE_SELECT} ORDER BY v.fecha DESC, v.id DESC LIMIT ?1"),
        params![limit as i64],
    )
}

/// Latest `limit` sales, newest first, with their lines.
pub fn list_sales_with_items(conn: &Connection, limit: usize) -> Result<Vec<Sale>> {
    let mut sales = list_sales(conn, limit)?;
    for sale in &mut sales {
        sale.lines = sale_lines(conn, sale.id)?;
    }
    Ok(sales)
}

pub fn find_sale(conn: &Connection, id: i64) -> Result<Option<Sale>> {
    let sale = conn
        .query_row(&format!("{SALE_SELECT} WHERE v.id = ?1"), params![id], map_sale)
        .optional()?;
    match sale {
        Some(mut sale) => {
            sale.lines = sale_lines(conn, id)?;
            Ok(Some(sale))
        }
        None => Ok(None),
    }
}

pub fn sale_lines(conn: &Connection, sale_id: i64) -> Result<Vec<SaleLine>> {
    let mut stmt = conn.prepare(
        "SELECT d.producto_id, COALESCE(p.nombre, ''), d.cantidad, d.precio_unitario, d.subtotal
         FROM detalle_venta d
         LEFT JOIN productos p ON p.id = d.producto_id
         WHERE d.venta_id = ?1
         ORDER BY d.id",
    )?;
    let rows = stmt
        .query_map(params![sale_id], |row| {
            Ok(SaleLine {
                product_id: row.get(0)?,
                product_name: row.get(1)?,
                quantity: row.get(2)?,
                unit_price: money_col(row, 3)?,
                subtotal: money_col(row, 4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Sales whose date falls in `start..=end`, oldest first.
pub fn sales_between(conn: &Connection, start: NaiveDate, end: NaiveDate) -> Result<Vec<Sale>> {
    if end < start {
        return Err(PosError::validation("end date is before start date"));
    }
    query_sales(
        conn,
        &format!("{SALE_SELECT} WHERE date(v.fecha) BETWEEN ?1 AND ?2 ORDER BY v.fecha, v.id"),
        params![start.to_string(), end.to_string()],
    )
}

/// Revenue of one calendar day.
pub fn total_for_day(conn: &Connection, day: NaiveDate) -> Result<Decimal> {
    let mut stmt = conn.prepare("SELECT total FROM ventas WHERE date(fecha) = ?1")?;
    let totals = stmt
        .query_map(params![day.to_string()], |row| money_col(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(totals.into_iter().sum())
}

/// Per-day count and revenue for the `days` days ending at `today`,
/// oldest first, with empty days included as zero.
pub fn daily_summary(conn: &Connection, days: u32, today: NaiveDate) -> Result<Vec<DailyTotal>> {
    if days == 0 {
        return Ok(Vec::new());
    }
    let start = today - Duration::days(i64::from(days) - 1);
    let mut buckets: BTreeMap<NaiveDate, DailyTotal> = (0..days)
        .map(|offset| {
            let date = start + Duration::days(i64::from(offset));
            (
                date,
                DailyTotal {
                    date,
                    sales: 0,
                    total: Decimal::ZERO,
                },
            )
        })
        .collect();

    for sale in sales_between(conn, start, today)? {
        if let Some(bucket) = buckets.get_mut(&sale.timestamp.date()) {
            bucket.sales += 1;
            bucket.total += sale.total;
        }
    }
    Ok(buckets.into_values().collect())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, NewProduct};
    use crate::db;
    use crate::money::dec;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch("PRAGMA foreign_keys = ON;").expect("pragma");
        db::run_migrations_for_test(&conn);
        conn
    }

    fn product(conn: &Connection, name: &str, price: &str, stock: i64) -> i64 {
        catalog::add_product(conn, &NewProduct::new(name, dec(price), stock)).expect("product")
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count")
    }

    fn stock_of(conn: &Connection, id: i64) -> i64 {
        conn.query_row("SELECT stock FROM productos WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .expect("stock")
    }

    fn item(product_id: i64, quantity: i64, price: &str) -> SaleItem {
        SaleItem {
            product_id,
            quantity,
            unit_price: dec(price),
        }
    }

    #[test]
    fn two_products_total_25_50() {
        let conn = conn();
        let a = product(&conn, "A", "10.00", 10);
        let b = product(&conn, "B", "5.50", 10);

        let sale = create_sale(
            &conn,
            &NewSale::new(vec![item(a, 2, "10.00"), item(b, 1, "5.50")], PaymentMethod::Cash),
        )
        .expect("sale");

        assert_eq!(sale.total, dec("25.50"));
        assert_eq!(sale.item_count, 3);
        assert_eq!(sale.lines.len(), 2);
        let sum: Decimal = sale.lines.iter().map(|l| l.subtotal).sum();
        assert_eq!(sum, sale.total);
    }

    #[test]
    fn commit_decrements_stock_and_records_movements() {
        let conn = conn();
        let a = product(&conn, "A", "2.00", 5);
        let b = product(&conn, "B", "1.00", 1);

        let sale = create_sale(
            &conn,
            &NewSale::new(vec![item(a, 2, "2.00"), item(b, 3, "1.00")], PaymentMethod::Transfer),
        )
        .expect("sale");

        assert_eq!(count(&conn, "ventas"), 1);
        assert_eq!(count(&conn, "detalle_venta"), 2);
        assert_eq!(stock_of(&conn, a), 3);
        // Oversold stock goes negative; the shortfall is only a warning upstream.
        assert_eq!(stock_of(&conn, b), -2);

        let moves = catalog::list_movements(&conn, b).expect("moves");
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].kind, MovementKind::Venta);
        assert_eq!(moves[0].sale_id, Some(sale.id));
        assert_eq!((moves[0].stock_before, moves[0].stock_after), (1, -2));
    }

    #[test]
    fn failed_line_rolls_back_everything() {
        let conn = conn();
        let a = product(&conn, "A", "3.00", 10);

        let err = create_sale(
            &conn,
            &NewSale::new(vec![item(a, 2, "3.00"), item(999, 1, "1.00")], PaymentMethod::Cash),
        )
        .expect_err("unknown product must fail");
        assert!(matches!(err, PosError::NotFound(_)), "{err}");

        assert_eq!(count(&conn, "ventas"), 0);
        assert_eq!(count(&conn, "detalle_venta"), 0);
        assert_eq!(count(&conn, "movimientos_stock"), 0);
        assert_eq!(stock_of(&conn, a), 10);

        // The connection is usable again after the rollback.
        create_sale(&conn, &NewSale::new(vec![item(a, 1, "3.00")], PaymentMethod::Cash))
            .expect("follow-up sale");
        assert_eq!(stock_of(&conn, a), 9);
    }

    #[test]
    fn short_cash_is_rejected_before_commit() {
        let conn = conn();
        let a = product(&conn, "A", "10.00", 10);
        let mut sale = NewSale::new(vec![item(a, 2, "10.00")], PaymentMethod::Cash);
        sale.amount_received = Some(dec("19.99"));

        let err = create_sale(&conn, &sale).expect_err("short cash");
        assert!(matches!(err, PosError::InsufficientPayment { .. }));
        assert_eq!(count(&conn, "ventas"), 0);
        assert_eq!(stock_of(&conn, a), 10);
    }

    #[test]
    fn cash_change_and_discount_are_stored() {
        let conn = conn();
        let a = product(&conn, "A", "10.00", 10);
        let mut sale = NewSale::new(vec![item(a, 3, "10.00")], PaymentMethod::Cash);
        sale.discount_percent = dec("15");
        sale.amount_received = Some(dec("30"));

        let created = create_sale(&conn, &sale).expect("sale");
        assert_eq!(created.total, dec("25.50"));
        assert_eq!(created.change, dec("4.50"));

        let stored = find_sale(&conn, created.id).expect("find").expect("exists");
        assert_eq!(stored.total, dec("25.50"));
        assert_eq!(stored.discount_percent, dec("15"));
        assert_eq!(stored.amount_received, dec("30"));
        assert_eq!(stored.change, dec("4.50"));
        assert_eq!(stored.lines[0].subtotal, dec("30.00"));
        assert_eq!(stored.lines[0].product_name, "A");
    }

    #[test]
    fn rejects_empty_and_invalid_input() {
        let conn = conn();
        let a = product(&conn, "A", "1.00", 1);
        assert!(matches!(
            create_sale(&conn, &NewSale::new(vec![], PaymentMethod::Cash)),
            Err(PosError::EmptyCart)
        ));
        assert!(create_sale(&conn, &NewSale::new(vec![item(a, 0, "1")], PaymentMethod::Cash)).is_err());
        let mut sale = NewSale::new(vec![item(a, 1, "1")], PaymentMethod::Cash);
        sale.discount_percent = dec("120");
        assert!(create_sale(&conn, &sale).is_err());
    }

    #[test]
    fn history_queries() {
        let conn = conn();
        let a = product(&conn, "A", "1.00", 100);
        for qty in 1..=3 {
            create_sale(&conn, &NewSale::new(vec![item(a, qty, "1.00")], PaymentMethod::Card))
                .expect("sale");
        }
        conn.execute(
            "UPDATE ventas SET fecha = '2024-01-02 09:15:00' WHERE id = 1",
            [],
        )
        .expect("backdate");

        let latest = list_sales(&conn, 2).expect("list");
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].id, 3);
        assert!(latest[0].lines.is_empty());

        let with_items = list_sales_with_items(&conn, 10).expect("with items");
        assert_eq!(with_items.len(), 3);
        assert!(with_items.iter().all(|s| s.lines.len() == 1));

        let jan2 = NaiveDate::from_ymd_opt(2024, 1, 2).expect("date");
        let ranged = sales_between(&conn, jan2, jan2).expect("range");
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].total, dec("1.00"));
        assert_eq!(total_for_day(&conn, jan2).expect("day"), dec("1.00"));
        let jan5 = NaiveDate::from_ymd_opt(2024, 1, 5).expect("date");
        assert_eq!(total_for_day(&conn, jan5).expect("empty day"), Decimal::ZERO);

        let summary = daily_summary(&conn, 3, NaiveDate::from_ymd_opt(2024, 1, 3).expect("date"))
            .expect("summary");
        assert_eq!(summary.len(), 3);
        assert_eq!(summary[0].sales, 0);
        assert_eq!(summary[1].date, jan2);
        assert_eq!(summary[1].sales, 1);
        assert_eq!(summary[2].total, Decimal::ZERO);

        assert!(find_sale(&conn, 42).expect("find").is_none());
    }
}
