//! Excel reports.
//!
//! Each report is first built as plain [`Sheet`] tables (header row plus data
//! rows), then written with `rust_xlsxwriter`. Reports always read fresh data
//! from the database, never the cache.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, Workbook};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::catalog;
use crate::db::now_timestamp;
use crate::error::{PosError, Result};
use crate::models::{Product, Sale, StockStatus};
use crate::money::{round_money, to_f64};
use crate::payment::PaymentMethod;
use crate::sales;

/// Sales included in the sales report.
pub const SALES_REPORT_LIMIT: usize = 100;
const MAX_COLUMN_WIDTH: usize = 50;
const MONEY_FORMAT: &str = "#,##0.00";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(i64),
    Money(Decimal),
}

impl Cell {
    fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    fn display_len(&self) -> usize {
        match self {
            Self::Text(s) => s.chars().count(),
            Self::Int(n) => n.to_string().len(),
            Self::Money(d) => round_money(*d).to_string().len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    fn new(name: &str, header: Vec<&'static str>) -> Self {
        Self {
            name: name.to_string(),
            header,
            rows: Vec::new(),
        }
    }

    /// Two-column metric/value sheet.
    fn metrics(name: &str, metrics: Vec<(&str, Cell)>) -> Self {
        let mut sheet = Self::new(name, vec!["Metric", "Value"]);
        sheet.rows = metrics
            .into_iter()
            .map(|(label, value)| vec![Cell::text(label), value])
            .collect();
        sheet
    }

    /// Longest cell (header included) plus two, capped at 50.
    pub fn column_widths(&self) -> Vec<usize> {
        (0..self.header.len())
            .map(|col| {
                let longest = self
                    .rows
                    .iter()
                    .filter_map(|r| r.get(col))
                    .map(Cell::display_len)
                    .chain(std::iter::once(self.header[col].chars().count()))
                    .max()
                    .unwrap_or(0);
                (longest + 2).min(MAX_COLUMN_WIDTH)
            })
            .collect()
    }
}

/// Write sheets to an `.xlsx` file with a bold header row.
pub fn save_workbook(sheets: &[Sheet], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let money = Format::new().set_num_format(MONEY_FORMAT);

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name)?;

        for (col, width) in sheet.column_widths().into_iter().enumerate() {
            worksheet.set_column_width(col as u16, width as f64)?;
        }
        for (col, title) in sheet.header.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *title, &bold)?;
        }
        for (i, row) in sheet.rows.iter().enumerate() {
            let r = (i + 1) as u32;
            for (col, cell) in row.iter().enumerate() {
                let c = col as u16;
                match cell {
                    Cell::Text(s) => {
                        worksheet.write_string(r, c, s)?;
                    }
                    Cell::Int(n) => {
                        worksheet.write_number(r, c, *n as f64)?;
                    }
                    Cell::Money(d) => {
                        worksheet.write_number_with_format(r, c, to_f64(round_money(*d)), &money)?;
                    }
                }
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}

/// `<dir>/<prefix>_<YYYYmmdd_HHMMSS>.xlsx`
pub fn default_report_path(dir: &Path, prefix: &str, now: NaiveDateTime) -> PathBuf {
    dir.join(format!("{prefix}_{}.xlsx", now.format("%Y%m%d_%H%M%S")))
}

// ---------------------------------------------------------------------------
// Sales report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ProductSold {
    pub name: String,
    pub quantity: i64,
    pub revenue: Decimal,
}

impl ProductSold {
    pub fn average_price(&self) -> Decimal {
        if self.quantity == 0 {
            Decimal::ZERO
        } else {
            round_money(self.revenue / Decimal::from(self.quantity))
        }
    }
}

/// Units and revenue per product name, highest revenue first.
pub fn products_sold(sales: &[Sale]) -> Vec<ProductSold> {
    let mut by_name: HashMap<&str, ProductSold> = HashMap::new();
    for line in sales.iter().flat_map(|s| &s.lines) {
        let entry = by_name
            .entry(line.product_name.as_str())
            .or_insert_with(|| ProductSold {
                name: line.product_name.clone(),
                quantity: 0,
                revenue: Decimal::ZERO,
            });
        entry.quantity += line.quantity;
        entry.revenue += line.subtotal;
    }
    let mut rows: Vec<ProductSold> = by_name.into_values().collect();
    rows.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.name.cmp(&b.name)));
    rows
}

/// Most frequent payment method; ties go to the earlier method in
/// [`PaymentMethod::ALL`].
pub fn most_used_method(sales: &[Sale]) -> Option<PaymentMethod> {
    PaymentMethod::ALL
        .iter()
        .map(|m| (*m, sales.iter().filter(|s| s.payment_method == *m).count()))
        .filter(|(_, n)| *n > 0)
        .fold(None, |best: Option<(PaymentMethod, usize)>, (m, n)| match best {
            Some((_, top)) if top >= n => best,
            _ => Some((m, n)),
        })
        .map(|(m, _)| m)
}

pub fn sales_report_sheets(sales: &[Sale], generated_at: NaiveDateTime) -> Vec<Sheet> {
    let revenue: Decimal = sales.iter().map(|s| s.total).sum();
    let average = if sales.is_empty() {
        Decimal::ZERO
    } else {
        round_money(revenue / Decimal::from(sales.len() as i64))
    };
    let units: i64 = sales
        .iter()
        .flat_map(|s| &s.lines)
        .map(|l| l.quantity)
        .sum();

    let summary = Sheet::metrics(
        "Summary",
        vec![
            (
                "Report date",
                Cell::text(generated_at.format("%d/%m/%Y %H:%M").to_string()),
            ),
            ("Sales", Cell::Int(sales.len() as i64)),
            ("Revenue", Cell::Money(revenue)),
            ("Average sale", Cell::Money(average)),
            ("Products sold", Cell::Int(units)),
            (
                "Most used payment method",
                Cell::text(most_used_method(sales).map_or("N/A", |m| m.label())),
            ),
        ],
    );

    let mut detail = Sheet::new(
        "Sales",
        vec!["Sale ID", "Date", "Time", "Total", "Payment method", "Quantity", "Products"],
    );
    for sale in sales {
        let products = sale
            .lines
            .iter()
            .map(|l| format!("{} (x{})", l.product_name, l.quantity))
            .collect::<Vec<_>>()
            .join(", ");
        detail.rows.push(vec![
            Cell::Int(sale.id),
            Cell::text(sale.timestamp.format("%d/%m/%Y").to_string()),
            Cell::text(sale.timestamp.format("%H:%M:%S").to_string()),
            Cell::Money(sale.total),
            Cell::text(sale.payment_method.label()),
            Cell::Int(sale.lines.iter().map(|l| l.quantity).sum()),
            Cell::Text(products),
        ]);
    }

    let mut sold = Sheet::new(
        "Products Sold",
        vec!["Product", "Quantity", "Revenue", "Average price"],
    );
    for p in products_sold(sales) {
        sold.rows.push(vec![
            Cell::text(p.name.clone()),
            Cell::Int(p.quantity),
            Cell::Money(p.revenue),
            Cell::Money(p.average_price()),
        ]);
    }

    vec![summary, detail, sold]
}

/// Export the latest sales, with their lines, to `path`.
pub fn export_sales_report(conn: &Connection, path: &Path) -> Result<usize> {
    let sales = sales::list_sales_with_items(conn, SALES_REPORT_LIMIT)?;
    if sales.is_empty() {
        return Err(PosError::validation("no sales recorded; nothing to report"));
    }
    save_workbook(&sales_report_sheets(&sales, now_timestamp()), path)?;
    info!(path = %path.display(), sales = sales.len(), "Sales report written");
    Ok(sales.len())
}

// ---------------------------------------------------------------------------
// Stock report
// ---------------------------------------------------------------------------

/// Σ price × stock over every product.
pub fn inventory_value(products: &[Product]) -> Decimal {
    round_money(
        products
            .iter()
            .map(|p| p.price * Decimal::from(p.stock))
            .sum(),
    )
}

pub fn stock_report_sheets(products: &[Product], generated_at: NaiveDateTime) -> Vec<Sheet> {
    let count = |status: StockStatus| {
        Cell::Int(
            products
                .iter()
                .filter(|p| p.stock_status() == status)
                .count() as i64,
        )
    };
    let summary = Sheet::metrics(
        "Stock Summary",
        vec![
            (
                "Generated at",
                Cell::text(generated_at.format("%d/%m/%Y %H:%M").to_string()),
            ),
            ("Products", Cell::Int(products.len() as i64)),
            ("Out of stock", count(StockStatus::OutOfStock)),
            ("Low stock", count(StockStatus::Low)),
            ("Optimal stock", count(StockStatus::Optimal)),
            ("Excess stock", count(StockStatus::Excess)),
            ("Inventory value", Cell::Money(inventory_value(products))),
        ],
    );

    let mut inventory = Sheet::new(
        "Inventory",
        vec!["ID", "Barcode", "Product", "Price", "Stock", "Status", "Category", "Active"],
    );
    for p in products {
        let category = if p.category_name.is_empty() {
            "No category"
        } else {
            p.category_name.as_str()
        };
        inventory.rows.push(vec![
            Cell::Int(p.id),
            Cell::text(p.barcode.clone()),
            Cell::text(p.name.clone()),
            Cell::Money(p.price),
            Cell::Int(p.stock),
            Cell::text(p.stock_status().label()),
            Cell::text(category),
            Cell::text(if p.active { "Yes" } else { "No" }),
        ]);
    }

    vec![summary, inventory]
}

pub fn export_stock_report(conn: &Connection, path: &Path) -> Result<usize> {
    let products = catalog::list_products_for_report(conn)?;
    if products.is_empty() {
        return Err(PosError::validation("no products registered; nothing to report"));
    }
    save_workbook(&stock_report_sheets(&products, now_timestamp()), path)?;
    info!(path = %path.display(), products = products.len(), "Stock report written");
    Ok(products.len())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewProduct;
    use crate::db;
    use crate::money::dec;
    use crate::sales::{NewSale, SaleItem};

    fn seeded_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::run_migrations_for_test(&conn);
        let coke = catalog::add_product(&conn, &NewProduct::new("Coca Cola", dec("10.00"), 10))
            .expect("product");
        let gum = catalog::add_product(&conn, &NewProduct::new("Chicle", dec("0.50"), 200))
            .expect("product");
        catalog::add_product(&conn, &NewProduct::new("Pan", dec("3.00"), 0)).expect("product");

        let mut first = NewSale::new(
            vec![
                SaleItem { product_id: coke, quantity: 2, unit_price: dec("10.00") },
                SaleItem { product_id: gum, quantity: 4, unit_price: dec("0.50") },
            ],
            PaymentMethod::Cash,
        );
        first.amount_received = Some(dec("50"));
        sales::create_sale(&conn, &first).expect("sale");
        sales::create_sale(
            &conn,
            &NewSale::new(
                vec![SaleItem { product_id: gum, quantity: 10, unit_price: dec("0.50") }],
                PaymentMethod::DebitCard,
            ),
        )
        .expect("sale");
        sales::create_sale(
            &conn,
            &NewSale::new(
                vec![SaleItem { product_id: coke, quantity: 1, unit_price: dec("10.00") }],
                PaymentMethod::Cash,
            ),
        )
        .expect("sale");
        conn
    }

    fn value<'a>(sheet: &'a Sheet, metric: &str) -> &'a Cell {
        &sheet
            .rows
            .iter()
            .find(|r| r[0] == Cell::text(metric))
            .expect("metric row")[1]
    }

    #[test]
    fn sales_report_summarizes_and_ranks_products() {
        let conn = seeded_conn();
        let sales = sales::list_sales_with_items(&conn, SALES_REPORT_LIMIT).expect("sales");
        let sheets = sales_report_sheets(&sales, now_timestamp());
        let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Summary", "Sales", "Products Sold"]);

        let summary = &sheets[0];
        assert_eq!(value(summary, "Sales"), &Cell::Int(3));
        assert_eq!(value(summary, "Revenue"), &Cell::Money(dec("37.00")));
        assert_eq!(value(summary, "Average sale"), &Cell::Money(dec("12.33")));
        assert_eq!(value(summary, "Products sold"), &Cell::Int(17));
        assert_eq!(value(summary, "Most used payment method"), &Cell::text("Cash"));

        assert_eq!(sheets[1].rows.len(), 3);
        let sold = &sheets[2];
        assert_eq!(sold.rows[0][0], Cell::text("Coca Cola"));
        assert_eq!(sold.rows[0][1], Cell::Int(3));
        assert_eq!(sold.rows[0][2], Cell::Money(dec("30.00")));
        assert_eq!(sold.rows[1][3], Cell::Money(dec("0.50")));
    }

    #[test]
    fn stock_report_counts_statuses_and_values_inventory() {
        let conn = seeded_conn();
        let products = catalog::list_products_for_report(&conn).expect("products");
        let sheets = stock_report_sheets(&products, now_timestamp());
        let summary = &sheets[0];
        // Coca Cola 7 (optimal), Chicle 186 (excess), Pan 0 (out).
        assert_eq!(value(summary, "Out of stock"), &Cell::Int(1));
        assert_eq!(value(summary, "Low stock"), &Cell::Int(0));
        assert_eq!(value(summary, "Optimal stock"), &Cell::Int(1));
        assert_eq!(value(summary, "Excess stock"), &Cell::Int(1));
        assert_eq!(value(summary, "Inventory value"), &Cell::Money(dec("163.00")));

        let inventory = &sheets[1];
        assert_eq!(inventory.header.len(), 8);
        assert_eq!(inventory.rows.len(), 3);
        assert!(inventory
            .rows
            .iter()
            .all(|r| r[6] == Cell::text("No category")));
    }

    #[test]
    fn inventory_value_counts_negative_stock() {
        let p = |price: &str, stock: i64| Product {
            id: stock,
            barcode: String::new(),
            name: "x".into(),
            price: dec(price),
            stock,
            category_id: None,
            category_name: String::new(),
            min_stock: 0,
            supplier: String::new(),
            active: true,
        };
        assert_eq!(inventory_value(&[p("10.00", -2), p("1.00", 5)]), dec("-15.00"));
        assert_eq!(inventory_value(&[p("3.00", 0)]), Decimal::ZERO);
    }

    #[test]
    fn column_widths_are_capped() {
        let mut sheet = Sheet::new("S", vec!["A", "Long header"]);
        sheet.rows.push(vec![Cell::text("x".repeat(80)), Cell::Int(7)]);
        assert_eq!(sheet.column_widths(), vec![50, 13]);
    }

    #[test]
    fn most_used_method_is_none_without_sales() {
        assert_eq!(most_used_method(&[]), None);
    }

    #[test]
    fn exports_write_xlsx_files() {
        let conn = seeded_conn();
        let dir = tempfile::tempdir().expect("tempdir");
        let now = now_timestamp();

        let sales_path = default_report_path(dir.path(), "sales_report", now);
        assert_eq!(export_sales_report(&conn, &sales_path).expect("sales report"), 3);
        let stock_path = default_report_path(dir.path(), "stock_report", now);
        assert_eq!(export_stock_report(&conn, &stock_path).expect("stock report"), 3);

        for path in [sales_path, stock_path] {
            let bytes = std::fs::read(&path).expect("read");
            assert!(bytes.starts_with(b"PK"), "xlsx is a zip archive");
        }
    }

    #[test]
    fn empty_database_has_nothing_to_report() {
        let conn = Connection::open_in_memory().expect("open");
        db::run_migrations_for_test(&conn);
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(export_sales_report(&conn, &dir.path().join("s.xlsx")).is_err());
        assert!(export_stock_report(&conn, &dir.path().join("t.xlsx")).is_err());
    }
}
