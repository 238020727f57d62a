//! Products, categories and points of sale.

use std::io::Write;

use super::Context;
use crate::auth::Section;
use crate::catalog::{self, NewProduct, ProductUpdate};
use crate::cli::{CategoriesCmd, PointsCmd, ProductsCmd};
use crate::db::format_timestamp;
use crate::error::{PosError, Result};
use crate::models::{Category, PointOfSale, Product};
use crate::money::format_money;
use crate::points;

fn product_header() -> String {
    format!(
        "{:>4}  {:<15} {:<32} {:>10} {:>6}  {:<13} {}",
        "ID", "Barcode", "Name", "Price", "Stock", "Status", "Category"
    )
}

fn product_row(p: &Product) -> String {
    let mut row = format!(
        "{:>4}  {:<15} {:<32} {:>10} {:>6}  {:<13} {}",
        p.id,
        p.barcode,
        p.name,
        format_money(p.price),
        p.stock,
        p.stock_status().label(),
        p.category_name
    );
    if !p.active {
        row.push_str(" (inactive)");
    }
    row
}

fn product_table(products: &[&Product]) -> Vec<String> {
    let mut lines = vec![product_header()];
    lines.extend(products.iter().map(|p| product_row(p)));
    lines.push(format!("{} product(s)", products.len()));
    lines
}

fn product_detail(p: &Product) -> Vec<String> {
    vec![
        format!("ID:         {}", p.id),
        format!("Barcode:    {}", p.barcode),
        format!("Name:       {}", p.name),
        format!("Price:      {}", format_money(p.price)),
        format!("Stock:      {} ({})", p.stock, p.stock_status()),
        format!("Min stock:  {}", p.min_stock),
        format!(
            "Category:   {}",
            if p.category_name.is_empty() { "-" } else { p.category_name.as_str() }
        ),
        format!("Supplier:   {}", if p.supplier.is_empty() { "-" } else { p.supplier.as_str() }),
        format!("Active:     {}", if p.active { "yes" } else { "no" }),
    ]
}

fn fresh_product(ctx: &Context, id: i64) -> Result<Product> {
    let conn = ctx.db.lock()?;
    catalog::find_product(&conn, id)?.ok_or_else(|| PosError::not_found(format!("product {id}")))
}

/// Run a catalog write, refresh the cache, then print the product.
fn write_then_show(
    ctx: &mut Context,
    out: &mut dyn Write,
    id: i64,
    write: impl FnOnce(&rusqlite::Connection) -> Result<()>,
) -> Result<()> {
    {
        let conn = ctx.db.lock()?;
        write(&*conn)?;
    }
    ctx.refresh_cache();
    let product = fresh_product(ctx, id)?;
    ctx.emit(out, &product, product_detail(&product))
}

pub fn products(ctx: &mut Context, action: ProductsCmd, out: &mut dyn Write) -> Result<()> {
    ctx.require(Section::Products)?;
    match action {
        ProductsCmd::List => {
            let all: Vec<&Product> = ctx.cache.products.iter().collect();
            ctx.emit(out, &all, product_table(&all))
        }
        ProductsCmd::Search { term } => {
            let found = {
                let conn = ctx.db.lock()?;
                catalog::search_products(&conn, &term)?
            };
            let refs: Vec<&Product> = found.iter().collect();
            ctx.emit(out, &found, product_table(&refs))
        }
        ProductsCmd::Show { id } => {
            let product = ctx
                .cache
                .product(id)
                .cloned()
                .ok_or_else(|| PosError::not_found(format!("product {id}")))?;
            ctx.emit(out, &product, product_detail(&product))
        }
        ProductsCmd::Add {
            name,
            price,
            stock,
            barcode,
            category,
            min_stock,
            supplier,
        } => {
            let new = NewProduct {
                barcode,
                name,
                price,
                stock,
                category_id: category,
                min_stock,
                supplier,
                active: true,
            };
            let id = {
                let conn = ctx.db.lock()?;
                catalog::add_product(&conn, &new)?
            };
            ctx.refresh_cache();
            let product = fresh_product(ctx, id)?;
            ctx.emit(out, &product, product_detail(&product))
        }
        ProductsCmd::Update {
            id,
            name,
            barcode,
            price,
            stock,
            category,
            no_category,
            min_stock,
            supplier,
        } => {
            let update = ProductUpdate {
                barcode,
                name,
                price,
                stock,
                category_id: if no_category { Some(None) } else { category.map(Some) },
                min_stock,
                supplier,
                active: None,
            };
            if update == ProductUpdate::default() {
                return Err(PosError::validation("nothing to update"));
            }
            write_then_show(ctx, out, id, |conn| catalog::update_product(conn, id, &update))
        }
        ProductsCmd::Price { id, price } => {
            write_then_show(ctx, out, id, |conn| catalog::update_price(conn, id, price))
        }
        ProductsCmd::Stock { id, stock } => {
            write_then_show(ctx, out, id, |conn| catalog::update_stock(conn, id, stock))
        }
        ProductsCmd::Toggle { id } => {
            let active = fresh_product(ctx, id)?.active;
            write_then_show(ctx, out, id, |conn| catalog::set_active(conn, id, !active))
        }
        ProductsCmd::Movements { id } => {
            let movements = {
                let conn = ctx.db.lock()?;
                catalog::list_movements(&conn, id)?
            };
            let mut lines = vec![format!(
                "{:<19}  {:<6} {:>6} {:>8} {:>8}  {}",
                "Date", "Kind", "Qty", "Before", "After", "Sale"
            )];
            lines.extend(movements.iter().map(|m| {
                format!(
                    "{:<19}  {:<6} {:>6} {:>8} {:>8}  {}",
                    format_timestamp(&m.timestamp),
                    m.kind.as_db(),
                    m.quantity,
                    m.stock_before,
                    m.stock_after,
                    m.sale_id.map(|s| s.to_string()).unwrap_or_default()
                )
            }));
            ctx.emit(out, &movements, lines)
        }
    }
}

fn category_lines(categories: &[Category]) -> Vec<String> {
    let mut lines = vec![format!("{:>4}  {:<24} {}", "ID", "Name", "Description")];
    lines.extend(
        categories
            .iter()
            .map(|c| format!("{:>4}  {:<24} {}", c.id, c.name, c.description)),
    );
    lines
}

pub fn categories(ctx: &mut Context, action: CategoriesCmd, out: &mut dyn Write) -> Result<()> {
    ctx.require(Section::Categories)?;
    let message = match action {
        CategoriesCmd::List => {
            return ctx.emit(out, &ctx.cache.categories, category_lines(&ctx.cache.categories));
        }
        CategoriesCmd::Add { name, description } => {
            let conn = ctx.db.lock()?;
            let id = catalog::add_category(&conn, &name, &description)?;
            format!("Category {id} added")
        }
        CategoriesCmd::Update {
            id,
            name,
            description,
        } => {
            let conn = ctx.db.lock()?;
            catalog::update_category(&conn, id, &name, &description)?;
            format!("Category {id} updated")
        }
        CategoriesCmd::Delete { id } => {
            let conn = ctx.db.lock()?;
            catalog::delete_category(&conn, id)?;
            format!("Category {id} deleted")
        }
    };
    ctx.refresh_cache();
    ctx.emit(
        out,
        &serde_json::json!({ "message": message }),
        vec![message.clone()],
    )
}

fn point_lines(points: &[PointOfSale]) -> Vec<String> {
    let mut lines = vec![format!("{:>4}  {:<20} {:<24} {}", "ID", "Name", "Address", "Phone")];
    lines.extend(
        points
            .iter()
            .map(|p| format!("{:>4}  {:<20} {:<24} {}", p.id, p.name, p.address, p.phone)),
    );
    lines
}

pub fn points(ctx: &mut Context, action: PointsCmd, out: &mut dyn Write) -> Result<()> {
    ctx.require(Section::PointsOfSale)?;
    match action {
        PointsCmd::List => ctx.emit(out, &ctx.cache.points, point_lines(&ctx.cache.points)),
        PointsCmd::Add {
            name,
            address,
            phone,
        } => {
            let point = {
                let conn = ctx.db.lock()?;
                let id = points::add_point(&conn, &name, &address, &phone)?;
                points::find_point(&conn, id)?
                    .ok_or_else(|| PosError::not_found(format!("point of sale {id}")))?
            };
            ctx.refresh_cache();
            ctx.emit(out, &point, point_lines(std::slice::from_ref(&point)))
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::super::testing::{admin, context, output};
    use super::*;
    use crate::money::dec;

    #[test]
    fn list_and_show_read_the_cache() {
        let (mut ctx, _dir) = admin();
        let mut out = Vec::new();
        products(&mut ctx, ProductsCmd::List, &mut out).expect("list");
        let text = output(out);
        assert!(text.contains("Coca Cola 500ml"));
        assert!(text.contains("15 product(s)"));
        assert!(text.contains("Low"), "Arroz has stock 3");
    }

    #[test]
    fn add_update_and_toggle_refresh_the_cache() {
        let (mut ctx, _dir) = admin();
        let mut out = Vec::new();
        products(
            &mut ctx,
            ProductsCmd::Add {
                name: "Alfajor".into(),
                price: dec("0.90"),
                stock: 12,
                barcode: Some("ALF-1".into()),
                category: None,
                min_stock: 2,
                supplier: "Havanna".into(),
            },
            &mut out,
        )
        .expect("add");
        let id = ctx.cache.find_by_barcode("ALF-1").expect("cached").id;

        products(&mut ctx, ProductsCmd::Price { id, price: dec("1.10") }, &mut Vec::new())
            .expect("price");
        products(&mut ctx, ProductsCmd::Stock { id, stock: 20 }, &mut Vec::new())
            .expect("stock");
        products(&mut ctx, ProductsCmd::Toggle { id }, &mut Vec::new()).expect("toggle");

        let cached = ctx.cache.product(id).expect("cached");
        assert_eq!(cached.price, dec("1.10"));
        assert_eq!(cached.stock, 20);
        assert!(!cached.active);

        let mut out = Vec::new();
        products(&mut ctx, ProductsCmd::Movements { id }, &mut out).expect("movements");
        assert!(output(out).contains("AJUSTE"));
    }

    #[test]
    fn empty_update_is_rejected() {
        let (mut ctx, _dir) = admin();
        let err = products(
            &mut ctx,
            ProductsCmd::Update {
                id: 1,
                name: None,
                barcode: None,
                price: None,
                stock: None,
                category: None,
                no_category: false,
                min_stock: None,
                supplier: None,
            },
            &mut Vec::new(),
        )
        .expect_err("nothing to update");
        assert!(matches!(err, PosError::Validation(_)));
    }

    #[test]
    fn category_in_use_cannot_be_deleted() {
        let (mut ctx, _dir) = admin();
        let bebidas = ctx
            .cache
            .categories
            .iter()
            .find(|c| c.name == "Bebidas")
            .expect("category")
            .id;
        let err = categories(&mut ctx, CategoriesCmd::Delete { id: bebidas }, &mut Vec::new())
            .expect_err("in use");
        assert!(err.to_string().contains("product"));

        categories(
            &mut ctx,
            CategoriesCmd::Add {
                name: "Golosinas".into(),
                description: String::new(),
            },
            &mut Vec::new(),
        )
        .expect("add");
        assert!(ctx.cache.category_name_taken("golosinas", None));
    }

    #[test]
    fn warehouse_cannot_manage_points_or_categories() {
        let (mut ctx, _dir) = context("deposito", "deposito");
        assert!(matches!(
            points(&mut ctx, PointsCmd::List, &mut Vec::new()),
            Err(PosError::Unauthorized(_))
        ));
        assert!(matches!(
            categories(&mut ctx, CategoriesCmd::List, &mut Vec::new()),
            Err(PosError::Unauthorized(_))
        ));
        products(&mut ctx, ProductsCmd::List, &mut Vec::new()).expect("products allowed");
    }

    #[test]
    fn added_point_is_read_back() {
        let (mut ctx, _dir) = admin();
        let mut out = Vec::new();
        points(
            &mut ctx,
            PointsCmd::Add {
                name: "Caja 2".into(),
                address: "Av. Siempre Viva 742".into(),
                phone: String::new(),
            },
            &mut out,
        )
        .expect("add point");
        assert!(output(out).contains("Av. Siempre Viva 742"));
        assert_eq!(ctx.cache.points.len(), 3);
    }

    #[test]
    fn points_json_output() {
        let (mut ctx, _dir) = admin();
        ctx.json = true;
        let mut out = Vec::new();
        points(&mut ctx, PointsCmd::List, &mut out).expect("list");
        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(value.as_array().map(Vec::len), Some(2));
    }
}
