//! Sales history and the one-shot `sell` command.

use chrono::Local;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing::warn;

use super::Context;
use crate::auth::Section;
use crate::cart::{Cart, StockShortfall};
use crate::checkout::{self, CheckoutOutcome, CheckoutRequest};
use crate::cli::{SalesCmd, SellArgs};
use crate::db::format_timestamp;
use crate::error::{PosError, Result};
use crate::models::Sale;
use crate::money::format_money;
use crate::sales;
use crate::ticket::{TicketEvent, TicketJob};

const TICKET_WAIT: Duration = Duration::from_secs(5);

fn sale_row(sale: &Sale) -> String {
    format!(
        "{:>6}  {:<19}  {:>12}  {:<16} {:>5}",
        sale.id,
        format_timestamp(&sale.timestamp),
        format_money(sale.total),
        sale.payment_method.label(),
        sale.item_count
    )
}

fn sale_table(sales: &[Sale]) -> Vec<String> {
    let total: Decimal = sales.iter().map(|s| s.total).sum();
    sale_table_with_total(sales, total)
}

fn sale_table_with_total(sales: &[Sale], total: Decimal) -> Vec<String> {
    let mut lines = vec![format!(
        "{:>6}  {:<19}  {:>12}  {:<16} {:>5}",
        "ID", "Date", "Total", "Payment", "Items"
    )];
    lines.extend(sales.iter().map(sale_row));
    lines.push(format!("{} sale(s), {}", sales.len(), format_money(total)));
    lines
}

/// Header, lines and settlement of one sale.
pub(crate) fn sale_detail(sale: &Sale) -> Vec<String> {
    let mut lines = vec![
        format!("Sale #{}  {}", sale.id, format_timestamp(&sale.timestamp)),
        format!("{:>5}  {:<32} {:>10} {:>12}", "Qty", "Product", "Price", "Subtotal"),
    ];
    lines.extend(sale.lines.iter().map(|l| {
        format!(
            "{:>5}  {:<32} {:>10} {:>12}",
            l.quantity,
            l.product_name,
            format_money(l.unit_price),
            format_money(l.subtotal)
        )
    }));
    if !sale.discount_percent.is_zero() {
        lines.push(format!("Discount: {}%", sale.discount_percent.normalize()));
    }
    lines.push(format!("Total:    {}", format_money(sale.total)));
    lines.push(format!("Payment:  {}", sale.payment_method.label()));
    if sale.payment_method.is_cash() {
        lines.push(format!("Received: {}", format_money(sale.amount_received)));
        lines.push(format!("Change:   {}", format_money(sale.change)));
    }
    lines
}

pub(crate) fn shortfall_line(s: &StockShortfall) -> String {
    format!(
        "warning: {} requested {}, only {} in stock",
        s.name, s.requested, s.available
    )
}

/// Ticket job for register sales, from the effective config.
pub(crate) fn register_ticket_job(ctx: &Context) -> TicketJob {
    TicketJob {
        dir: ctx.config.tickets_dir.clone(),
        backend: ctx.config.ticket_backend,
        prefix: "venta".into(),
        open: ctx.config.open_tickets,
    }
}

pub fn history(ctx: &mut Context, action: SalesCmd, out: &mut dyn Write) -> Result<()> {
    ctx.require(Section::SalesHistory)?;
    let conn = ctx.db.lock()?;
    match action {
        SalesCmd::List { limit } => {
            let list = sales::list_sales(&conn, limit)?;
            ctx.emit(out, &list, sale_table(&list))
        }
        SalesCmd::Show { id } => {
            let sale = sales::find_sale(&conn, id)?
                .ok_or_else(|| PosError::not_found(format!("sale {id}")))?;
            ctx.emit(out, &sale, sale_detail(&sale))
        }
        SalesCmd::Range { from, to } => {
            let list = sales::sales_between(&conn, from, to)?;
            ctx.emit(out, &list, sale_table(&list))
        }
        SalesCmd::Day { date } => {
            let day = date.unwrap_or_else(|| Local::now().date_naive());
            let list = sales::sales_between(&conn, day, day)?;
            let mut lines = sale_table_with_total(&list, sales::total_for_day(&conn, day)?);
            lines.insert(0, format!("Sales on {}", day.format("%d/%m/%Y")));
            ctx.emit(out, &list, lines)
        }
        SalesCmd::Daily { days } => {
            let today = Local::now().date_naive();
            let totals = sales::daily_summary(&conn, days, today)?;
            let mut lines = vec![format!("{:<10}  {:>6}  {:>12}", "Date", "Sales", "Total")];
            lines.extend(totals.iter().map(|d| {
                format!(
                    "{:<10}  {:>6}  {:>12}",
                    d.date.format("%d/%m/%Y"),
                    d.sales,
                    format_money(d.total)
                )
            }));
            ctx.emit(out, &totals, lines)
        }
    }
}

/// `CODE[:QTY]`; the code may itself contain colons.
pub(crate) fn parse_item(item: &str) -> Result<(String, i64)> {
    let (code, qty) = match item.rsplit_once(':') {
        Some((code, qty)) if !qty.is_empty() && qty.chars().all(|c| c.is_ascii_digit()) => {
            let qty = qty
                .parse::<i64>()
                .map_err(|e| PosError::validation(format!("bad quantity in '{item}': {e}")))?;
            (code, qty)
        }
        _ => (item, 1),
    };
    let code = code.trim();
    if code.is_empty() {
        return Err(PosError::validation(format!("missing product in '{item}'")));
    }
    if qty <= 0 {
        return Err(PosError::validation(format!("quantity must be positive in '{item}'")));
    }
    Ok((code.to_string(), qty))
}

#[derive(Serialize)]
struct SellReport<'a> {
    sale: &'a Sale,
    ticket: Option<PathBuf>,
    warnings: Vec<String>,
}

/// Wait for the ticket thread of a one-shot sale so the file exists before
/// the process exits.
pub(crate) fn await_ticket(
    outcome: &mut CheckoutOutcome,
    events: &mpsc::Receiver<TicketEvent>,
) -> Option<std::result::Result<PathBuf, String>> {
    let handle = outcome.ticket.take()?;
    if handle.join().is_err() {
        warn!(sale_id = outcome.sale.id, "Ticket thread panicked");
        return Some(Err("ticket thread panicked".into()));
    }
    match events.recv_timeout(TICKET_WAIT) {
        Ok(TicketEvent::Ready { path, .. }) => Some(Ok(path)),
        Ok(TicketEvent::Failed { error, .. }) => Some(Err(error)),
        Err(e) => Some(Err(e.to_string())),
    }
}

pub fn sell(ctx: &mut Context, args: SellArgs, out: &mut dyn Write) -> Result<()> {
    ctx.require(Section::NewSale)?;

    let mut cart = Cart::new();
    for item in &args.items {
        let (code, qty) = parse_item(item)?;
        let product = ctx
            .cache
            .resolve_entry(&code)
            .ok_or_else(|| PosError::not_found(format!("product '{code}'")))?;
        cart.add_product(product, qty)?;
    }

    let request = CheckoutRequest {
        payment_method: args.payment,
        amount_received: args.received,
        discount_percent: args.discount,
        point_of_sale_id: args.point,
    };
    let job = register_ticket_job(ctx);
    let (tx, rx) = mpsc::channel();
    let mut warnings = Vec::new();
    let store_name = ctx.config.store_name.clone();
    let mut outcome = checkout::finalize(
        &ctx.db,
        &mut ctx.cache,
        &mut cart,
        &request,
        |shortfalls| {
            warnings.extend(shortfalls.iter().map(shortfall_line));
            args.yes
        },
        &store_name,
        &job,
        &tx,
    )?;

    let ticket = match await_ticket(&mut outcome, &rx) {
        Some(Ok(path)) => Some(path),
        Some(Err(e)) => {
            warnings.push(format!("ticket not written: {e}"));
            None
        }
        None => {
            warnings.push("ticket not written".into());
            None
        }
    };

    let mut lines = warnings.clone();
    lines.extend(sale_detail(&outcome.sale));
    if let Some(path) = &ticket {
        lines.push(format!("Ticket:   {}", path.display()));
    }
    let report = SellReport {
        sale: &outcome.sale,
        ticket,
        warnings,
    };
    ctx.emit(out, &report, lines)
}

// ===========================================================================
// Tests
// ===========================================================================
