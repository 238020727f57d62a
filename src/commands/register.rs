//! Interactive register: one command per input line.
//!
//! Anything that is not a command is a product entry (`CODE` or `CODE*QTY`),
//! resolved against the cache by barcode, exact name, then name substring.
//! Line numbers are 1-based as printed by `list`.

use rust_decimal::Decimal;
use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use tracing::{debug, warn};

use super::sales::{register_ticket_job, sale_detail, shortfall_line};
use super::Context;
use crate::auth::Section;
use crate::cart::Cart;
use crate::checkout::{self, CheckoutRequest};
use crate::error::{PosError, Result};
use crate::money::{format_money, parse_money};
use crate::payment::PaymentMethod;
use crate::ticket::TicketEvent;

const HELP: &[&str] = &[
    "CODE[*QTY]         add a product by barcode or name",
    "list               show the cart",
    "qty N Q            set the quantity of line N",
    "inc N / dec N      add or take one from line N",
    "rm N               remove line N",
    "clear              empty the cart",
    "find TEXT          suggest products",
    "discount P         discount percentage for the next sale",
    "pay METHOD [CASH]  finalize (cash, debit, credit, card, transfer)",
    "quit               leave the register",
];

enum Flow {
    Continue,
    Quit,
}

struct Register {
    cart: Cart,
    discount: Decimal,
    events_tx: Sender<TicketEvent>,
    events_rx: Receiver<TicketEvent>,
    tickets: Vec<JoinHandle<()>>,
}

fn line_index(arg: Option<&str>) -> Result<usize> {
    let n: usize = arg
        .ok_or_else(|| PosError::validation("missing line number"))?
        .parse()
        .map_err(|_| PosError::validation("line number must be a positive integer"))?;
    n.checked_sub(1)
        .ok_or_else(|| PosError::validation("line numbers start at 1"))
}

fn parse_quantity(arg: Option<&str>) -> Result<i64> {
    arg.ok_or_else(|| PosError::validation("missing quantity"))?
        .parse()
        .map_err(|_| PosError::validation("quantity must be an integer"))
}

/// `CODE*QTY`; a missing or non-numeric suffix means one unit.
fn split_entry(entry: &str) -> Result<(&str, i64)> {
    match entry.rsplit_once('*') {
        Some((code, qty)) if !qty.trim().is_empty() && qty.trim().chars().all(|c| c.is_ascii_digit()) => {
            let qty: i64 = qty
                .trim()
                .parse()
                .map_err(|_| PosError::validation("quantity too large"))?;
            if qty <= 0 {
                return Err(PosError::validation("quantity must be positive"));
            }
            Ok((code.trim(), qty))
        }
        _ => Ok((entry.trim(), 1)),
    }
}

impl Register {
    fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            cart: Cart::new(),
            discount: Decimal::ZERO,
            events_tx,
            events_rx,
            tickets: Vec::new(),
        }
    }

    fn cart_lines(&self) -> Vec<String> {
        if self.cart.is_empty() {
            return vec!["Cart is empty.".into()];
        }
        let mut lines: Vec<String> = self
            .cart
            .lines()
            .iter()
            .enumerate()
            .map(|(i, l)| {
                format!(
                    "{:>3}. {:<32} {:>5} x {:>10} = {:>12}",
                    i + 1,
                    l.name,
                    l.quantity,
                    format_money(l.unit_price),
                    format_money(l.subtotal())
                )
            })
            .collect();
        lines.push(format!(
            "{} item(s), total {}",
            self.cart.item_count(),
            format_money(self.cart.total())
        ));
        if !self.discount.is_zero() {
            lines.push(format!("Discount at payment: {}%", self.discount.normalize()));
        }
        lines
    }

    fn drain_events(&self, out: &mut dyn Write) -> Result<()> {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                TicketEvent::Ready { sale_id, path } => {
                    writeln!(out, "Ticket for sale #{sale_id}: {}", path.display())?
                }
                TicketEvent::Failed { sale_id, error } => {
                    writeln!(out, "Ticket for sale #{sale_id} failed: {error}")?
                }
            }
        }
        Ok(())
    }

    fn handle(
        &mut self,
        ctx: &mut Context,
        line: &str,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
    ) -> Result<Flow> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(Flow::Continue);
        };
        match command.to_lowercase().as_str() {
            "quit" | "exit" => return Ok(Flow::Quit),
            "help" | "?" => {
                for entry in HELP {
                    writeln!(out, "  {entry}")?;
                }
            }
            "list" => super::write_lines(out, &self.cart_lines())?,
            "qty" => {
                let index = line_index(words.next())?;
                let quantity = parse_quantity(words.next())?;
                self.cart.set_quantity(index, quantity)?;
                super::write_lines(out, &self.cart_lines())?;
            }
            "inc" => {
                self.cart.increment(line_index(words.next())?)?;
                super::write_lines(out, &self.cart_lines())?;
            }
            "dec" => {
                self.cart.decrement(line_index(words.next())?)?;
                super::write_lines(out, &self.cart_lines())?;
            }
            "rm" => {
                let removed = self.cart.remove(line_index(words.next())?)?;
                writeln!(out, "Removed {}", removed.name)?;
            }
            "clear" => {
                self.cart.clear();
                self.discount = Decimal::ZERO;
                writeln!(out, "Cart cleared")?;
            }
            "find" => {
                let query = line.trim_start()[command.len()..].trim();
                self.suggest(ctx, query, out)?;
            }
            "discount" => {
                let percent = parse_money(words.next().unwrap_or(""))?;
                if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
                    return Err(PosError::validation("discount must be between 0 and 100"));
                }
                self.discount = percent;
                writeln!(out, "Discount set to {}%", percent.normalize())?;
            }
            "pay" => {
                let method: PaymentMethod = words
                    .next()
                    .ok_or_else(|| PosError::validation("missing payment method"))?
                    .parse()
                    .map_err(PosError::Validation)?;
                let received = words.next().map(parse_money).transpose()?;
                self.pay(ctx, method, received, input, out)?;
            }
            _ => self.add_entry(ctx, line.trim(), out)?,
        }
        Ok(Flow::Continue)
    }

    fn suggest(&self, ctx: &Context, query: &str, out: &mut dyn Write) -> Result<()> {
        let hits = ctx.cache.suggestions(query);
        if hits.is_empty() {
            writeln!(out, "No products match '{query}'")?;
        }
        for p in hits {
            writeln!(
                out,
                "  {:<15} {:<32} {:>10}  stock {}",
                p.barcode,
                p.name,
                format_money(p.price),
                p.stock
            )?;
        }
        Ok(())
    }

    fn add_entry(&mut self, ctx: &Context, entry: &str, out: &mut dyn Write) -> Result<()> {
        let (code, qty) = split_entry(entry)?;
        let Some(product) = ctx.cache.resolve_entry(code) else {
            writeln!(out, "Product '{code}' not found")?;
            return self.suggest(ctx, code, out);
        };
        let index = self.cart.add_product(product, qty)?;
        let line = &self.cart.lines()[index];
        debug!(product_id = line.product_id, quantity = qty, "Cart line added");
        writeln!(
            out,
            "{:>3}. {} x {}  = {}   total {}",
            index + 1,
            line.quantity,
            line.name,
            format_money(line.subtotal()),
            format_money(self.cart.total())
        )?;
        if !line.has_stock() {
            writeln!(out, "warning: only {} of {} in stock", line.stock, line.name)?;
        }
        Ok(())
    }

    fn pay(
        &mut self,
        ctx: &mut Context,
        method: PaymentMethod,
        received: Option<Decimal>,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
    ) -> Result<()> {
        let request = CheckoutRequest {
            payment_method: method,
            amount_received: received,
            discount_percent: self.discount,
            point_of_sale_id: None,
        };
        let job = register_ticket_job(ctx);
        let store_name = ctx.config.store_name.clone();
        let confirm = |shortfalls: &[crate::cart::StockShortfall]| {
            for s in shortfalls {
                let _ = writeln!(out, "{}", shortfall_line(s));
            }
            let _ = write!(out, "Sell anyway? [y/N] ");
            let _ = out.flush();
            let mut answer = String::new();
            input.read_line(&mut answer).is_ok()
                && matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "s" | "si")
        };
        let outcome = checkout::finalize(
            &ctx.db,
            &mut ctx.cache,
            &mut self.cart,
            &request,
            confirm,
            &store_name,
            &job,
            &self.events_tx,
        )?;
        self.discount = Decimal::ZERO;
        super::write_lines(out, &sale_detail(&outcome.sale))?;
        if !outcome.cache_refreshed {
            writeln!(out, "warning: views may be out of date until the next refresh")?;
        }
        if let Some(handle) = outcome.ticket {
            self.tickets.push(handle);
        }
        Ok(())
    }

    /// Join outstanding ticket threads and report their results.
    fn finish(&mut self, out: &mut dyn Write) -> Result<()> {
        for handle in self.tickets.drain(..) {
            if handle.join().is_err() {
                warn!("Ticket thread panicked");
            }
        }
        self.drain_events(out)
    }
}

pub fn run(ctx: &mut Context, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<()> {
    let session = ctx.require(Section::NewSale)?;
    writeln!(
        out,
        "{} register, cashier {}. Type 'help' for commands.",
        ctx.config.store_name, session.username
    )?;

    let mut register = Register::new();
    let mut line = String::new();
    loop {
        register.drain_events(out)?;
        write!(out, "> ")?;
        out.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }
        match register.handle(ctx, &line, input, out) {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(e @ (PosError::Database(_) | PosError::Lock(_) | PosError::Io(_))) => {
                warn!(error = %e, "Register command failed");
                writeln!(out, "error: {e}")?;
            }
            Err(e) => writeln!(out, "error: {e}")?,
        }
    }

    if !register.cart.is_empty() {
        writeln!(out, "Discarded a cart with {} line(s)", register.cart.len())?;
    }
    register.finish(out)
}

// ===========================================================================
// Tests
// ===========================================================================
