//! Register finalize action: cart to committed sale to ticket.

use rust_decimal::Decimal;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use tracing::{info, warn};

use crate::cache::AppCache;
use crate::cart::{Cart, StockShortfall};
use crate::db::DbState;
use crate::error::{PosError, Result};
use crate::models::Sale;
use crate::payment::{self, PaymentMethod};
use crate::sales::{self, NewSale};
use crate::ticket::{self, TicketDoc, TicketEvent, TicketJob};

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
    /// Cash handed over; `None` means exact.
    pub amount_received: Option<Decimal>,
    pub discount_percent: Decimal,
    /// Falls back to the cache's default point of sale.
    pub point_of_sale_id: Option<i64>,
}

impl CheckoutRequest {
    pub fn new(payment_method: PaymentMethod) -> Self {
        Self {
            payment_method,
            amount_received: None,
            discount_percent: Decimal::ZERO,
            point_of_sale_id: None,
        }
    }
}

#[derive(Debug)]
pub struct CheckoutOutcome {
    pub sale: Sale,
    /// Ticket thread; `None` when it could not be started.
    pub ticket: Option<JoinHandle<()>>,
    /// False when the post-commit cache refresh failed.
    pub cache_refreshed: bool,
}

/// Finalize the cart.
///
/// `confirm` is asked only when some line exceeds the cached stock; returning
/// `false` aborts before anything is written. On success the cart is cleared,
/// a detached ticket job is started and the cache is refreshed. A commit
/// failure leaves the cart untouched.
#[allow(clippy::too_many_arguments)]
pub fn finalize<F>(
    db: &DbState,
    cache: &mut AppCache,
    cart: &mut Cart,
    request: &CheckoutRequest,
    confirm: F,
    store_name: &str,
    job: &TicketJob,
    events: &Sender<TicketEvent>,
) -> Result<CheckoutOutcome>
where
    F: FnOnce(&[StockShortfall]) -> bool,
{
    let items = cart.sale_items();
    if items.is_empty() {
        return Err(PosError::EmptyCart);
    }

    let shortfalls = cart.stock_shortfalls();
    if !shortfalls.is_empty() {
        warn!(lines = shortfalls.len(), "Cart exceeds cached stock");
        if !confirm(&shortfalls) {
            return Err(PosError::StockWarningDeclined);
        }
    }

    let total = sales::apply_discount(sales::sale_subtotal(&items), request.discount_percent);
    payment::settle(total, request.payment_method, request.amount_received)?;

    let point_of_sale_id = request
        .point_of_sale_id
        .or_else(|| cache.default_point().map(|p| p.id));
    let new_sale = NewSale {
        point_of_sale_id,
        items,
        discount_percent: request.discount_percent,
        payment_method: request.payment_method,
        amount_received: request.amount_received,
    };
    let sale = {
        let conn = db.lock()?;
        sales::create_sale(&conn, &new_sale)?
    };
    info!(sale_id = sale.id, total = %sale.total, "Checkout complete");

    let ticket = match ticket::spawn_ticket_job(
        TicketDoc::from_sale(&sale, store_name),
        job.clone(),
        events.clone(),
    ) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(sale_id = sale.id, error = %e, "Could not start ticket job");
            None
        }
    };

    cart.clear();
    let cache_refreshed = match cache.refresh(db) {
        Ok(()) => true,
        Err(e) => {
            warn!(sale_id = sale.id, error = %e, "Sale committed but cache refresh failed");
            false
        }
    };

    Ok(CheckoutOutcome {
        sale,
        ticket,
        cache_refreshed,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
