//! Randomized sales generator for demos.
//!
//! One background thread builds weighted random carts from the live catalog,
//! commits them through [`sales::create_sale`] and writes a ticket per sale.
//! A sale that fails to commit becomes a demo sale: random id, not persisted,
//! still ticketed and flagged as such.
//!
//! Stopping is cooperative: the worker checks the shared flag once per sale
//! and every 100 ms while waiting between sales.

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::catalog;
use crate::db::{now_timestamp, DbState};
use crate::error::{PosError, Result};
use crate::models::{Product, SaleLine};
use crate::money::{line_subtotal, round_money};
use crate::payment::PaymentMethod;
use crate::points;
use crate::sales::{self, NewSale, SaleItem};
use crate::ticket::{self, TicketDoc, TicketJob};

const SLEEP_STEP: Duration = Duration::from_millis(100);
const STOP_TIMEOUT: Duration = Duration::from_secs(3);
const ERROR_PAUSE: Duration = Duration::from_secs(2);
const MAX_CONSECUTIVE_ERRORS: u32 = 5;
pub const MAX_TIME_SCALE: f64 = 1000.0;
const DEMO_ID_RANGE: std::ops::RangeInclusive<i64> = 10_000..=99_999;
const TOP_PRODUCTS: usize = 10;

const CART_SIZES: [usize; 5] = [1, 2, 3, 4, 5];
const CART_SIZE_WEIGHTS: [f64; 5] = [0.15, 0.25, 0.30, 0.20, 0.10];
const QUANTITIES: [i64; 3] = [1, 2, 3];
const QUANTITY_WEIGHTS: [f64; 3] = [0.80, 0.15, 0.05];
const METHODS: [PaymentMethod; 3] = [PaymentMethod::Cash, PaymentMethod::Card, PaymentMethod::Transfer];

// ---------------------------------------------------------------------------
// Weights and timing
// ---------------------------------------------------------------------------

pub fn category_weight(category: &str) -> f64 {
    match category {
        "Bebidas" => 0.22,
        "Lácteos" => 0.16,
        "Enlatados" => 0.07,
        "Limpieza" => 0.06,
        "Carnes" => 0.05,
        "Frutas" | "Verduras" => 0.02,
        _ => 0.04,
    }
}

/// Cheap, well-stocked products in popular categories sell more often.
pub fn product_weight(product: &Product) -> f64 {
    let price = product.price.to_f64().unwrap_or(0.0);
    let price_factor = (1.5 - price / 100.0).max(0.1);
    let stock_factor = (product.stock as f64 / 10.0).min(2.0);
    category_weight(&product.category_name) * price_factor * stock_factor
}

/// Cash / card / transfer weights for the hour of day.
pub fn payment_weights(hour: u32) -> [f64; 3] {
    match hour {
        6..=11 => [0.75, 0.20, 0.05],
        12..=17 => [0.60, 0.35, 0.05],
        _ => [0.50, 0.45, 0.05],
    }
}

/// Seconds between sales for the hour of day, before scaling.
pub fn delay_range(hour: u32) -> (f64, f64) {
    match hour {
        6..=9 => (120.0, 300.0),
        10..=13 => (30.0, 90.0),
        14..=16 => (60.0, 150.0),
        17..=19 => (25.0, 75.0),
        20..=21 => (90.0, 240.0),
        _ => (300.0, 600.0),
    }
}

pub fn weekend_factor(now: NaiveDateTime) -> f64 {
    if now.weekday().number_from_monday() >= 6 {
        0.7
    } else {
        1.0
    }
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub max_sales: usize,
    /// Multiplier on the waits between sales; 0 runs back to back.
    pub time_scale: f64,
    pub seed: Option<u64>,
    pub store_name: String,
    pub tickets: TicketJob,
    /// Falls back to the default point of sale.
    pub point_of_sale_id: Option<i64>,
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_sales == 0 {
            return Err(PosError::Simulator("at least one sale is required".into()));
        }
        if !self.time_scale.is_finite() || !(0.0..=MAX_TIME_SCALE).contains(&self.time_scale) {
            return Err(PosError::Simulator(format!(
                "time scale must be between 0 and {MAX_TIME_SCALE}, got {}",
                self.time_scale
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedSale {
    pub sale_id: i64,
    /// False for demo sales that never reached the database.
    pub real: bool,
    pub timestamp: NaiveDateTime,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub lines: Vec<SaleLine>,
    pub ticket: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Sale(SimulatedSale),
    Progress { done: usize, target: usize },
    Finished { generated: usize, target: usize, stopped: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopProduct {
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationStats {
    pub total: usize,
    pub real: usize,
    pub demo: usize,
    pub revenue: Decimal,
    pub average_ticket: Decimal,
    pub by_method: Vec<(PaymentMethod, usize)>,
    pub top_products: Vec<TopProduct>,
}

pub fn stats(sales: &[SimulatedSale]) -> SimulationStats {
    let real = sales.iter().filter(|s| s.real).count();
    let revenue: Decimal = sales.iter().map(|s| s.total).sum();
    let average_ticket = if sales.is_empty() {
        Decimal::ZERO
    } else {
        round_money(revenue / Decimal::from(sales.len() as i64))
    };

    let by_method = PaymentMethod::ALL
        .iter()
        .map(|m| (*m, sales.iter().filter(|s| s.payment_method == *m).count()))
        .filter(|(_, n)| *n > 0)
        .collect();

    let mut products: HashMap<i64, TopProduct> = HashMap::new();
    for line in sales.iter().flat_map(|s| &s.lines) {
        let entry = products.entry(line.product_id).or_insert_with(|| TopProduct {
            product_id: line.product_id,
            name: line.product_name.clone(),
            quantity: 0,
            revenue: Decimal::ZERO,
        });
        entry.quantity += line.quantity;
        entry.revenue += line.subtotal;
    }
    let mut top_products: Vec<TopProduct> = products.into_values().collect();
    top_products.sort_by(|a, b| {
        b.quantity
            .cmp(&a.quantity)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    top_products.truncate(TOP_PRODUCTS);

    SimulationStats {
        total: sales.len(),
        real,
        demo: sales.len() - real,
        revenue,
        average_ticket,
        by_method,
        top_products,
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Simulator {
    running: Arc<AtomicBool>,
    sales: Arc<Mutex<Vec<SimulatedSale>>>,
    handle: Option<JoinHandle<()>>,
}

impl Simulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start generating sales on a background thread.
    ///
    /// Fails when the config is invalid, a run is already active or no
    /// active product has stock.
    pub fn start(
        &mut self,
        db: Arc<DbState>,
        config: SimulatorConfig,
        events: Sender<SimEvent>,
    ) -> Result<()> {
        config.validate()?;
        if self.is_running() {
            return Err(PosError::Simulator("simulation already running".into()));
        }
        let products = {
            let conn = db.lock()?;
            catalog::list_sellable(&conn)?
        };
        if products.is_empty() {
            return Err(PosError::Simulator(
                "no active products with stock to simulate with".into(),
            ));
        }

        match self.sales.lock() {
            Ok(mut sales) => sales.clear(),
            Err(e) => return Err(PosError::Lock(e.to_string())),
        }
        self.running.store(true, Ordering::SeqCst);

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut worker = Worker {
            weights: products.iter().map(product_weight).collect(),
            products,
            db,
            config,
            rng,
            running: Arc::clone(&self.running),
            sales: Arc::clone(&self.sales),
            events,
        };

        let spawned = thread::Builder::new()
            .name("sales-simulator".into())
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Ask the worker to stop and wait up to three seconds for it.
    /// Returns whether the thread finished in time.
    pub fn stop(&mut self) -> bool {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let deadline = Instant::now() + STOP_TIMEOUT;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("Simulator thread did not stop within the timeout; detaching");
                return false;
            }
            thread::sleep(Duration::from_millis(20));
        }
        if handle.join().is_err() {
            error!("Simulator thread panicked");
        }
        true
    }

    /// Block until the current run ends on its own.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Simulator thread panicked");
            }
        }
    }

    /// Snapshot of the sales generated so far.
    pub fn sales(&self) -> Vec<SimulatedSale> {
        self.sales.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn stats(&self) -> SimulationStats {
        stats(&self.sales())
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct CartItem {
    product_id: i64,
    name: String,
    price: Decimal,
    quantity: i64,
}

struct Worker {
    db: Arc<DbState>,
    config: SimulatorConfig,
    rng: StdRng,
    products: Vec<Product>,
    weights: Vec<f64>,
    running: Arc<AtomicBool>,
    sales: Arc<Mutex<Vec<SimulatedSale>>>,
    events: Sender<SimEvent>,
}

impl Worker {
    fn run(&mut self) {
        let target = self.config.max_sales;
        info!(target, time_scale = self.config.time_scale, "Simulation started");
        let mut generated = 0;
        let mut failures = 0;

        while self.running.load(Ordering::SeqCst) && generated < target {
            match self.simulate_one() {
                Ok(Some(sale)) => {
                    failures = 0;
                    generated += 1;
                    if let Ok(mut sales) = self.sales.lock() {
                        sales.push(sale.clone());
                    }
                    let _ = self.events.send(SimEvent::Sale(sale));
                    let _ = self.events.send(SimEvent::Progress {
                        done: generated,
                        target,
                    });
                }
                Ok(None) => {
                    if self.products.is_empty() {
                        warn!("No stock left to simulate with");
                        break;
                    }
                }
                Err(e) => {
                    failures += 1;
                    error!(error = %e, failures, "Simulation step failed");
                    if failures >= MAX_CONSECUTIVE_ERRORS {
                        error!("Too many consecutive failures; giving up");
                        break;
                    }
                    self.pause(self.scaled(ERROR_PAUSE.as_secs_f64()));
                    continue;
                }
            }
            if generated < target {
                let delay = self.next_delay();
                debug!(seconds = delay.as_secs_f64(), "Waiting for next sale");
                self.pause(delay);
            }
        }

        let stopped = generated < target;
        self.running.store(false, Ordering::SeqCst);
        info!(generated, target, stopped, "Simulation finished");
        let _ = self.events.send(SimEvent::Finished {
            generated,
            target,
            stopped,
        });
    }

    /// Sleep in short steps so a stop request is seen promptly.
    fn pause(&self, total: Duration) {
        let start = Instant::now();
        while self.running.load(Ordering::SeqCst) {
            let elapsed = start.elapsed();
            if elapsed >= total {
                break;
            }
            thread::sleep((total - elapsed).min(SLEEP_STEP));
        }
    }

    fn next_delay(&mut self) -> Duration {
        let now = Local::now().naive_local();
        let (lo, hi) = delay_range(now.hour());
        let seconds = self.rng.gen_range(lo..hi) * weekend_factor(now);
        self.scaled(seconds)
    }

    fn scaled(&self, seconds: f64) -> Duration {
        Duration::try_from_secs_f64((seconds * self.config.time_scale).max(0.0))
            .unwrap_or(Duration::ZERO)
    }

    fn pick_payment(&mut self) -> PaymentMethod {
        let weights = payment_weights(Local::now().hour());
        match WeightedIndex::new(weights) {
            Ok(dist) => METHODS[dist.sample(&mut self.rng)],
            Err(_) => PaymentMethod::Cash,
        }
    }

    fn reload_products(&mut self) -> Result<()> {
        let conn = self.db.lock()?;
        self.products = catalog::list_sellable(&conn)?;
        self.weights = self.products.iter().map(product_weight).collect();
        Ok(())
    }

    /// Current stock of an active product, read fresh.
    fn fresh(&self, product_id: i64) -> Result<Option<Product>> {
        let conn = self.db.lock()?;
        Ok(catalog::find_product(&conn, product_id)?.filter(|p| p.active))
    }

    fn build_cart(&mut self) -> Result<Vec<CartItem>> {
        let size_dist = WeightedIndex::new(CART_SIZE_WEIGHTS)
            .map_err(|e| PosError::Simulator(e.to_string()))?;
        let qty_dist = WeightedIndex::new(QUANTITY_WEIGHTS)
            .map_err(|e| PosError::Simulator(e.to_string()))?;
        let wanted = CART_SIZES[size_dist.sample(&mut self.rng)];

        let mut tried = HashSet::new();
        let mut cart = Vec::new();
        for _ in 0..wanted {
            let candidates: Vec<usize> = (0..self.products.len())
                .filter(|&i| !tried.contains(&self.products[i].id) && self.products[i].stock > 0)
                .collect();
            if candidates.is_empty() {
                break;
            }
            let Ok(dist) = WeightedIndex::new(candidates.iter().map(|&i| self.weights[i])) else {
                break;
            };
            let chosen = self.products[candidates[dist.sample(&mut self.rng)]].id;
            tried.insert(chosen);

            let Some(product) = self.fresh(chosen)?.filter(|p| p.stock >= 1) else {
                continue;
            };
            let quantity = QUANTITIES[qty_dist.sample(&mut self.rng)].min(product.stock.min(3));
            let Some(product) = self.fresh(chosen)?.filter(|p| p.stock >= quantity) else {
                continue;
            };
            cart.push(CartItem {
                product_id: product.id,
                name: product.name,
                price: product.price,
                quantity,
            });
        }
        Ok(cart)
    }

    fn simulate_one(&mut self) -> Result<Option<SimulatedSale>> {
        let cart = self.build_cart()?;
        if cart.is_empty() {
            warn!("Could not build a cart with available stock");
            self.reload_products()?;
            return Ok(None);
        }
        let method = self.pick_payment();
        let point_of_sale_id = match self.config.point_of_sale_id {
            Some(id) => Some(id),
            None => {
                let conn = self.db.lock()?;
                points::default_point(&points::list_points(&conn)?).map(|p| p.id)
            }
        };

        let mut new_sale = NewSale::new(
            cart.iter()
                .map(|c| SaleItem {
                    product_id: c.product_id,
                    quantity: c.quantity,
                    unit_price: c.price,
                })
                .collect(),
            method,
        );
        new_sale.point_of_sale_id = point_of_sale_id;

        let committed = {
            let conn = self.db.lock()?;
            sales::create_sale(&conn, &new_sale)
        };
        let (doc, real) = match committed {
            Ok(sale) => (TicketDoc::from_sale(&sale, &self.config.store_name), true),
            Err(e) => {
                error!(error = %e, "Simulated sale failed to commit; recording demo sale");
                (self.demo_ticket(&cart, method), false)
            }
        };

        let ticket = match ticket::write_ticket(
            &doc,
            &self.config.tickets.dir,
            self.config.tickets.backend,
            &self.config.tickets.prefix,
        ) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(sale_id = doc.sale_id, error = %e, "Simulation ticket failed");
                None
            }
        };

        if real {
            self.reload_products()?;
        }

        Ok(Some(SimulatedSale {
            sale_id: doc.sale_id,
            real,
            timestamp: doc.timestamp,
            total: doc.total,
            payment_method: method,
            lines: doc.lines,
            ticket,
        }))
    }

    fn demo_ticket(&mut self, cart: &[CartItem], method: PaymentMethod) -> TicketDoc {
        let lines: Vec<SaleLine> = cart
            .iter()
            .map(|c| SaleLine {
                product_id: c.product_id,
                product_name: c.name.clone(),
                quantity: c.quantity,
                unit_price: c.price,
                subtotal: line_subtotal(c.price, c.quantity),
            })
            .collect();
        let total = round_money(lines.iter().map(|l| l.subtotal).sum());
        TicketDoc {
            store_name: self.config.store_name.clone(),
            sale_id: self.rng.gen_range(DEMO_ID_RANGE),
            timestamp: now_timestamp(),
            lines,
            total,
            discount_percent: Decimal::ZERO,
            payment_method: method,
            amount_received: total,
            change: Decimal::ZERO,
            demo: true,
        }
    }
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
    use crate::ticket::TicketBackend;
    use std::sync::mpsc;

    fn seeded_db() -> Arc<DbState> {
        let state = db::test_state();
        {
            let conn = state.lock().expect("lock");
            let bebidas = catalog::add_category(&conn, "Bebidas", "").expect("category");
            for (name, price, stock) in [("Agua", "1.00", 50), ("Soda", "1.50", 40), ("Jugo", "2.00", 30)] {
                let mut p = NewProduct::new(name, dec(price), stock);
                p.category_id = Some(bebidas);
                catalog::add_product(&conn, &p).expect("product");
            }
        }
        Arc::new(state)
    }

    fn config(dir: &std::path::Path, max_sales: usize, time_scale: f64) -> SimulatorConfig {
        SimulatorConfig {
            max_sales,
            time_scale,
            seed: Some(7),
            store_name: "KIOSKO PRO".into(),
            tickets: TicketJob {
                dir: dir.to_path_buf(),
                backend: TicketBackend::Html,
                prefix: "venta_sim".into(),
                open: false,
            },
            point_of_sale_id: None,
        }
    }

    fn total_stock(db: &DbState) -> i64 {
        let conn = db.lock().expect("lock");
        conn.query_row("SELECT SUM(stock) FROM productos", [], |r| r.get(0))
            .expect("sum")
    }

    #[test]
    fn weights_follow_category_price_and_stock() {
        let mut p = Product {
            id: 1,
            barcode: "1".into(),
            name: "Agua".into(),
            price: dec("50"),
            stock: 5,
            category_id: None,
            category_name: "Bebidas".into(),
            min_stock: 0,
            supplier: String::new(),
            active: true,
        };
        assert!((product_weight(&p) - 0.22 * 1.0 * 0.5).abs() < 1e-9);
        p.price = dec("1000");
        p.stock = 500;
        assert!((product_weight(&p) - 0.22 * 0.1 * 2.0).abs() < 1e-9);
        p.category_name = "Ferretería".into();
        assert!((product_weight(&p) - 0.04 * 0.1 * 2.0).abs() < 1e-9);
    }

    #[test]
    fn hour_bands() {
        assert_eq!(payment_weights(8), [0.75, 0.20, 0.05]);
        assert_eq!(payment_weights(12), [0.60, 0.35, 0.05]);
        assert_eq!(payment_weights(23), [0.50, 0.45, 0.05]);
        assert_eq!(delay_range(6), (120.0, 300.0));
        assert_eq!(delay_range(13), (30.0, 90.0));
        assert_eq!(delay_range(18), (25.0, 75.0));
        assert_eq!(delay_range(3), (300.0, 600.0));
    }

    #[test]
    fn seeded_run_commits_sales_and_tickets() {
        let db = seeded_db();
        let dir = tempfile::tempdir().expect("tempdir");
        let before = total_stock(&db);
        let (tx, rx) = mpsc::channel();

        let mut sim = Simulator::new();
        sim.start(Arc::clone(&db), config(dir.path(), 3, 0.0), tx)
            .expect("start");
        sim.wait();

        let sales = sim.sales();
        assert_eq!(sales.len(), 3);
        assert!(sales.iter().all(|s| s.real));
        assert!(sales.iter().all(|s| s.ticket.as_ref().is_some_and(|p| p.exists())));
        assert!(sales
            .iter()
            .all(|s| (1..=5).contains(&s.lines.len()) && s.lines.iter().all(|l| (1..=3).contains(&l.quantity))));

        let sold: i64 = sales.iter().flat_map(|s| &s.lines).map(|l| l.quantity).sum();
        assert_eq!(total_stock(&db), before - sold);

        let events: Vec<SimEvent> = rx.try_iter().collect();
        assert!(matches!(
            events.last(),
            Some(SimEvent::Finished { generated: 3, target: 3, stopped: false })
        ));

        let stats = sim.stats();
        assert_eq!((stats.total, stats.real, stats.demo), (3, 3, 0));
        assert_eq!(stats.revenue, sales.iter().map(|s| s.total).sum::<Decimal>());
        assert!(!stats.top_products.is_empty());
    }

    #[test]
    fn failed_commits_become_demo_sales() {
        let db = seeded_db();
        {
            let conn = db.lock().expect("lock");
            conn.execute_batch(
                "PRAGMA foreign_keys = OFF;
                 DROP TABLE movimientos_stock; DROP TABLE detalle_venta; DROP TABLE ventas;",
            )
            .expect("drop");
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, _rx) = mpsc::channel();
        let mut sim = Simulator::new();
        sim.start(Arc::clone(&db), config(dir.path(), 2, 0.0), tx)
            .expect("start");
        sim.wait();

        let sales = sim.sales();
        assert_eq!(sales.len(), 2);
        assert!(sales.iter().all(|s| !s.real && DEMO_ID_RANGE.contains(&s.sale_id)));
        assert_eq!(sim.stats().demo, 2);
    }

    #[test]
    fn stop_interrupts_the_wait_between_sales() {
        let db = seeded_db();
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, rx) = mpsc::channel();
        let mut sim = Simulator::new();
        sim.start(Arc::clone(&db), config(dir.path(), 100, 1.0), tx)
            .expect("start");
        assert!(sim.is_running());

        // First sale happens immediately; the worker then waits 25+ seconds.
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).expect("event") {
                SimEvent::Sale(_) => break,
                _ => continue,
            }
        }
        let started = Instant::now();
        assert!(sim.stop());
        assert!(started.elapsed() < STOP_TIMEOUT);
        assert!(!sim.is_running());
        assert_eq!(sim.sales().len(), 1);
    }

    #[test]
    fn start_requires_sellable_products() {
        let db = Arc::new(db::test_state());
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, _rx) = mpsc::channel();
        let err = Simulator::new()
            .start(db, config(dir.path(), 1, 0.0), tx)
            .expect_err("no products");
        assert!(matches!(err, PosError::Simulator(_)));
    }

    #[test]
    fn start_rejects_bad_time_scales_and_counts() {
        let db = seeded_db();
        let dir = tempfile::tempdir().expect("tempdir");
        for scale in [-1.0, f64::NAN, f64::INFINITY, 1e300, MAX_TIME_SCALE + 1.0] {
            let (tx, _rx) = mpsc::channel();
            let mut sim = Simulator::new();
            let err = sim
                .start(Arc::clone(&db), config(dir.path(), 1, scale), tx)
                .expect_err("bad scale");
            assert!(matches!(err, PosError::Simulator(_)), "{scale}: {err}");
            assert!(!sim.is_running());
        }
        let (tx, _rx) = mpsc::channel();
        assert!(Simulator::new()
            .start(Arc::clone(&db), config(dir.path(), 0, 0.0), tx)
            .is_err());
        assert!(config(dir.path(), 1, MAX_TIME_SCALE).validate().is_ok());
    }

    #[test]
    fn repeated_failures_end_the_run() {
        let db = seeded_db();
        {
            let conn = db.lock().expect("lock");
            conn.execute_batch("PRAGMA foreign_keys = OFF; DROP TABLE puntos_venta;")
                .expect("drop");
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, rx) = mpsc::channel();
        let mut sim = Simulator::new();
        sim.start(Arc::clone(&db), config(dir.path(), 3, 0.0), tx)
            .expect("start");

        let finished = rx
            .iter()
            .find(|e| matches!(e, SimEvent::Finished { .. }))
            .expect("finished event");
        sim.wait();
        assert_eq!(
            finished,
            SimEvent::Finished { generated: 0, target: 3, stopped: true }
        );
        assert!(!sim.is_running());
        assert!(sim.sales().is_empty());
    }

    #[test]
    fn stats_of_nothing() {
        let s = stats(&[]);
        assert_eq!(s.total, 0);
        assert_eq!(s.average_ticket, Decimal::ZERO);
        assert!(s.by_method.is_empty());
    }
}
