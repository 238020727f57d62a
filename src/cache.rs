//! Read-through snapshot of the four collections every view reads from.
//!
//! Views never query the database in the common path; they read the last
//! snapshot. [`AppCache::refresh`] re-fetches products, categories, recent
//! sales and points of sale in that order, replacing each collection as soon
//! as its query succeeds. A failure stops the refresh: collections already
//! replaced stay new, the rest keep their previous contents.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::db::{now_timestamp, DbState};
use crate::error::Result;
use crate::models::{Category, PointOfSale, Product, Sale};
use crate::points;
use crate::sales;

/// Sales kept in the snapshot.
pub const CACHED_SALES_LIMIT: usize = 1000;
/// Most suggestions returned for a partial entry.
pub const MAX_SUGGESTIONS: usize = 10;
/// Shorter scanner reads are treated as noise.
pub const MIN_BARCODE_LEN: usize = 3;

#[derive(Debug, Default)]
pub struct AppCache {
    pub products: Vec<Product>,
    pub categories: Vec<Category>,
    pub sales: Vec<Sale>,
    pub points: Vec<PointOfSale>,
    pub refreshed_at: Option<NaiveDateTime>,
}

impl AppCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache and load it once.
    pub fn load(db: &DbState) -> Result<Self> {
        let mut cache = Self::new();
        cache.refresh(db)?;
        Ok(cache)
    }

    pub fn refresh(&mut self, db: &DbState) -> Result<()> {
        let conn = db.lock()?;
        self.refresh_from(&conn)
    }

    pub fn refresh_from(&mut self, conn: &Connection) -> Result<()> {
        let result = self.refresh_inner(conn);
        match &result {
            Ok(()) => {
                self.refreshed_at = Some(now_timestamp());
                info!(
                    products = self.products.len(),
                    categories = self.categories.len(),
                    sales = self.sales.len(),
                    points = self.points.len(),
                    "Cache refreshed"
                );
            }
            Err(e) => warn!(error = %e, "Cache refresh failed; some collections are stale"),
        }
        result
    }

    fn refresh_inner(&mut self, conn: &Connection) -> Result<()> {
        self.products = catalog::list_products(conn)?;
        debug!(count = self.products.len(), "products reloaded");
        self.categories = catalog::list_categories(conn)?;
        debug!(count = self.categories.len(), "categories reloaded");
        self.sales = sales::list_sales(conn, CACHED_SALES_LIMIT)?;
        debug!(count = self.sales.len(), "sales reloaded");
        self.points = points::list_points(conn)?;
        debug!(count = self.points.len(), "points of sale reloaded");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn product(&self, id: i64) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    fn active_products(&self) -> impl Iterator<Item = &Product> {
        self.products.iter().filter(|p| p.active)
    }

    /// Scanner path: exact barcode among active products.
    pub fn find_by_barcode(&self, code: &str) -> Option<&Product> {
        let code = code.trim();
        if code.chars().count() < MIN_BARCODE_LEN {
            return None;
        }
        self.active_products().find(|p| p.barcode == code)
    }

    /// Typed entry: exact barcode, then exact name, then name substring.
    pub fn resolve_entry(&self, text: &str) -> Option<&Product> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let lowered = text.to_lowercase();
        self.active_products()
            .find(|p| p.barcode == text)
            .or_else(|| {
                self.active_products()
                    .find(|p| p.name.to_lowercase() == lowered)
            })
            .or_else(|| {
                self.active_products()
                    .find(|p| p.name.to_lowercase().contains(&lowered))
            })
    }

    /// Up to ten active products matching a partial name or barcode.
    ///
    /// Exact barcode matches rank first, then name matches, then names that
    /// start with the query; ties keep name order.
    pub fn suggestions(&self, query: &str) -> Vec<&Product> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let lowered = query.to_lowercase();
        let mut hits: Vec<(bool, bool, bool, &Product)> = self
            .active_products()
            .filter_map(|p| {
                let name = p.name.to_lowercase();
                let name_hit = name.contains(&lowered);
                let code_hit = p.barcode.to_lowercase().contains(&lowered);
                (name_hit || code_hit).then(|| {
                    (p.barcode == query, name_hit, name.starts_with(&lowered), p)
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            (b.0, b.1, b.2)
                .cmp(&(a.0, a.1, a.2))
                .then_with(|| a.3.name.cmp(&b.3.name))
        });
        hits.into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, _, _, p)| p)
            .collect()
    }

    pub fn category_name_taken(&self, name: &str, exclude_id: Option<i64>) -> bool {
        let lowered = name.trim().to_lowercase();
        self.categories
            .iter()
            .any(|c| Some(c.id) != exclude_id && c.name.to_lowercase() == lowered)
    }

    pub fn sales_on(&self, day: NaiveDate) -> Vec<&Sale> {
        self.sales
            .iter()
            .filter(|s| s.timestamp.date() == day)
            .collect()
    }

    pub fn default_point(&self) -> Option<&PointOfSale> {
        points::default_point(&self.points)
    }
}
