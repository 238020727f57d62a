//! Dashboard metrics, computed from the cache only.

use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::cache::AppCache;
use crate::money::format_money;

/// Active products under this stock are listed as low.
pub const DASHBOARD_LOW_STOCK: i64 = 10;
pub const SERIES_DAYS: i64 = 7;
const BAR_WIDTH: usize = 40;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowStockItem {
    pub product_id: i64,
    pub name: String,
    pub stock: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTotal {
    pub date: NaiveDate,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardMetrics {
    pub total_products: usize,
    pub sales_today: usize,
    pub revenue_today: Decimal,
    /// Sum over every cached sale.
    pub recent_revenue: Decimal,
    pub low_stock: Vec<LowStockItem>,
    /// Oldest first, ending at `today`.
    pub last_days: Vec<DayTotal>,
}

pub fn compute(cache: &AppCache, today: NaiveDate) -> DashboardMetrics {
    let todays = cache.sales_on(today);

    let mut low_stock: Vec<LowStockItem> = cache
        .products
        .iter()
        .filter(|p| p.active && p.stock < DASHBOARD_LOW_STOCK)
        .map(|p| LowStockItem {
            product_id: p.id,
            name: p.name.clone(),
            stock: p.stock,
        })
        .collect();
    low_stock.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));

    let first_day = today - Duration::days(SERIES_DAYS - 1);
    let mut by_day: BTreeMap<NaiveDate, Decimal> = (0..SERIES_DAYS)
        .map(|i| (first_day + Duration::days(i), Decimal::ZERO))
        .collect();
    for sale in &cache.sales {
        if let Some(total) = by_day.get_mut(&sale.timestamp.date()) {
            *total += sale.total;
        }
    }

    DashboardMetrics {
        total_products: cache.products.len(),
        sales_today: todays.len(),
        revenue_today: todays.iter().map(|s| s.total).sum(),
        recent_revenue: cache.sales.iter().map(|s| s.total).sum(),
        low_stock,
        last_days: by_day
            .into_iter()
            .map(|(date, total)| DayTotal { date, total })
            .collect(),
    }
}

/// Horizontal bars scaled to the best day.
pub fn render_chart(days: &[DayTotal]) -> Vec<String> {
    let max = days
        .iter()
        .map(|d| d.total)
        .max()
        .unwrap_or(Decimal::ZERO);
    days.iter()
        .map(|d| {
            let len = if max.is_zero() {
                0
            } else {
                (d.total / max * Decimal::from(BAR_WIDTH as i64))
                    .round()
                    .to_usize()
                    .unwrap_or(0)
            };
            format!(
                "{} {:<BAR_WIDTH$} {:>12}",
                d.date.format("%a %d/%m"),
                "#".repeat(len),
                format_money(d.total)
            )
        })
        .collect()
}

impl DashboardMetrics {
    pub fn render(&self) -> Vec<String> {
        let mut out = vec![
            format!("Products:        {}", self.total_products),
            format!(
                "Sales today:     {} ({})",
                self.sales_today,
                format_money(self.revenue_today)
            ),
            format!("Recent revenue:  {}", format_money(self.recent_revenue)),
            String::new(),
            format!("Last {SERIES_DAYS} days:"),
        ];
        out.extend(render_chart(&self.last_days));
        out.push(String::new());
        if self.low_stock.is_empty() {
            out.push("No products with low stock.".into());
        } else {
            out.push(format!("Low stock ({}):", self.low_stock.len()));
            out.extend(
                self.low_stock
                    .iter()
                    .map(|i| format!("  {:>5}  {}", i.stock, i.name)),
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Product, Sale};
    use crate::money::dec;
    use crate::payment::PaymentMethod;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).expect("date")
    }

    fn sale(id: i64, d: u32, total: &str) -> Sale {
        Sale {
            id,
            timestamp: day(d).and_hms_opt(12, 0, 0).expect("time"),
            total: dec(total),
            discount_percent: Decimal::ZERO,
            payment_method: PaymentMethod::Cash,
            amount_received: dec(total),
            change: Decimal::ZERO,
            point_of_sale_id: None,
            item_count: 1,
            lines: Vec::new(),
        }
    }

    fn product(id: i64, name: &str, stock: i64, active: bool) -> Product {
        Product {
            id,
            barcode: format!("{id}"),
            name: name.into(),
            price: dec("1.00"),
            stock,
            category_id: None,
            category_name: String::new(),
            min_stock: 0,
            supplier: String::new(),
            active,
        }
    }

    fn cache() -> AppCache {
        AppCache {
            products: vec![
                product(1, "Leche", 3, true),
                product(2, "Pan", 50, true),
                product(3, "Yerba", 0, true),
                product(4, "Viejo", 1, false),
            ],
            sales: vec![
                sale(1, 17, "10.00"),
                sale(2, 17, "5.50"),
                sale(3, 15, "20.00"),
                sale(4, 1, "99.00"),
            ],
            ..AppCache::default()
        }
    }

    #[test]
    fn metrics_come_from_the_cache() {
        let m = compute(&cache(), day(17));
        assert_eq!(m.total_products, 4);
        assert_eq!(m.sales_today, 2);
        assert_eq!(m.revenue_today, dec("15.50"));
        assert_eq!(m.recent_revenue, dec("134.50"));
        let low: Vec<&str> = m.low_stock.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(low, vec!["Yerba", "Leche"]);
    }

    #[test]
    fn series_is_zero_filled_oldest_first() {
        let m = compute(&cache(), day(17));
        assert_eq!(m.last_days.len(), 7);
        assert_eq!(m.last_days[0].date, day(11));
        assert_eq!(m.last_days[6].date, day(17));
        assert_eq!(m.last_days[4].total, dec("20.00"));
        assert_eq!(m.last_days[6].total, dec("15.50"));
        assert!(m.last_days[0].total.is_zero());
    }

    #[test]
    fn chart_scales_to_best_day() {
        let m = compute(&cache(), day(17));
        let chart = render_chart(&m.last_days);
        assert_eq!(chart.len(), 7);
        assert_eq!(chart[4].matches('#').count(), BAR_WIDTH);
        assert_eq!(chart[6].matches('#').count(), 31);
        assert_eq!(chart[0].matches('#').count(), 0);

        let empty = compute(&AppCache::default(), day(17));
        assert!(render_chart(&empty.last_days)
            .iter()
            .all(|l| !l.contains('#')));
        assert!(empty.render().iter().any(|l| l == "No products with low stock."));
    }
}
