//! Foreground driver for the sales simulator.

use serde::Serialize;
use std::io::Write;
use std::sync::{mpsc, Arc};
use tracing::info;

use super::Context;
use crate::auth::Section;
use crate::cli::SimulateArgs;
use crate::db::format_timestamp;
use crate::error::Result;
use crate::money::format_money;
use crate::simulator::{SimEvent, SimulatedSale, SimulationStats, Simulator, SimulatorConfig};
use crate::ticket::TicketJob;

#[derive(Serialize)]
struct SimulationReport {
    sales: Vec<SimulatedSale>,
    stats: SimulationStats,
    stopped: bool,
}

fn sale_line(sale: &SimulatedSale) -> String {
    format!(
        "#{:<6} {}  {:>10}  {:<14} {} line(s){}",
        sale.sale_id,
        format_timestamp(&sale.timestamp),
        format_money(sale.total),
        sale.payment_method.label(),
        sale.lines.len(),
        if sale.real { "" } else { "  [demo]" }
    )
}

fn stats_lines(stats: &SimulationStats) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Generated {} sale(s): {} recorded, {} demo",
            stats.total, stats.real, stats.demo
        ),
        format!("Revenue:        {}", format_money(stats.revenue)),
        format!("Average ticket: {}", format_money(stats.average_ticket)),
    ];
    for (method, count) in &stats.by_method {
        lines.push(format!("  {:<14} {count}", method.label()));
    }
    if !stats.top_products.is_empty() {
        lines.push("Top products:".into());
        lines.extend(
            stats
                .top_products
                .iter()
                .map(|p| format!("  {:>4}  {:<32} {:>10}", p.quantity, p.name, format_money(p.revenue))),
        );
    }
    lines
}

pub fn run(ctx: &mut Context, args: SimulateArgs, out: &mut dyn Write) -> Result<()> {
    ctx.require(Section::Simulator)?;
    let config = SimulatorConfig {
        max_sales: args.count,
        time_scale: args.time_scale,
        seed: args.seed,
        store_name: ctx.config.store_name.clone(),
        tickets: TicketJob {
            dir: ctx.config.simulation_tickets_dir.clone(),
            backend: ctx.config.ticket_backend,
            prefix: "venta_sim".into(),
            open: false,
        },
        point_of_sale_id: None,
    };
    let (tx, rx) = mpsc::channel();
    let mut simulator = Simulator::new();
    simulator.start(Arc::clone(&ctx.db), config, tx)?;
    info!(target_sales = args.count, "Simulation started");

    let mut stopped = false;
    for event in rx.iter() {
        match event {
            SimEvent::Sale(sale) if !ctx.json => writeln!(out, "{}", sale_line(&sale))?,
            SimEvent::Sale(_) | SimEvent::Progress { .. } => {}
            SimEvent::Finished {
                generated,
                target,
                stopped: interrupted,
            } => {
                info!(generated, target, "Simulation finished");
                stopped = interrupted;
                break;
            }
        }
    }
    simulator.wait();
    ctx.refresh_cache();

    let report = SimulationReport {
        sales: simulator.sales(),
        stats: simulator.stats(),
        stopped,
    };
    ctx.emit(out, &report, stats_lines(&report.stats))
}

// ===========================================================================
// Tests
// ===========================================================================
