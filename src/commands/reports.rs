//! Dashboard view and Excel exports.

use chrono::Local;
use serde_json::json;
use std::io::Write;

use super::Context;
use crate::auth::Section;
use crate::cli::ReportCmd;
use crate::dashboard;
use crate::db::now_timestamp;
use crate::error::Result;
use crate::reports::{self, default_report_path};

pub fn dashboard(ctx: &mut Context, out: &mut dyn Write) -> Result<()> {
    ctx.require(Section::Dashboard)?;
    let metrics = dashboard::compute(&ctx.cache, Local::now().date_naive());
    ctx.emit(out, &metrics, metrics.render())
}

pub fn export(ctx: &mut Context, action: ReportCmd, out: &mut dyn Write) -> Result<()> {
    let reports_dir = ctx.config.data_dir.join("reports");
    let (kind, path, rows) = match action {
        ReportCmd::Sales { out: target } => {
            ctx.require(Section::SalesHistory)?;
            let path = target
                .unwrap_or_else(|| default_report_path(&reports_dir, "reporte_ventas", now_timestamp()));
            let conn = ctx.db.lock()?;
            let rows = reports::export_sales_report(&conn, &path)?;
            ("sales", path, rows)
        }
        ReportCmd::Stock { out: target } => {
            ctx.require(Section::Products)?;
            let path = target
                .unwrap_or_else(|| default_report_path(&reports_dir, "reporte_stock", now_timestamp()));
            let conn = ctx.db.lock()?;
            let rows = reports::export_stock_report(&conn, &path)?;
            ("stock", path, rows)
        }
    };
    let message = format!("{kind} report with {rows} row(s) saved to {}", path.display());
    ctx.emit(
        out,
        &json!({ "report": kind, "path": path, "rows": rows }),
        vec![message],
    )
}

// ===========================================================================
// Tests
// ===========================================================================
