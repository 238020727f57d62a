//! Customer tickets (receipts).
//!
//! A sale is laid out once as fixed-width text lines, then handed to one of
//! two interchangeable renderers: PDF (Courier on A4, paginated) or an HTML
//! page with the same text in a `<pre>` block. Rendering runs on a detached
//! thread per sale and reports back through a channel.

use chrono::{Local, NaiveDateTime};
use pdf_writer::{Content, Finish, Name, Pdf, Rect, Ref, Str, TextStr};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

use crate::error::{PosError, Result};
use crate::models::{Sale, SaleLine};
use crate::money::format_money;
use crate::payment::PaymentMethod;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

const QTY_WIDTH: usize = 5;
const NAME_WIDTH: usize = 40;
const PRICE_WIDTH: usize = 10;
const SUBTOTAL_WIDTH: usize = 11;
/// Characters per ticket line.
pub const TICKET_WIDTH: usize = QTY_WIDTH + NAME_WIDTH + PRICE_WIDTH + SUBTOTAL_WIDTH + 3;
const NAME_TRUNCATE_AT: usize = NAME_WIDTH - 3;

pub const FOOTER: &str = "*** THANK YOU FOR YOUR PURCHASE ***";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketDoc {
    pub store_name: String,
    pub sale_id: i64,
    pub timestamp: NaiveDateTime,
    pub lines: Vec<SaleLine>,
    pub total: Decimal,
    pub discount_percent: Decimal,
    pub payment_method: PaymentMethod,
    pub amount_received: Decimal,
    pub change: Decimal,
    /// Simulated sale that never reached the database.
    pub demo: bool,
}

impl TicketDoc {
    pub fn from_sale(sale: &Sale, store_name: &str) -> Self {
        Self {
            store_name: store_name.to_string(),
            sale_id: sale.id,
            timestamp: sale.timestamp,
            lines: sale.lines.clone(),
            total: sale.total,
            discount_percent: sale.discount_percent,
            payment_method: sale.payment_method,
            amount_received: sale.amount_received,
            change: sale.change,
            demo: false,
        }
    }
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() > NAME_WIDTH {
        let mut short: String = name.chars().take(NAME_TRUNCATE_AT).collect();
        short.push_str("...");
        short
    } else {
        name.to_string()
    }
}

fn center(text: &str) -> String {
    let len = text.chars().count();
    if len >= TICKET_WIDTH {
        return text.to_string();
    }
    format!("{}{}", " ".repeat((TICKET_WIDTH - len) / 2), text)
}

fn right(text: &str) -> String {
    format!("{text:>TICKET_WIDTH$}")
}

/// Lay a ticket out as fixed-width lines.
pub fn layout(doc: &TicketDoc) -> Vec<String> {
    let rule = "-".repeat(TICKET_WIDTH);
    let mut out = vec![
        center(&doc.store_name),
        String::new(),
        format!("Ticket #: {}", doc.sale_id),
        format!("Date: {}", doc.timestamp.format("%d/%m/%Y %H:%M:%S")),
    ];
    if doc.demo {
        out.push(center("*** DEMO SALE - NOT RECORDED ***"));
    }
    out.push(rule.clone());
    out.push(format!(
        "{:<QTY_WIDTH$} {:<NAME_WIDTH$} {:>PRICE_WIDTH$} {:>SUBTOTAL_WIDTH$}",
        "Qty", "Product", "Price", "Subtotal"
    ));
    out.push(rule.clone());

    for line in &doc.lines {
        out.push(format!(
            "{:<QTY_WIDTH$} {:<NAME_WIDTH$} {:>PRICE_WIDTH$} {:>SUBTOTAL_WIDTH$}",
            line.quantity,
            truncate_name(&line.product_name),
            format_money(line.unit_price),
            format_money(line.subtotal),
        ));
    }

    out.push(rule.clone());
    if !doc.discount_percent.is_zero() {
        out.push(right(&format!("Discount: {}%", doc.discount_percent.normalize())));
    }
    out.push(right(&format!("TOTAL: {}", format_money(doc.total))));
    out.push(String::new());
    out.push(format!("Payment method: {}", doc.payment_method.label()));
    if doc.payment_method.is_cash() {
        out.push(format!("Received: {}", format_money(doc.amount_received)));
        out.push(format!("Change: {}", format_money(doc.change)));
    }
    out.push(rule);
    out.push(center(FOOTER));
    out
}

// ---------------------------------------------------------------------------
// Renderers
// ---------------------------------------------------------------------------

pub trait TicketRenderer: Send + Sync {
    fn name(&self) -> &'static str;
    fn extension(&self) -> &'static str;
    fn render(&self, title: &str, lines: &[String]) -> Result<Vec<u8>>;
}

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 40.0;
const FONT_SIZE: f32 = 10.0;
const LEADING: f32 = 12.0;
const FONT_NAME: Name<'static> = Name(b"F1");

pub struct PdfRenderer;

impl PdfRenderer {
    pub fn lines_per_page() -> usize {
        ((PAGE_HEIGHT - 2.0 * MARGIN) / LEADING) as usize
    }
}

/// Map text to WinAnsi bytes; anything outside Latin-1 becomes `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '€' => 0x80,
            _ => b'?',
        })
        .collect()
}

impl TicketRenderer for PdfRenderer {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extension(&self) -> &'static str {
        "pdf"
    }

    fn render(&self, title: &str, lines: &[String]) -> Result<Vec<u8>> {
        let per_page = Self::lines_per_page();
        let pages: Vec<&[String]> = if lines.is_empty() {
            vec![&[]]
        } else {
            lines.chunks(per_page).collect()
        };

        let catalog_id = Ref::new(1);
        let tree_id = Ref::new(2);
        let font_id = Ref::new(3);
        let info_id = Ref::new(4);
        let page_ids: Vec<Ref> = (0..pages.len())
            .map(|i| Ref::new(5 + 2 * i as i32))
            .collect();
        let content_ids: Vec<Ref> = (0..pages.len())
            .map(|i| Ref::new(6 + 2 * i as i32))
            .collect();

        let mut pdf = Pdf::new();
        pdf.catalog(catalog_id).pages(tree_id);
        pdf.pages(tree_id)
            .kids(page_ids.iter().copied())
            .count(page_ids.len() as i32);
        pdf.type1_font(font_id)
            .base_font(Name(b"Courier"))
            .encoding_predefined(Name(b"WinAnsiEncoding"));
        pdf.document_info(info_id)
            .title(TextStr(title))
            .creator(TextStr("Kiosko POS"));

        for (i, chunk) in pages.iter().enumerate() {
            let mut page = pdf.page(page_ids[i]);
            page.media_box(Rect::new(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT));
            page.parent(tree_id);
            page.contents(content_ids[i]);
            page.resources().fonts().pair(FONT_NAME, font_id);
            page.finish();

            let mut content = Content::new();
            content.begin_text();
            content.set_font(FONT_NAME, FONT_SIZE);
            content.next_line(MARGIN, PAGE_HEIGHT - MARGIN - FONT_SIZE);
            for (j, line) in chunk.iter().enumerate() {
                if j > 0 {
                    content.next_line(0.0, -LEADING);
                }
                content.show(Str(&encode_win_ansi(line)));
            }
            content.end_text();
            pdf.stream(content_ids[i], &content.finish());
        }

        Ok(pdf.finish())
    }
}

pub struct HtmlRenderer;

fn esc(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn html_shell(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8"/>
<title>{}</title>
<style>
body {{ margin: 0; padding: 16px; background: #fff; color: #111; }}
pre {{ font-family: ui-monospace, SFMono-Regular, Menlo, Courier, monospace; font-size: 12px; }}
</style>
</head>
<body><pre>{}</pre></body>
</html>"#,
        esc(title),
        body
    )
}

impl TicketRenderer for HtmlRenderer {
    fn name(&self) -> &'static str {
        "html"
    }

    fn extension(&self) -> &'static str {
        "html"
    }

    fn render(&self, title: &str, lines: &[String]) -> Result<Vec<u8>> {
        let body = lines.iter().map(|l| esc(l)).collect::<Vec<_>>().join("\n");
        Ok(html_shell(title, &body).into_bytes())
    }
}

// ---------------------------------------------------------------------------
// Backend selection and file output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketBackend {
    /// PDF first, HTML when PDF output fails.
    Auto,
    Pdf,
    Html,
}

impl TicketBackend {
    pub fn renderers(self) -> Vec<Box<dyn TicketRenderer>> {
        match self {
            Self::Auto => vec![Box::new(PdfRenderer), Box::new(HtmlRenderer)],
            Self::Pdf => vec![Box::new(PdfRenderer)],
            Self::Html => vec![Box::new(HtmlRenderer)],
        }
    }
}

impl fmt::Display for TicketBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Pdf => "pdf",
            Self::Html => "html",
        })
    }
}

impl FromStr for TicketBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "pdf" => Ok(Self::Pdf),
            "html" => Ok(Self::Html),
            other => Err(format!("unknown ticket backend '{other}' (auto, pdf, html)")),
        }
    }
}

/// Render `doc` into `dir` as `<prefix>_<sale id>_<YYYYmmdd_HHMMSS>.<ext>`.
///
/// Renderers are tried in backend order; the first file written wins.
pub fn write_ticket(
    doc: &TicketDoc,
    dir: &Path,
    backend: TicketBackend,
    prefix: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let lines = layout(doc);
    let title = format!("{} - ticket {}", doc.store_name, doc.sale_id);
    let stamp = Local::now().format("%Y%m%d_%H%M%S");

    let mut failures = Vec::new();
    for renderer in backend.renderers() {
        let path = dir.join(format!(
            "{prefix}_{}_{stamp}.{}",
            doc.sale_id,
            renderer.extension()
        ));
        let written = renderer
            .render(&title, &lines)
            .and_then(|bytes| fs::write(&path, bytes).map_err(PosError::from));
        match written {
            Ok(()) => {
                info!(sale_id = doc.sale_id, path = %path.display(), renderer = renderer.name(), "Ticket written");
                return Ok(path);
            }
            Err(e) => {
                warn!(sale_id = doc.sale_id, renderer = renderer.name(), error = %e, "Ticket renderer failed");
                failures.push(format!("{}: {e}", renderer.name()));
            }
        }
    }
    Err(PosError::Ticket(failures.join("; ")))
}

// ---------------------------------------------------------------------------
// Background job
// ---------------------------------------------------------------------------

/// Outcome of a ticket job, delivered to the thread that owns the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum TicketEvent {
    Ready { sale_id: i64, path: PathBuf },
    Failed { sale_id: i64, error: String },
}

#[derive(Debug, Clone)]
pub struct TicketJob {
    pub dir: PathBuf,
    pub backend: TicketBackend,
    pub prefix: String,
    /// Open the file with the system viewer after writing it.
    pub open: bool,
}

/// Render a ticket on a detached thread.
///
/// The returned handle may be dropped; the committed sale never depends on
/// the outcome, which only travels through `events`.
pub fn spawn_ticket_job(
    doc: TicketDoc,
    job: TicketJob,
    events: Sender<TicketEvent>,
) -> Result<JoinHandle<()>> {
    let sale_id = doc.sale_id;
    let handle = thread::Builder::new()
        .name(format!("ticket-{sale_id}"))
        .spawn(move || {
            let event = match write_ticket(&doc, &job.dir, job.backend, &job.prefix) {
                Ok(path) => {
                    if job.open {
                        if let Err(e) = webbrowser::open(&path.to_string_lossy()) {
                            warn!(sale_id, error = %e, "Could not open ticket");
                        }
                    }
                    TicketEvent::Ready { sale_id, path }
                }
                Err(e) => {
                    error!(sale_id, error = %e, "Ticket generation failed");
                    TicketEvent::Failed {
                        sale_id,
                        error: e.to_string(),
                    }
                }
            };
            // The receiver may already be gone (one-shot commands).
            let _ = events.send(event);
        })?;
    Ok(handle)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::dec;
    use chrono::NaiveDate;
    use std::sync::mpsc;
    use std::time::Duration;

    fn doc(method: PaymentMethod) -> TicketDoc {
        let timestamp = NaiveDate::from_ymd_opt(2024, 5, 17)
            .and_then(|d| d.and_hms_opt(14, 3, 22))
            .expect("timestamp");
        TicketDoc {
            store_name: "KIOSKO PRO".into(),
            sale_id: 42,
            timestamp,
            lines: vec![
                SaleLine {
                    product_id: 1,
                    product_name: "Coca Cola 500ml".into(),
                    quantity: 2,
                    unit_price: dec("10.00"),
                    subtotal: dec("20.00"),
                },
                SaleLine {
                    product_id: 2,
                    product_name: "Galletitas de agua con semillas de chía y lino x 3 unidades".into(),
                    quantity: 1,
                    unit_price: dec("5.50"),
                    subtotal: dec("5.50"),
                },
            ],
            total: dec("25.50"),
            discount_percent: Decimal::ZERO,
            payment_method: method,
            amount_received: dec("30.00"),
            change: dec("4.50"),
            demo: false,
        }
    }

    #[test]
    fn layout_has_header_lines_total_and_footer() {
        let lines = layout(&doc(PaymentMethod::Cash));
        assert_eq!(lines[0].trim(), "KIOSKO PRO");
        assert!(lines.iter().any(|l| l == "Ticket #: 42"));
        assert!(lines.iter().any(|l| l == "Date: 17/05/2024 14:03:22"));
        assert!(lines.iter().any(|l| l.trim_end().ends_with("TOTAL: $25.50")));
        assert!(lines.iter().any(|l| l == "Received: $30.00"));
        assert!(lines.iter().any(|l| l == "Change: $4.50"));
        assert_eq!(lines.last().map(|l| l.trim()), Some(FOOTER));
        assert!(lines.iter().all(|l| l.chars().count() <= TICKET_WIDTH));
    }

    #[test]
    fn long_names_are_truncated() {
        let lines = layout(&doc(PaymentMethod::Cash));
        let item = lines
            .iter()
            .find(|l| l.contains("Galletitas"))
            .expect("item line");
        assert!(item.contains("Galletitas de agua con semillas de chía..."));
        assert_eq!(truncate_name("Coca Cola 500ml"), "Coca Cola 500ml");
        assert_eq!(truncate_name(&"x".repeat(40)), "x".repeat(40));
        assert_eq!(truncate_name(&"x".repeat(41)).chars().count(), 40);
    }

    #[test]
    fn non_cash_omits_change_and_demo_is_flagged() {
        let mut d = doc(PaymentMethod::DebitCard);
        d.demo = true;
        let lines = layout(&d);
        assert!(lines.iter().any(|l| l == "Payment method: Debit card"));
        assert!(!lines.iter().any(|l| l.starts_with("Change:")));
        assert!(lines.iter().any(|l| l.contains("DEMO SALE")));
    }

    #[test]
    fn pdf_output_is_paginated() {
        let bytes = PdfRenderer.render("t", &["line".to_string()]).expect("render");
        assert!(bytes.starts_with(b"%PDF"));
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Courier"));
        assert!(text.contains("/Count 1"));

        let many: Vec<String> = (0..PdfRenderer::lines_per_page() * 2 + 1)
            .map(|i| format!("line {i}"))
            .collect();
        let bytes = PdfRenderer.render("t", &many).expect("render");
        assert!(String::from_utf8_lossy(&bytes).contains("/Count 3"));
    }

    #[test]
    fn win_ansi_encoding_keeps_latin1() {
        assert_eq!(encode_win_ansi("Lácteos"), b"L\xe1cteos".to_vec());
        assert_eq!(encode_win_ansi("€5"), vec![0x80, b'5']);
        assert_eq!(encode_win_ansi("日本"), b"??".to_vec());
    }

    #[test]
    fn html_output_is_escaped() {
        let bytes = HtmlRenderer
            .render("<t>", &["Fish & <Chips>".to_string()])
            .expect("render");
        let html = String::from_utf8(bytes).expect("utf8");
        assert!(html.contains("Fish &amp; &lt;Chips&gt;"));
        assert!(html.contains("<title>&lt;t&gt;</title>"));
    }

    #[test]
    fn write_ticket_names_file_by_sale() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_ticket(&doc(PaymentMethod::Cash), dir.path(), TicketBackend::Auto, "venta")
            .expect("write");
        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("venta_42_"), "{name}");
        assert!(name.ends_with(".pdf"), "{name}");

        let html = write_ticket(&doc(PaymentMethod::Cash), dir.path(), TicketBackend::Html, "venta")
            .expect("write");
        assert_eq!(html.extension().and_then(|e| e.to_str()), Some("html"));
    }

    #[test]
    fn backend_parsing() {
        assert_eq!("PDF".parse::<TicketBackend>(), Ok(TicketBackend::Pdf));
        assert_eq!(" auto ".parse::<TicketBackend>(), Ok(TicketBackend::Auto));
        assert!("png".parse::<TicketBackend>().is_err());
        assert_eq!(TicketBackend::Auto.renderers().len(), 2);
    }

    #[test]
    fn background_job_reports_success_and_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, rx) = mpsc::channel();

        let job = TicketJob {
            dir: dir.path().to_path_buf(),
            backend: TicketBackend::Html,
            prefix: "venta".into(),
            open: false,
        };
        spawn_ticket_job(doc(PaymentMethod::Cash), job, tx.clone()).expect("spawn");
        match rx.recv_timeout(Duration::from_secs(10)).expect("event") {
            TicketEvent::Ready { sale_id, path } => {
                assert_eq!(sale_id, 42);
                assert!(path.exists());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // A regular file where the directory should be makes every backend fail.
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").expect("write blocker");
        let job = TicketJob {
            dir: blocker,
            backend: TicketBackend::Auto,
            prefix: "venta".into(),
            open: false,
        };
        spawn_ticket_job(doc(PaymentMethod::Cash), job, tx).expect("spawn");
        match rx.recv_timeout(Duration::from_secs(10)).expect("event") {
            TicketEvent::Failed { sale_id, .. } => assert_eq!(sale_id, 42),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
