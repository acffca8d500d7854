//! Receipt layout.
//!
//! Turns a [`ReceiptDoc`] into PDF bytes: watermark, brand band with the
//! optional logo, bill-to and receipt columns, the item and payment tables,
//! pickup details and footer. Also loads and prepares the logo image.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::RgbaImage;
use serde::Serialize;
use std::fs;
use std::time::Duration;

use crate::error::AdminError;
use crate::pdf::{fit_text, Font, PdfBuilder, Rgb};
use crate::pricing::{money, ReceiptTotals};

const BUSINESS_NAME: &str = "Don Lustre";
const BUSINESS_TAGLINE: &str = "Shoe Cleaning & Dry Cleaning Delivery";
const FOOTER_THANKS: &str = "Thank you for choosing Don Lustre!";
const FOOTER_NOTE: &str = "Keep this receipt for pickup and delivery of your items.";

const BRAND: Rgb = Rgb(6, 78, 59);
const BRAND_LIGHT: Rgb = Rgb(209, 250, 229);
const GRAY: Rgb = Rgb(107, 114, 128);
const GRID: Rgb = Rgb(209, 213, 219);
const HEADER_FILL: Rgb = Rgb(243, 244, 246);
const TEXT: Rgb = Rgb(17, 24, 39);

const MARGIN: f32 = 40.0;
const ROW_HEIGHT: f32 = 22.0;
const LOGO_MAX_PX: u32 = 240;
const WATERMARK_MAX_PX: u32 = 320;
const WATERMARK_OPACITY: f32 = 0.08;

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptDoc {
    pub receipt_number: String,
    pub issued_at: DateTime<Utc>,
    pub order_id: String,
    pub order_created_at: DateTime<Utc>,
    pub status: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub rider_name: Option<String>,
    pub pickup_address: Option<String>,
    pub pickup_coordinates: Option<(f64, f64)>,
    pub notes: Option<String>,
    pub service_type: String,
    pub material: String,
    pub totals: ReceiptTotals,
    pub tax_label: Option<String>,
}

// ---------------------------------------------------------------------------
// Logo and watermark
// ---------------------------------------------------------------------------

/// Raw RGB pixels ready to embed in a PDF.
#[derive(Debug, Clone)]
pub struct RgbPixels {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// The logo flattened onto white, plus the faint full-page watermark
/// derived from it.
#[derive(Debug, Clone)]
pub struct PreparedLogo {
    pub logo: RgbPixels,
    pub watermark: RgbPixels,
}

fn parse_data_url_image(source: &str) -> Option<Vec<u8>> {
    let trimmed = source.trim();
    if !trimmed.starts_with("data:image/") {
        return None;
    }
    let (_, payload) = trimmed.split_once(',')?;
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .ok()
}

/// Read logo bytes from a `data:` URL, an `http(s)` URL, a `file://` URL or
/// a plain path.
pub async fn read_logo_source_bytes(source: &str) -> Result<Vec<u8>, AdminError> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(AdminError::Render("Logo source is empty".to_string()));
    }

    if trimmed.starts_with("data:") {
        return parse_data_url_image(trimmed)
            .ok_or_else(|| AdminError::Render("logo data URL could not be decoded".to_string()));
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(8))
            .build()
            .map_err(|e| AdminError::Network(format!("logo HTTP client: {e}")))?;
        let response = client
            .get(trimmed)
            .send()
            .await
            .map_err(|e| AdminError::Network(format!("logo fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AdminError::Network(format!(
                "logo fetch failed with HTTP {}",
                response.status()
            )));
        }
        return response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| AdminError::Network(format!("logo fetch bytes failed: {e}")));
    }

    let path = trimmed.strip_prefix("file://").unwrap_or(trimmed);
    fs::read(path).map_err(|e| AdminError::Render(format!("logo file read failed ({path}): {e}")))
}

fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let scale = max as f32 / width.max(height) as f32;
    (
        ((width as f32 * scale).round() as u32).max(1),
        ((height as f32 * scale).round() as u32).max(1),
    )
}

/// Composite RGBA pixels onto white, scaling ink intensity by `opacity`.
fn flatten(image: &RgbaImage, opacity: f32) -> RgbPixels {
    let mut data = Vec::with_capacity((image.width() * image.height() * 3) as usize);
    for pixel in image.pixels() {
        let [r, g, b, a] = pixel.0;
        let coverage = (a as f32 / 255.0) * opacity;
        for channel in [r, g, b] {
            let ink = (255.0 - channel as f32) * coverage;
            data.push((255.0 - ink).round().clamp(0.0, 255.0) as u8);
        }
    }
    RgbPixels {
        width: image.width(),
        height: image.height(),
        data,
    }
}

pub fn prepare_logo(image_bytes: &[u8]) -> Result<PreparedLogo, AdminError> {
    let decoded = image::load_from_memory(image_bytes)
        .map_err(|e| AdminError::Render(format!("logo decode: {e}")))?;
    let rgba = decoded.to_rgba8();
    let (src_w, src_h) = rgba.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(AdminError::Render(
            "logo image has invalid dimensions".to_string(),
        ));
    }

    let (logo_w, logo_h) = fit_within(src_w, src_h, LOGO_MAX_PX);
    let logo = if (logo_w, logo_h) != (src_w, src_h) {
        image::imageops::resize(&rgba, logo_w, logo_h, FilterType::Triangle)
    } else {
        rgba.clone()
    };

    let (wm_w, wm_h) = fit_within(src_w, src_h, WATERMARK_MAX_PX);
    let watermark = if (wm_w, wm_h) != (src_w, src_h) {
        image::imageops::resize(&rgba, wm_w, wm_h, FilterType::Triangle)
    } else {
        rgba
    };

    Ok(PreparedLogo {
        logo: flatten(&logo, 1.0),
        watermark: flatten(&watermark, WATERMARK_OPACITY),
    })
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

struct Column {
    title: &'static str,
    width: f32,
    align: Align,
}

fn cell_text(pdf: &mut PdfBuilder, x: f32, y: f32, width: f32, align: Align, font: Font, text: &str) {
    let size = 10.0;
    let fitted = fit_text(text, font, size, width - 12.0);
    let baseline = y + ROW_HEIGHT / 2.0 + 3.5;
    match align {
        Align::Left => pdf.text(x + 6.0, baseline, font, size, TEXT, &fitted),
        Align::Right => pdf.text_right(x + width - 6.0, baseline, font, size, TEXT, &fitted),
    };
}

/// Grid table with a shaded header row. Returns the y below the table.
fn draw_table(pdf: &mut PdfBuilder, x: f32, y: f32, columns: &[Column], rows: &[Vec<String>]) -> f32 {
    let total_width: f32 = columns.iter().map(|c| c.width).sum();
    pdf.fill_rect(x, y, total_width, ROW_HEIGHT, HEADER_FILL);
    let mut cx = x;
    for col in columns {
        cell_text(pdf, cx, y, col.width, col.align, Font::Bold, col.title);
        cx += col.width;
    }

    let mut row_y = y + ROW_HEIGHT;
    for row in rows {
        let mut cx = x;
        for (col, value) in columns.iter().zip(row) {
            cell_text(pdf, cx, row_y, col.width, col.align, Font::Regular, value);
            cx += col.width;
        }
        row_y += ROW_HEIGHT;
    }

    let height = row_y - y;
    pdf.stroke_rect(x, y, total_width, height, 0.75, GRID);
    for i in 1..=rows.len() {
        let ly = y + ROW_HEIGHT * i as f32;
        pdf.line(x, ly, x + total_width, ly, 0.5, GRID);
    }
    let mut cx = x;
    for col in &columns[..columns.len().saturating_sub(1)] {
        cx += col.width;
        pdf.line(cx, y, cx, row_y, 0.5, GRID);
    }
    row_y
}

/// Two-column label/value table with a title bar. `emphasize_last` shades
/// and bolds the final row. Returns the y below the table.
fn draw_key_value_table(
    pdf: &mut PdfBuilder,
    x: f32,
    y: f32,
    width: f32,
    label_width: f32,
    title: &str,
    rows: &[(String, String)],
    value_align: Align,
    emphasize_last: bool,
) -> f32 {
    pdf.fill_rect(x, y, width, ROW_HEIGHT, BRAND);
    pdf.text(x + 6.0, y + ROW_HEIGHT / 2.0 + 3.5, Font::Bold, 10.0, Rgb::WHITE, title);

    let mut row_y = y + ROW_HEIGHT;
    for (i, (label, value)) in rows.iter().enumerate() {
        let last = i + 1 == rows.len();
        let font = if emphasize_last && last {
            pdf.fill_rect(x, row_y, width, ROW_HEIGHT, BRAND_LIGHT);
            Font::Bold
        } else {
            Font::Regular
        };
        cell_text(pdf, x, row_y, label_width, Align::Left, Font::Bold, label);
        cell_text(pdf, x + label_width, row_y, width - label_width, value_align, font, value);
        if !last {
            pdf.line(x, row_y + ROW_HEIGHT, x + width, row_y + ROW_HEIGHT, 0.5, GRID);
        }
        row_y += ROW_HEIGHT;
    }
    pdf.stroke_rect(x, y, width, row_y - y, 0.75, GRID);
    pdf.line(x + label_width, y + ROW_HEIGHT, x + label_width, row_y, 0.5, GRID);
    row_y
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

fn display_date(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn or_dash(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("—")
        .to_string()
}

pub fn render_pdf(doc: &ReceiptDoc, logo: Option<&PreparedLogo>) -> Result<Vec<u8>, AdminError> {
    let mut pdf =
        PdfBuilder::a4().with_title(&format!("{BUSINESS_NAME} receipt {}", doc.receipt_number));
    let page_w = pdf.width();
    let page_h = pdf.height();
    let content_w = page_w - MARGIN * 2.0;

    // Watermark goes first so everything else paints over it.
    if let Some(prepared) = logo {
        let wm = &prepared.watermark;
        let id = pdf.add_image(wm.width, wm.height, wm.data.clone());
        let w = content_w * 0.75;
        let h = w * wm.height as f32 / wm.width as f32;
        pdf.image(id, (page_w - w) / 2.0, (page_h - h) / 2.0, w, h);
    }

    // Header band
    pdf.fill_rect(0.0, 0.0, page_w, 96.0, BRAND);
    let mut title_x = MARGIN;
    if let Some(prepared) = logo {
        let lg = &prepared.logo;
        let id = pdf.add_image(lg.width, lg.height, lg.data.clone());
        let box_size = 64.0;
        let scale = box_size / lg.width.max(lg.height) as f32;
        let (w, h) = (lg.width as f32 * scale, lg.height as f32 * scale);
        pdf.image(id, MARGIN, 16.0 + (box_size - h) / 2.0, w, h);
        title_x = MARGIN + box_size + 14.0;
    }
    pdf.text(title_x, 50.0, Font::Bold, 22.0, Rgb::WHITE, BUSINESS_NAME)
        .text(title_x, 70.0, Font::Regular, 10.0, BRAND_LIGHT, BUSINESS_TAGLINE)
        .text_right(page_w - MARGIN, 50.0, Font::Bold, 24.0, Rgb::WHITE, "RECEIPT")
        .text_right(
            page_w - MARGIN,
            70.0,
            Font::Regular,
            10.0,
            BRAND_LIGHT,
            &format!("No. {}", doc.receipt_number),
        );

    // Info columns
    let info_y = 132.0;
    let right_x = page_w / 2.0 + 20.0;
    pdf.text(MARGIN, info_y, Font::Bold, 9.0, GRAY, "BILL TO")
        .text(
            MARGIN,
            info_y + 18.0,
            Font::Bold,
            12.0,
            TEXT,
            &or_dash(doc.customer_name.as_deref()),
        )
        .text(
            MARGIN,
            info_y + 34.0,
            Font::Regular,
            10.0,
            TEXT,
            &format!("Phone: {}", or_dash(doc.customer_phone.as_deref())),
        )
        .text(right_x, info_y, Font::Bold, 9.0, GRAY, "RECEIPT DETAILS");
    let details = [
        format!("Receipt No.: {}", doc.receipt_number),
        format!("Issued: {}", display_date(&doc.issued_at)),
        format!("Order Date: {}", display_date(&doc.order_created_at)),
        format!("Order ID: {}", doc.order_id),
        format!("Status: {}", doc.status),
    ];
    for (i, line) in details.iter().enumerate() {
        let text = fit_text(line, Font::Regular, 10.0, page_w - MARGIN - right_x);
        pdf.text(right_x, info_y + 18.0 + 15.0 * i as f32, Font::Regular, 10.0, TEXT, &text);
    }

    // Itemized table
    let items_y = 236.0;
    let columns = [
        Column { title: "Service", width: 165.0, align: Align::Left },
        Column { title: "Material", width: 120.0, align: Align::Left },
        Column { title: "Qty", width: 50.0, align: Align::Right },
        Column { title: "Unit Price", width: 85.0, align: Align::Right },
        Column { title: "Amount", width: content_w - 420.0, align: Align::Right },
    ];
    let item_rows = vec![vec![
        doc.service_type.clone(),
        or_dash(Some(&doc.material)),
        doc.totals.quantity.to_string(),
        money(doc.totals.unit_price),
        money(doc.totals.subtotal),
    ]];
    let after_items = draw_table(&mut pdf, MARGIN, items_y, &columns, &item_rows);

    // Payment summary
    let mut summary = vec![("Subtotal".to_string(), money(doc.totals.subtotal))];
    if let Some(label) = &doc.tax_label {
        summary.push((label.clone(), money(doc.totals.tax)));
    }
    summary.push(("Total".to_string(), money(doc.totals.total)));
    let summary_w = 240.0;
    let after_summary = draw_key_value_table(
        &mut pdf,
        page_w - MARGIN - summary_w,
        after_items + 24.0,
        summary_w,
        120.0,
        "PAYMENT SUMMARY",
        &summary,
        Align::Right,
        true,
    );

    // Pickup information
    let mut pickup = vec![
        ("Pickup Address".to_string(), or_dash(doc.pickup_address.as_deref())),
        ("Rider".to_string(), or_dash(doc.rider_name.as_deref())),
    ];
    if let Some((lat, lng)) = doc.pickup_coordinates {
        pickup.push(("Coordinates".to_string(), format!("{lat:.5}, {lng:.5}")));
    }
    if let Some(notes) = doc.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        pickup.push(("Notes".to_string(), notes.replace(['\r', '\n'], " ")));
    }
    draw_key_value_table(
        &mut pdf,
        MARGIN,
        after_summary + 24.0,
        content_w,
        130.0,
        "PICKUP INFORMATION",
        &pickup,
        Align::Left,
        false,
    );

    // Footer
    let footer_y = page_h - 70.0;
    pdf.line(MARGIN, footer_y, page_w - MARGIN, footer_y, 0.75, GRID)
        .text_centered(page_w / 2.0, footer_y + 22.0, Font::Bold, 11.0, BRAND, FOOTER_THANKS)
        .text_centered(page_w / 2.0, footer_y + 38.0, Font::Regular, 9.0, GRAY, FOOTER_NOTE);

    pdf.build()
        .map_err(|e| AdminError::Render(format!("pdf serialization: {e}")))
}
