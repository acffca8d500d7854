//! Receipt pipeline: price the order, render the PDF, upload it and record
//! the receipt row.
//!
//! An upload failure is reported, not fatal. The receipts row is still
//! written (with a null URL) and the caller still gets the PDF bytes to keep
//! locally; `retry_missing_uploads` picks those rows up later.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::AdminContext;
use crate::db;
use crate::error::AdminError;
use crate::models::{
    decode_row, decode_rows, Customer, Order, Receipt, Rider, CUSTOMERS, ORDERS, RECEIPTS, RIDERS,
};
use crate::orders::get_order;
use crate::price_list::{list_prices, resolve_unit_price};
use crate::pricing::{compute_totals, ReceiptTotals, TaxPolicy};
use crate::receipt_renderer::{self, PreparedLogo, ReceiptDoc};
use crate::remote::Query;

const PDF_CONTENT_TYPE: &str = "application/pdf";
const UNKNOWN_CUSTOMER: &str = "Unknown Customer";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptOutcome {
    pub order_id: String,
    pub receipt_number: String,
    pub totals: ReceiptTotals,
    pub receipt: Receipt,
    pub upload_error: Option<String>,
    #[serde(skip)]
    pub pdf: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptListing {
    #[serde(flatten)]
    pub receipt: Receipt,
    pub customer_name: String,
    pub service_type: Option<String>,
    /// Display number, when this machine has assigned one.
    pub receipt_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryReport {
    pub order_id: String,
    pub receipt_url: Option<String>,
    pub error: Option<String>,
}

pub fn receipt_object_path(order_id: &str) -> String {
    format!("{order_id}.pdf")
}

pub fn format_receipt_number(number: i64) -> String {
    format!("{number:05}")
}

async fn find_by_id<T: serde::de::DeserializeOwned>(
    ctx: &AdminContext,
    table: &str,
    entity: &'static str,
    id: Option<&str>,
) -> Result<Option<T>, AdminError> {
    let Some(id) = id.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let rows = ctx
        .store
        .select(table, &Query::all().eq("id", id).limit(1))
        .await?;
    rows.into_iter()
        .next()
        .map(|row| decode_row(entity, row))
        .transpose()
}

/// The prepared logo for this session, loading it on first use. A logo that
/// cannot be loaded is logged and the receipt renders without one.
async fn session_logo(ctx: &AdminContext) -> Option<Arc<PreparedLogo>> {
    if let Some(logo) = ctx.session.cached_logo() {
        return Some(logo);
    }
    let source = ctx.config.logo_source.as_deref()?;
    let prepared = match receipt_renderer::read_logo_source_bytes(source).await {
        Ok(bytes) => receipt_renderer::prepare_logo(&bytes),
        Err(e) => Err(e),
    };
    match prepared {
        Ok(logo) => {
            let logo = Arc::new(logo);
            ctx.session.cache_logo(logo.clone());
            Some(logo)
        }
        Err(e) => {
            warn!(error = %e, "receipt logo unavailable, rendering without it");
            None
        }
    }
}

fn build_doc(
    order: &Order,
    customer: Option<&Customer>,
    rider: Option<&Rider>,
    receipt_number: String,
    totals: ReceiptTotals,
    policy: TaxPolicy,
) -> ReceiptDoc {
    ReceiptDoc {
        receipt_number,
        issued_at: Utc::now(),
        order_id: order.id.clone(),
        order_created_at: order.created_at,
        status: order.status.to_string(),
        customer_name: customer.map(|c| c.name.clone()),
        customer_phone: customer.map(|c| c.phone.clone()),
        rider_name: rider.map(|r| r.name.clone()),
        pickup_address: order.pickup_address.clone(),
        pickup_coordinates: order.pickup_lat.zip(order.pickup_lng),
        notes: order.notes.clone(),
        service_type: order.service_type.clone(),
        material: order.material_label().to_string(),
        totals,
        tax_label: totals.taxed.then(|| policy.label()),
    }
}

pub async fn generate_receipt(
    ctx: &AdminContext,
    order_id: &str,
) -> Result<ReceiptOutcome, AdminError> {
    let order = get_order(ctx, order_id).await?;
    let customer: Option<Customer> =
        find_by_id(ctx, CUSTOMERS, "customer", order.customer_id.as_deref()).await?;
    let rider: Option<Rider> =
        find_by_id(ctx, RIDERS, "rider", order.rider_id.as_deref()).await?;
    let prices = list_prices(ctx).await?;

    let unit_price = resolve_unit_price(&prices, &order.service_type, order.material_label())?;
    let policy = ctx.config.tax_policy();
    let totals = compute_totals(unit_price, order.quantity, policy);

    let number = {
        let mut conn = ctx.conn()?;
        db::assign_order_number(&mut conn, &order.id)?
    };
    let receipt_number = format_receipt_number(number);

    let logo = session_logo(ctx).await;
    let doc = build_doc(
        &order,
        customer.as_ref(),
        rider.as_ref(),
        receipt_number.clone(),
        totals,
        policy,
    );
    let pdf = receipt_renderer::render_pdf(&doc, logo.as_deref())?;

    let bucket = &ctx.config.bucket;
    let path = receipt_object_path(&order.id);
    let (receipt_url, upload_error) = match ctx
        .store
        .upload(bucket, &path, pdf.clone(), PDF_CONTENT_TYPE)
        .await
    {
        Ok(()) => (Some(ctx.store.public_url(bucket, &path)), None),
        Err(e) => {
            warn!(order_id = %order.id, bucket = %bucket, error = %e, "receipt upload failed");
            (None, Some(e.to_string()))
        }
    };

    let rows = ctx
        .store
        .upsert(
            RECEIPTS,
            json!({
                "order_id": order.id,
                "receipt_url": receipt_url,
                "total_amount": totals.total,
            }),
            "order_id",
        )
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| AdminError::decode("receipt", "upsert returned no row"))?;
    let receipt: Receipt = decode_row("receipt", row)?;

    info!(
        order_id = %order.id,
        receipt_number = %receipt_number,
        total = totals.total,
        uploaded = upload_error.is_none(),
        "receipt generated"
    );
    Ok(ReceiptOutcome {
        order_id: order.id,
        receipt_number,
        totals,
        receipt,
        upload_error,
        pdf,
    })
}

/// Write the PDF next to the user as `receipt-{order_id}.pdf`.
pub fn save_local(bytes: &[u8], dir: &Path, order_id: &str) -> Result<PathBuf, AdminError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("receipt-{order_id}.pdf"));
    fs::write(&path, bytes)?;
    Ok(path)
}

pub async fn list_receipts(ctx: &AdminContext) -> Result<Vec<ReceiptListing>, AdminError> {
    let receipts: Vec<Receipt> = decode_rows(
        "receipt",
        ctx.store
            .select(RECEIPTS, &Query::all().newest_first())
            .await?,
    )?;
    let orders: Vec<Order> = decode_rows("order", ctx.store.select(ORDERS, &Query::all()).await?)?;
    let customers: Vec<Customer> =
        decode_rows("customer", ctx.store.select(CUSTOMERS, &Query::all()).await?)?;

    let orders: HashMap<&str, &Order> = orders.iter().map(|o| (o.id.as_str(), o)).collect();
    let customers: HashMap<&str, &Customer> =
        customers.iter().map(|c| (c.id.as_str(), c)).collect();

    let conn = ctx.conn()?;
    Ok(receipts
        .into_iter()
        .map(|receipt| {
            let receipt_number =
                db::lookup_order_number(&conn, &receipt.order_id).map(format_receipt_number);
            let order = orders.get(receipt.order_id.as_str());
            let customer_name = order
                .and_then(|o| o.customer_id.as_deref())
                .and_then(|id| customers.get(id))
                .map(|c| c.name.clone())
                .unwrap_or_else(|| UNKNOWN_CUSTOMER.to_string());
            ReceiptListing {
                service_type: order.map(|o| o.service_type.clone()),
                receipt_number,
                customer_name,
                receipt,
            }
        })
        .collect())
}

/// Regenerate every receipt whose upload never landed.
pub async fn retry_missing_uploads(ctx: &AdminContext) -> Result<Vec<RetryReport>, AdminError> {
    let pending: Vec<Receipt> = decode_rows(
        "receipt",
        ctx.store
            .select(RECEIPTS, &Query::all().is_null("receipt_url").newest_first())
            .await?,
    )?;
    let mut reports = Vec::with_capacity(pending.len());
    for receipt in pending {
        let report = match generate_receipt(ctx, &receipt.order_id).await {
            Ok(outcome) => RetryReport {
                order_id: outcome.order_id,
                receipt_url: outcome.receipt.receipt_url,
                error: outcome.upload_error,
            },
            Err(e) => {
                warn!(order_id = %receipt.order_id, error = %e, "receipt retry failed");
                RetryReport {
                    order_id: receipt.order_id,
                    receipt_url: None,
                    error: Some(e.to_string()),
                }
            }
        };
        reports.push(report);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_context;
    use crate::models::PRICE_LIST;
    use crate::remote::{MemoryStore, RemoteStore};

    fn seed(store: &MemoryStore) {
        store.seed(
            CUSTOMERS,
            vec![json!({ "id": "c-1", "name": "Ana Perez", "phone": "555-0101",
                         "created_at": "2025-01-01T00:00:00+00:00" })],
        );
        store.seed(
            RIDERS,
            vec![json!({ "id": "r-1", "name": "Carlos", "phone": "555-0303" })],
        );
        store.seed(
            PRICE_LIST,
            vec![json!({ "id": "p-1", "service_type": "Deep Clean", "material": "Leather",
                         "base_price": 10.0, "express_price": 15.0 })],
        );
        store.seed(
            ORDERS,
            vec![
                json!({ "id": "o-1", "customer_id": "c-1", "rider_id": "r-1",
                        "service_type": "Deep Clean", "material": "Leather", "quantity": 3,
                        "pickup_address": "Av. Central 12", "status": "ready",
                        "created_at": "2025-03-01T10:00:00+00:00" }),
                json!({ "id": "o-2", "service_type": "Polish", "material": "Suede",
                        "quantity": 1, "status": "received",
                        "created_at": "2025-03-02T10:00:00+00:00" }),
            ],
        );
    }

    #[tokio::test]
    async fn receipt_is_uploaded_and_recorded() {
        let store = Arc::new(MemoryStore::new().with_bucket("receipts"));
        seed(&store);
        let ctx = test_context(store.clone());

        let outcome = generate_receipt(&ctx, "o-1").await.unwrap();
        assert_eq!(outcome.receipt_number, "00001");
        assert_eq!(outcome.totals.subtotal, 30.0);
        assert_eq!(outcome.totals.tax, 2.55);
        assert_eq!(outcome.totals.total, 32.55);
        assert!(outcome.upload_error.is_none());
        assert!(outcome.pdf.starts_with(b"%PDF-1.4"));
        assert_eq!(
            outcome.receipt.receipt_url.as_deref(),
            Some("memory://storage/v1/object/public/receipts/o-1.pdf")
        );
        assert_eq!(store.object("receipts", "o-1.pdf"), Some(outcome.pdf.clone()));
        assert_eq!(store.rows(RECEIPTS).len(), 1);
    }

    #[tokio::test]
    async fn missing_bucket_still_records_row_without_url() {
        let store = Arc::new(MemoryStore::new());
        seed(&store);
        let ctx = test_context(store.clone());

        let outcome = generate_receipt(&ctx, "o-1").await.unwrap();
        let message = outcome.upload_error.unwrap();
        assert!(message.contains("\"receipts\" does not exist"), "{message}");
        assert!(!outcome.pdf.is_empty());

        let rows = store.rows(RECEIPTS);
        assert_eq!(rows.len(), 1);
        assert!(rows[0]["receipt_url"].is_null());
        assert_eq!(rows[0]["total_amount"], json!(32.55));
    }

    #[tokio::test]
    async fn regenerating_keeps_number_and_overwrites_row() {
        let store = Arc::new(MemoryStore::new().with_bucket("receipts"));
        seed(&store);
        let ctx = test_context(store.clone());

        generate_receipt(&ctx, "o-1").await.unwrap();
        let again = generate_receipt(&ctx, "o-1").await.unwrap();
        assert_eq!(again.receipt_number, "00001");
        assert_eq!(store.rows(RECEIPTS).len(), 1);
    }

    #[tokio::test]
    async fn unpriced_order_fails_before_any_write() {
        let store = Arc::new(MemoryStore::new().with_bucket("receipts"));
        seed(&store);
        let ctx = test_context(store.clone());

        let err = generate_receipt(&ctx, "o-2").await.unwrap_err();
        assert!(matches!(err, AdminError::PriceNotFound { .. }));
        assert!(store.rows(RECEIPTS).is_empty());
        assert!(store.object("receipts", "o-2.pdf").is_none());
    }

    #[tokio::test]
    async fn listing_falls_back_to_unknown_customer() {
        let store = Arc::new(MemoryStore::new());
        seed(&store);
        store.seed(
            RECEIPTS,
            vec![
                json!({ "id": "rc-1", "order_id": "o-1", "total_amount": 32.55,
                        "created_at": "2025-03-05T00:00:00+00:00" }),
                json!({ "id": "rc-2", "order_id": "o-gone", "total_amount": 5.0,
                        "created_at": "2025-03-04T00:00:00+00:00" }),
            ],
        );
        let ctx = test_context(store);
        {
            let mut conn = ctx.conn().unwrap();
            db::assign_order_number(&mut conn, "o-1").unwrap();
        }
        let listing = list_receipts(&ctx).await.unwrap();
        assert_eq!(listing[0].customer_name, "Ana Perez");
        assert_eq!(listing[0].service_type.as_deref(), Some("Deep Clean"));
        assert_eq!(listing[0].receipt_number.as_deref(), Some("00001"));
        assert_eq!(listing[1].customer_name, UNKNOWN_CUSTOMER);
        assert_eq!(listing[1].receipt_number, None);
    }

    #[tokio::test]
    async fn retry_uploads_pending_receipts() {
        let store = Arc::new(MemoryStore::new());
        seed(&store);
        let ctx = test_context(store.clone());
        generate_receipt(&ctx, "o-1").await.unwrap();

        // bucket created after the first attempt
        let store_with_bucket = Arc::new(MemoryStore::new().with_bucket("receipts"));
        for table in [CUSTOMERS, RIDERS, PRICE_LIST, ORDERS, RECEIPTS] {
            store_with_bucket.seed(table, store.rows(table));
        }
        let AdminContext { db, config, .. } = ctx;
        let ctx = AdminContext::new(store_with_bucket.clone(), db, config);

        let reports = retry_missing_uploads(&ctx).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].error.is_none());
        assert!(reports[0].receipt_url.is_some());
        assert!(store_with_bucket
            .select(RECEIPTS, &Query::all().is_null("receipt_url"))
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn local_copy_is_named_after_the_order() {
        let dir = std::env::temp_dir().join(format!("don-lustre-receipts-{}", uuid::Uuid::new_v4()));
        let path = save_local(b"%PDF-1.4", &dir, "o-1").unwrap();
        assert!(path.ends_with("receipt-o-1.pdf"));
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-1.4");
        let _ = fs::remove_dir_all(dir);
    }
}
