use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

use super::{guard, payload_object, to_value, user_error};
use crate::auth::AdminContext;
use crate::receipts;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptGeneratePayload {
    #[serde(alias = "order_id", alias = "id")]
    order_id: String,
    /// Directory for the local copy; defaults to the working directory.
    #[serde(default, alias = "out_dir", alias = "dir")]
    out_dir: Option<PathBuf>,
}

pub async fn receipt_list(ctx: &AdminContext) -> Result<Value, String> {
    guard(ctx)?;
    to_value(&receipts::list_receipts(ctx).await.map_err(user_error)?)
}

/// Generate, upload and record a receipt, then save the PDF locally. The
/// local copy is written even when the upload failed.
pub async fn receipt_generate(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let payload: ReceiptGeneratePayload = serde_json::from_value(payload_object(arg0))
        .map_err(|e| format!("Invalid receipt payload: {e}"))?;
    let outcome = receipts::generate_receipt(ctx, payload.order_id.trim())
        .await
        .map_err(user_error)?;
    let dir = payload.out_dir.unwrap_or_else(|| PathBuf::from("."));
    let saved = receipts::save_local(&outcome.pdf, &dir, &outcome.order_id).map_err(user_error)?;

    let mut value = to_value(&outcome)?;
    value["savedTo"] = json!(saved.display().to_string());
    value["success"] = json!(outcome.upload_error.is_none());
    Ok(value)
}

pub async fn receipt_retry_uploads(ctx: &AdminContext) -> Result<Value, String> {
    guard(ctx)?;
    let reports = receipts::retry_missing_uploads(ctx)
        .await
        .map_err(user_error)?;
    Ok(json!({
        "attempted": reports.len(),
        "uploaded": reports.iter().filter(|r| r.error.is_none()).count(),
        "results": to_value(&reports)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{login, test_context};
    use crate::models::{ORDERS, PRICE_LIST};
    use crate::remote::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn failed_upload_still_saves_local_copy() {
        let store = Arc::new(MemoryStore::new().with_admin("admin", "pw"));
        store.seed(
            PRICE_LIST,
            vec![json!({ "id": "p-1", "service_type": "Polish", "material": "Suede",
                         "base_price": 8.0 })],
        );
        store.seed(
            ORDERS,
            vec![json!({ "id": "o-1", "service_type": "Polish", "material": "Suede",
                         "quantity": 2, "status": "ready",
                         "created_at": "2025-03-01T10:00:00+00:00" })],
        );
        let ctx = test_context(store);
        login(&ctx, "admin", "pw".to_string()).await.unwrap();

        let dir = std::env::temp_dir().join(format!("don-lustre-cmd-{}", uuid::Uuid::new_v4()));
        let value = receipt_generate(&ctx, Some(json!({ "orderId": "o-1", "outDir": dir })))
            .await
            .unwrap();
        assert_eq!(value["success"], false);
        assert!(value["uploadError"].as_str().unwrap().contains("does not exist"));
        assert!(value["receipt"]["receipt_url"].is_null());
        assert!(dir.join("receipt-o-1.pdf").exists());
        let _ = std::fs::remove_dir_all(dir);
    }
}
