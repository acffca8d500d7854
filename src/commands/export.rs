use chrono::Utc;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

use super::dashboard::{parse_filter, DashboardData};
use super::{guard, user_error};
use crate::auth::AdminContext;
use crate::export::{orders_csv, write_export};
use crate::riders::list_riders;

/// Export the (optionally filtered) dashboard orders to CSV. Accepts the
/// dashboard filter fields plus `outDir`.
pub async fn export_orders_csv(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let out_dir = arg0
        .as_ref()
        .and_then(|v| v.get("outDir").or_else(|| v.get("out_dir")))
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let filter = parse_filter(arg0)?;

    let data = DashboardData::load(ctx).await.map_err(user_error)?;
    let riders = list_riders(ctx).await.map_err(user_error)?;
    let orders = data.filtered(&filter);
    let csv = orders_csv(&orders, &riders, &data.customers);
    let path = write_export(&csv, &out_dir, Utc::now()).map_err(user_error)?;
    info!(rows = orders.len(), path = %path.display(), "orders exported");
    Ok(json!({
        "success": true,
        "rows": orders.len(),
        "path": path.display().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{login, test_context};
    use crate::models::ORDERS;
    use crate::remote::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn export_writes_filtered_rows() {
        let store = Arc::new(MemoryStore::new().with_admin("admin", "pw"));
        store.seed(
            ORDERS,
            vec![
                json!({ "id": "o-1", "service_type": "Polish", "material": "Suede",
                        "quantity": 1, "status": "ready",
                        "created_at": "2025-03-01T10:00:00+00:00" }),
                json!({ "id": "o-2", "service_type": "Polish", "material": "Suede",
                        "quantity": 1, "status": "delivered",
                        "created_at": "2025-03-02T10:00:00+00:00" }),
            ],
        );
        let ctx = test_context(store);
        login(&ctx, "admin", "pw".to_string()).await.unwrap();

        let dir = std::env::temp_dir().join(format!("don-lustre-export-{}", uuid::Uuid::new_v4()));
        let value = export_orders_csv(
            &ctx,
            Some(json!({ "status": "ready", "outDir": dir.display().to_string() })),
        )
        .await
        .unwrap();
        assert_eq!(value["rows"], 1);
        let csv = std::fs::read_to_string(value["path"].as_str().unwrap()).unwrap();
        assert!(csv.contains("\"o-1\""));
        assert!(!csv.contains("\"o-2\""));
        let _ = std::fs::remove_dir_all(dir);
    }
}
