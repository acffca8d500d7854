use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{guard, payload_id, payload_object, to_value, user_error};
use crate::auth::AdminContext;
use crate::models::{NewOrder, OrderStatus};
use crate::orders::{self, DASHBOARD_ORDER_LIMIT};
use crate::riders;

const ORDER_ID_KEYS: &[&str] = &["orderId", "order_id", "id"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreatePayload {
    #[serde(default, alias = "customer_id")]
    customer_id: String,
    #[serde(default, alias = "service_type", alias = "service")]
    service_type: String,
    #[serde(default)]
    material: String,
    #[serde(default = "default_quantity", alias = "qty")]
    quantity: i64,
    #[serde(default, alias = "pickup_address", alias = "address")]
    pickup_address: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    express: Option<bool>,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusPayload {
    #[serde(alias = "order_id", alias = "id")]
    order_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAssignPayload {
    #[serde(alias = "order_id", alias = "id")]
    order_id: String,
    #[serde(alias = "rider_id", alias = "rider")]
    rider_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderListPayload {
    #[serde(default)]
    limit: Option<usize>,
}

pub async fn order_get_all(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let limit = serde_json::from_value::<OrderListPayload>(payload_object(arg0))
        .ok()
        .and_then(|p| p.limit)
        .unwrap_or(DASHBOARD_ORDER_LIMIT);
    to_value(&orders::list_orders(ctx, limit).await.map_err(user_error)?)
}

pub async fn order_create(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let p: OrderCreatePayload = serde_json::from_value(payload_object(arg0))
        .map_err(|e| format!("Invalid order payload: {e}"))?;
    let new = NewOrder {
        customer_id: p.customer_id,
        service_type: p.service_type,
        material: p.material,
        quantity: p.quantity,
        pickup_address: p.pickup_address,
        notes: p.notes,
        express: p.express,
    };
    to_value(&orders::create_order(ctx, &new).await.map_err(user_error)?)
}

pub async fn order_advance(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let id = payload_id(arg0.as_ref(), ORDER_ID_KEYS, "order id")?;
    to_value(&orders::advance_order(ctx, &id).await.map_err(user_error)?)
}

pub async fn order_update_status(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let p: OrderStatusPayload = serde_json::from_value(payload_object(arg0))
        .map_err(|e| format!("Invalid status payload: {e}"))?;
    let status: OrderStatus = p.status.parse()?;
    to_value(
        &orders::set_order_status(ctx, p.order_id.trim(), status)
            .await
            .map_err(user_error)?,
    )
}

pub async fn order_assign_rider(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let p: OrderAssignPayload = serde_json::from_value(payload_object(arg0))
        .map_err(|e| format!("Invalid assignment payload: {e}"))?;
    to_value(
        &orders::assign_rider(ctx, p.order_id.trim(), &p.rider_id)
            .await
            .map_err(user_error)?,
    )
}

/// Round-robin over the rider list as loaded (inactive riders included).
pub async fn order_auto_assign(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let id = payload_id(arg0.as_ref(), ORDER_ID_KEYS, "order id")?;
    let roster = riders::list_riders(ctx).await.map_err(user_error)?;
    let order = orders::auto_assign(ctx, &id, &roster).await.map_err(|e| {
        warn!(order_id = %id, error = %e, "auto-assign failed");
        user_error(e)
    })?;
    to_value(&order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{login, test_context};
    use crate::models::{ORDERS, RIDERS};
    use crate::remote::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    async fn logged_in(store: Arc<MemoryStore>) -> AdminContext {
        let ctx = test_context(store);
        login(&ctx, "admin", "pw".to_string()).await.unwrap();
        ctx
    }

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new().with_admin("admin", "pw"));
        store.seed(
            ORDERS,
            vec![json!({ "id": "o-1", "service_type": "Polish", "material": "Suede",
                         "quantity": 1, "status": "received",
                         "created_at": "2025-03-01T10:00:00+00:00" })],
        );
        store
    }

    #[tokio::test]
    async fn status_payload_rejects_unknown_status() {
        let ctx = logged_in(store()).await;
        let err = order_update_status(&ctx, Some(json!({ "orderId": "o-1", "status": "lost" })))
            .await
            .unwrap_err();
        assert!(err.contains("unknown order status"));
        let ok = order_update_status(&ctx, Some(json!({ "id": "o-1", "status": "Listo" })))
            .await
            .unwrap();
        assert_eq!(ok["status"], "ready");
    }

    #[tokio::test]
    async fn auto_assign_without_riders_explains_why() {
        let ctx = logged_in(store()).await;
        let err = order_auto_assign(&ctx, Some(json!("o-1"))).await.unwrap_err();
        assert_eq!(err, "No riders available for auto-assignment");
    }

    #[tokio::test]
    async fn auto_assign_uses_loaded_roster() {
        let store = store();
        store.seed(
            RIDERS,
            vec![json!({ "id": "r-1", "name": "Carlos", "phone": "1", "is_active": false })],
        );
        let ctx = logged_in(store).await;
        let order = order_auto_assign(&ctx, Some(json!({ "orderId": "o-1" })))
            .await
            .unwrap();
        assert_eq!(order["rider_id"], "r-1");
        assert_eq!(order["status"], "enroute");
    }

    #[tokio::test]
    async fn create_defaults_quantity_to_one() {
        let ctx = logged_in(store()).await;
        let order = order_create(
            &ctx,
            Some(json!({ "customerId": "c-1", "service": "Polish", "material": "Suede",
                         "address": "Calle 5" })),
        )
        .await
        .unwrap();
        assert_eq!(order["quantity"], 1);
        assert_eq!(order["status"], "received");
    }
}
