//! Order lifecycle: creation, status transitions and rider assignment.
//!
//! Writes are last-write-wins. The dashboard re-fetches (or receives the
//! change through the feed) after every mutation.

use serde_json::json;
use tracing::{debug, info};

use crate::auth::AdminContext;
use crate::error::AdminError;
use crate::models::{decode_row, decode_rows, NewOrder, Order, OrderStatus, Rider, ORDERS};
use crate::remote::Query;

/// Number of orders the dashboard loads.
pub const DASHBOARD_ORDER_LIMIT: usize = 500;

pub async fn list_orders(ctx: &AdminContext, limit: usize) -> Result<Vec<Order>, AdminError> {
    let rows = ctx
        .store
        .select(ORDERS, &Query::all().newest_first().limit(limit))
        .await?;
    decode_rows("order", rows)
}

pub async fn get_order(ctx: &AdminContext, id: &str) -> Result<Order, AdminError> {
    let rows = ctx
        .store
        .select(ORDERS, &Query::all().eq("id", id).limit(1))
        .await?;
    let row = rows.into_iter().next().ok_or_else(|| AdminError::NotFound {
        entity: "order",
        id: id.to_string(),
    })?;
    decode_row("order", row)
}

pub async fn create_order(ctx: &AdminContext, order: &NewOrder) -> Result<Order, AdminError> {
    let row = order.to_row()?;
    let inserted = ctx.store.insert(ORDERS, row).await?;
    let row = inserted
        .into_iter()
        .next()
        .ok_or_else(|| AdminError::decode("order", "insert returned no row"))?;
    let created: Order = decode_row("order", row)?;
    info!(order_id = %created.id, service_type = %created.service_type, "order created");
    Ok(created)
}

async fn write_patch(
    ctx: &AdminContext,
    id: &str,
    patch: serde_json::Value,
) -> Result<Order, AdminError> {
    let updated = ctx.store.update(ORDERS, "id", id, patch).await?;
    match updated.into_iter().next() {
        Some(row) => decode_row("order", row),
        None => Err(AdminError::NotFound {
            entity: "order",
            id: id.to_string(),
        }),
    }
}

/// Move an order one step along the lifecycle. A delivered order is
/// returned unchanged without any write.
pub async fn advance_order(ctx: &AdminContext, id: &str) -> Result<Order, AdminError> {
    let order = get_order(ctx, id).await?;
    if order.status.is_terminal() {
        debug!(order_id = %id, "order already delivered, nothing to advance");
        return Ok(order);
    }
    let next = order.status.next();
    let updated = write_patch(ctx, id, json!({ "status": next })).await?;
    info!(order_id = %id, from = %order.status, to = %next, "order advanced");
    Ok(updated)
}

pub async fn set_order_status(
    ctx: &AdminContext,
    id: &str,
    status: OrderStatus,
) -> Result<Order, AdminError> {
    let updated = write_patch(ctx, id, json!({ "status": status })).await?;
    info!(order_id = %id, status = %status, "order status set");
    Ok(updated)
}

/// Hand an order to a rider. Assignment also puts the order en route.
pub async fn assign_rider(
    ctx: &AdminContext,
    order_id: &str,
    rider_id: &str,
) -> Result<Order, AdminError> {
    let rider_id = rider_id.trim();
    if rider_id.is_empty() {
        return Err(AdminError::Validation("Missing rider id".to_string()));
    }
    let updated = write_patch(
        ctx,
        order_id,
        json!({ "rider_id": rider_id, "status": OrderStatus::Enroute }),
    )
    .await?;
    info!(order_id = %order_id, rider_id = %rider_id, "rider assigned");
    Ok(updated)
}

/// Assign the next rider in the session's rotation.
pub async fn auto_assign(
    ctx: &AdminContext,
    order_id: &str,
    riders: &[Rider],
) -> Result<Order, AdminError> {
    let rider = ctx.pick_rider(riders)?.ok_or_else(|| {
        AdminError::Validation("No riders available for auto-assignment".to_string())
    })?;
    assign_rider(ctx, order_id, &rider.id).await
}
