//! Rider roster.

use serde_json::json;
use tracing::info;

use crate::auth::AdminContext;
use crate::error::AdminError;
use crate::models::{decode_row, decode_rows, NewRider, Rider, RIDERS};
use crate::remote::Query;

pub async fn list_riders(ctx: &AdminContext) -> Result<Vec<Rider>, AdminError> {
    let rows = ctx.store.select(RIDERS, &Query::all().newest_first()).await?;
    decode_rows("rider", rows)
}

pub async fn create_rider(ctx: &AdminContext, rider: &NewRider) -> Result<Vec<Rider>, AdminError> {
    let row = rider.to_row()?;
    ctx.store.insert(RIDERS, row).await?;
    info!(name = %rider.name.trim(), "rider created");
    list_riders(ctx).await
}

/// Flip `is_active` on one rider. A rider whose flag was never set counts
/// as inactive, so the first toggle activates it.
pub async fn toggle_rider_active(ctx: &AdminContext, id: &str) -> Result<Vec<Rider>, AdminError> {
    let rows = ctx
        .store
        .select(RIDERS, &Query::all().eq("id", id).limit(1))
        .await?;
    let row = rows.into_iter().next().ok_or_else(|| AdminError::NotFound {
        entity: "rider",
        id: id.to_string(),
    })?;
    let rider: Rider = decode_row("rider", row)?;
    let next = !rider.active();
    ctx.store
        .update(RIDERS, "id", id, json!({ "is_active": next }))
        .await?;
    info!(rider_id = %id, active = next, "rider availability toggled");
    list_riders(ctx).await
}
