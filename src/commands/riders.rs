use serde::Deserialize;
use serde_json::Value;

use super::{guard, payload_id, payload_object, to_value, user_error};
use crate::auth::AdminContext;
use crate::models::NewRider;
use crate::riders;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RiderCreatePayload {
    #[serde(default)]
    name: String,
    #[serde(default, alias = "mobile")]
    phone: String,
    #[serde(default, alias = "area")]
    zone: Option<String>,
}

pub async fn rider_list(ctx: &AdminContext) -> Result<Value, String> {
    guard(ctx)?;
    to_value(&riders::list_riders(ctx).await.map_err(user_error)?)
}

pub async fn rider_create(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let payload: RiderCreatePayload = serde_json::from_value(payload_object(arg0))
        .map_err(|e| format!("Invalid rider payload: {e}"))?;
    let new = NewRider {
        name: payload.name,
        phone: payload.phone,
        zone: payload.zone,
    };
    to_value(&riders::create_rider(ctx, &new).await.map_err(user_error)?)
}

pub async fn rider_toggle_active(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let id = payload_id(arg0.as_ref(), &["riderId", "rider_id", "id"], "rider id")?;
    to_value(
        &riders::toggle_rider_active(ctx, &id)
            .await
            .map_err(user_error)?,
    )
}
