use serde::Deserialize;
use serde_json::Value;

use super::{guard, payload_object, to_value, user_error};
use crate::auth::AdminContext;
use crate::models::PriceListEntry;
use crate::price_list;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceSetPayload {
    #[serde(default, alias = "service_type", alias = "service")]
    service_type: String,
    #[serde(default)]
    material: String,
    #[serde(alias = "base_price", alias = "price")]
    base_price: f64,
    #[serde(default, alias = "express_price", alias = "express")]
    express_price: Option<f64>,
}

pub async fn price_get_all(ctx: &AdminContext) -> Result<Value, String> {
    guard(ctx)?;
    to_value(&price_list::list_prices(ctx).await.map_err(user_error)?)
}

pub async fn price_set(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let payload: PriceSetPayload = serde_json::from_value(payload_object(arg0))
        .map_err(|e| format!("Invalid price payload: {e}"))?;
    let entry = PriceListEntry {
        service_type: payload.service_type,
        material: payload.material,
        base_price: payload.base_price,
        express_price: payload.express_price,
    };
    to_value(
        &price_list::upsert_price(ctx, &entry)
            .await
            .map_err(user_error)?,
    )
}
