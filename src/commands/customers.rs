use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{guard, payload_object, to_value, user_error};
use crate::auth::AdminContext;
use crate::customers;
use crate::models::NewCustomer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerSearchPayload {
    #[serde(default, alias = "q", alias = "term", alias = "search")]
    query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerCreatePayload {
    #[serde(default)]
    name: String,
    #[serde(default, alias = "mobile", alias = "telephone")]
    phone: String,
    #[serde(default, alias = "whatsapp_id", alias = "whatsapp")]
    whatsapp_id: Option<String>,
}

/// List customers, optionally narrowed by `{ "query": "..." }`.
pub async fn customer_list(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let search: CustomerSearchPayload = serde_json::from_value(payload_object(arg0))
        .unwrap_or(CustomerSearchPayload {
            query: String::new(),
        });
    let all = customers::list_customers(ctx).await.map_err(|e| {
        warn!(error = %e, "customer list failed");
        user_error(e)
    })?;
    to_value(&customers::filter_customers(&all, &search.query))
}

pub async fn customer_create(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let payload: CustomerCreatePayload = serde_json::from_value(payload_object(arg0))
        .map_err(|e| format!("Invalid customer payload: {e}"))?;
    let new = NewCustomer {
        name: payload.name,
        phone: payload.phone,
        whatsapp_id: payload.whatsapp_id,
    };
    let list = customers::create_customer(ctx, &new)
        .await
        .map_err(user_error)?;
    to_value(&list)
}
