//! Command layer. Each command performs the remote calls one dashboard
//! screen action would make and returns a JSON value for display.
//!
//! Arguments arrive as a loose JSON payload (`arg0`) so the same handlers
//! serve the CLI and any future front end; errors are user-facing strings.

use serde::Serialize;
use serde_json::Value;

use crate::auth::AdminContext;
use crate::error::AdminError;

pub mod auth;
pub mod customers;
pub mod dashboard;
pub mod export;
pub mod orders;
pub mod prices;
pub mod receipts;
pub mod riders;
pub mod settings;

pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("Failed to serialize response: {e}"))
}

pub(crate) fn user_error(err: AdminError) -> String {
    err.to_string()
}

pub(crate) fn guard(ctx: &AdminContext) -> Result<(), String> {
    crate::auth::require_login(ctx).map_err(user_error)
}

/// Accept either a bare string or an object carrying the id under one of
/// `keys`.
pub(crate) fn payload_id(arg0: Option<&Value>, keys: &[&str], what: &str) -> Result<String, String> {
    let id = match arg0 {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(Value::Object(map)) => keys.iter().find_map(|k| map.get(*k).and_then(Value::as_str)),
        _ => None,
    };
    id.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("Missing {what}"))
}

pub(crate) fn payload_object(arg0: Option<Value>) -> Value {
    match arg0 {
        Some(Value::Object(obj)) => Value::Object(obj),
        _ => serde_json::json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_payload_accepts_string_or_object() {
        let keys = ["orderId", "order_id", "id"];
        assert_eq!(
            payload_id(Some(&json!(" o-1 ")), &keys, "order id").unwrap(),
            "o-1"
        );
        assert_eq!(
            payload_id(Some(&json!({ "order_id": "o-2" })), &keys, "order id").unwrap(),
            "o-2"
        );
        assert_eq!(
            payload_id(Some(&json!({ "id": "" })), &keys, "order id").unwrap_err(),
            "Missing order id"
        );
        assert!(payload_id(None, &keys, "order id").is_err());
    }
}
