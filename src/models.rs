//! Records mirrored from the remote tables.
//!
//! Every row coming back from the store is decoded into one of these types
//! before use; a row with the wrong shape is rejected with
//! [`AdminError::Decode`] instead of being coerced.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::AdminError;

pub const CUSTOMERS: &str = "customers";
pub const ORDERS: &str = "orders";
pub const RIDERS: &str = "riders";
pub const PRICE_LIST: &str = "price_list";
pub const RECEIPTS: &str = "receipts";

// ---------------------------------------------------------------------------
// Order status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OrderStatus {
    Received,
    Processing,
    Ready,
    Enroute,
    Delivered,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Received,
        OrderStatus::Processing,
        OrderStatus::Ready,
        OrderStatus::Enroute,
        OrderStatus::Delivered,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Received => "received",
            OrderStatus::Processing => "processing",
            OrderStatus::Ready => "ready",
            OrderStatus::Enroute => "enroute",
            OrderStatus::Delivered => "delivered",
        }
    }

    /// The following status; `Delivered` stays `Delivered`.
    pub fn next(self) -> Self {
        match self {
            OrderStatus::Received => OrderStatus::Processing,
            OrderStatus::Processing => OrderStatus::Ready,
            OrderStatus::Ready => OrderStatus::Enroute,
            OrderStatus::Enroute | OrderStatus::Delivered => OrderStatus::Delivered,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == OrderStatus::Delivered
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Spanish labels were written by the first version of the dashboard.
        match s.trim().to_lowercase().as_str() {
            "received" | "pedido recibido" => Ok(OrderStatus::Received),
            "processing" | "en proceso" => Ok(OrderStatus::Processing),
            "ready" | "listo" => Ok(OrderStatus::Ready),
            "enroute" | "en route" | "en camino" => Ok(OrderStatus::Enroute),
            "delivered" | "entregado" => Ok(OrderStatus::Delivered),
            other => Err(format!("unknown order status: {other:?}")),
        }
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub whatsapp_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub rider_id: Option<String>,
    pub service_type: String,
    #[serde(default)]
    pub material: Option<String>,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub pickup_address: Option<String>,
    #[serde(default)]
    pub pickup_lat: Option<f64>,
    #[serde(default)]
    pub pickup_lng: Option<f64>,
    pub status: OrderStatus,
    #[serde(default)]
    pub express: Option<bool>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Timestamp used to decide which of two copies of a row is newer.
    pub fn revision(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }

    pub fn material_label(&self) -> &str {
        self.material.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rider {
    pub id: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Rider {
    pub fn active(&self) -> bool {
        self.is_active.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceListItem {
    pub id: String,
    pub service_type: String,
    pub material: String,
    pub base_price: f64,
    #[serde(default)]
    pub express_price: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Receipt {
    pub id: String,
    pub order_id: String,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Decode a batch of rows, failing on the first one with an unexpected shape.
pub fn decode_rows<T: DeserializeOwned>(
    entity: &'static str,
    rows: Vec<Value>,
) -> Result<Vec<T>, AdminError> {
    rows.into_iter().map(|row| decode_row(entity, row)).collect()
}

pub fn decode_row<T: DeserializeOwned>(entity: &'static str, row: Value) -> Result<T, AdminError> {
    serde_json::from_value(row).map_err(|e| AdminError::decode(entity, e))
}

// ---------------------------------------------------------------------------
// Form payloads
// ---------------------------------------------------------------------------

fn required(field: &str, value: &str) -> Result<String, AdminError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AdminError::Validation(format!("Missing required field: {field}")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Default)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    pub whatsapp_id: Option<String>,
}

impl NewCustomer {
    pub fn to_row(&self) -> Result<Value, AdminError> {
        Ok(serde_json::json!({
            "name": required("name", &self.name)?,
            "phone": required("phone", &self.phone)?,
            "whatsapp_id": optional(self.whatsapp_id.as_deref()),
        }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewRider {
    pub name: String,
    pub phone: String,
    pub zone: Option<String>,
}

impl NewRider {
    pub fn to_row(&self) -> Result<Value, AdminError> {
        Ok(serde_json::json!({
            "name": required("name", &self.name)?,
            "phone": required("phone", &self.phone)?,
            "zone": optional(self.zone.as_deref()),
        }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    pub customer_id: String,
    pub service_type: String,
    pub material: String,
    pub quantity: i64,
    pub pickup_address: String,
    pub notes: Option<String>,
    pub express: Option<bool>,
}

impl NewOrder {
    pub fn to_row(&self) -> Result<Value, AdminError> {
        if self.quantity < 1 {
            return Err(AdminError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }
        let mut row = serde_json::json!({
            "customer_id": required("customer_id", &self.customer_id)?,
            "service_type": required("service_type", &self.service_type)?,
            "material": required("material", &self.material)?,
            "quantity": self.quantity,
            "pickup_address": required("pickup_address", &self.pickup_address)?,
            "status": OrderStatus::Received,
        });
        if let Some(notes) = optional(self.notes.as_deref()) {
            row["notes"] = Value::String(notes);
        }
        if let Some(express) = self.express {
            row["express"] = Value::Bool(express);
        }
        Ok(row)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriceListEntry {
    pub service_type: String,
    pub material: String,
    pub base_price: f64,
    pub express_price: Option<f64>,
}

impl PriceListEntry {
    pub fn to_row(&self) -> Result<Value, AdminError> {
        if !self.base_price.is_finite() || self.base_price < 0.0 {
            return Err(AdminError::Validation(
                "Base price must be a non-negative number".to_string(),
            ));
        }
        if let Some(express) = self.express_price {
            if !express.is_finite() || express < 0.0 {
                return Err(AdminError::Validation(
                    "Express price must be a non-negative number".to_string(),
                ));
            }
        }
        Ok(serde_json::json!({
            "service_type": required("service_type", &self.service_type)?,
            "material": required("material", &self.material)?,
            "base_price": self.base_price,
            "express_price": self.express_price,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_status_walks_the_fixed_order() {
        let mut status = OrderStatus::Received;
        let mut seen = vec![status];
        for _ in 0..4 {
            status = status.next();
            seen.push(status);
        }
        assert_eq!(seen, OrderStatus::ALL.to_vec());
    }

    #[test]
    fn advancing_delivered_is_a_no_op() {
        assert_eq!(OrderStatus::Delivered.next(), OrderStatus::Delivered);
        assert_eq!(
            OrderStatus::Delivered.next().next(),
            OrderStatus::Delivered
        );
    }

    #[test]
    fn legacy_spanish_statuses_are_accepted() {
        assert_eq!(
            "pedido recibido".parse::<OrderStatus>(),
            Ok(OrderStatus::Received)
        );
        assert_eq!("En Camino".parse::<OrderStatus>(), Ok(OrderStatus::Enroute));
        assert_eq!("entregado".parse::<OrderStatus>(), Ok(OrderStatus::Delivered));
        assert!("cancelled".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn status_serializes_canonically() {
        let value = serde_json::to_value(OrderStatus::Enroute).unwrap();
        assert_eq!(value, serde_json::json!("enroute"));
    }

    #[test]
    fn order_decodes_with_optional_columns_missing() {
        let order: Order = decode_row(
            "order",
            serde_json::json!({
                "id": "o-1",
                "service_type": "Cleaning",
                "quantity": 2,
                "status": "listo",
                "created_at": "2025-03-01T10:00:00+00:00"
            }),
        )
        .unwrap();
        assert_eq!(order.status, OrderStatus::Ready);
        assert_eq!(order.customer_id, None);
        assert_eq!(order.revision(), order.created_at);
    }

    #[test]
    fn malformed_row_is_a_typed_error() {
        let err = decode_rows::<Customer>(
            "customer",
            vec![serde_json::json!({ "id": "c-1", "name": "Ana" })],
        )
        .unwrap_err();
        assert!(matches!(err, AdminError::Decode { entity: "customer", .. }));
    }

    #[test]
    fn new_order_requires_fields_and_positive_quantity() {
        let mut order = NewOrder {
            customer_id: "c-1".into(),
            service_type: "Cleaning".into(),
            material: "Leather".into(),
            quantity: 0,
            pickup_address: "Main St 1".into(),
            ..Default::default()
        };
        assert!(matches!(order.to_row(), Err(AdminError::Validation(_))));

        order.quantity = 2;
        order.pickup_address = "   ".into();
        let err = order.to_row().unwrap_err();
        assert!(err.to_string().contains("pickup_address"));

        order.pickup_address = "Main St 1".into();
        let row = order.to_row().unwrap();
        assert_eq!(row["status"], "received");
        assert!(row.get("notes").is_none());
    }

    #[test]
    fn blank_optional_fields_become_null() {
        let row = NewCustomer {
            name: "Ana".into(),
            phone: "555".into(),
            whatsapp_id: Some("  ".into()),
        }
        .to_row()
        .unwrap();
        assert!(row["whatsapp_id"].is_null());
    }

    #[test]
    fn price_entry_rejects_negative_prices() {
        let entry = PriceListEntry {
            service_type: "Cleaning".into(),
            material: "Suede".into(),
            base_price: -1.0,
            express_price: None,
        };
        assert!(entry.to_row().is_err());
    }
}
