//! Remote store abstraction.
//!
//! Every screen talks to the hosted backend through one [`RemoteStore`]
//! handle: table reads and writes, the login procedure, and object uploads.
//! [`MemoryStore`] is an in-process implementation used by tests and by
//! `--offline` dry runs.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::AdminError;

// ---------------------------------------------------------------------------
// Query description
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, String),
    IsNull(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<String>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::IsNull(column.to_string()));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_string(), ascending));
        self
    }

    pub fn newest_first(self) -> Self {
        self.order_by("created_at", false)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, AdminError>;

    /// Insert one row and return the stored representation.
    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, AdminError>;

    /// Patch every row whose `column` equals `value`.
    async fn update(
        &self,
        table: &str,
        column: &str,
        value: &str,
        patch: Value,
    ) -> Result<Vec<Value>, AdminError>;

    /// Insert or merge a row keyed by the comma-separated `on_conflict` columns.
    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
    ) -> Result<Vec<Value>, AdminError>;

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, AdminError>;

    /// Upload an object, replacing any existing object at the same path.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), AdminError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    buckets: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
    admins: Mutex<Vec<(String, String)>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_err<T>(_: std::sync::PoisonError<T>) -> AdminError {
    AdminError::Network("memory store lock poisoned".to_string())
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Render a column value the way PostgREST compares it against a filter.
fn filter_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        // nulls last
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn matches(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|f| match f {
        Filter::Eq(column, expected) => row
            .get(column)
            .map(|v| !v.is_null() && filter_repr(v) == *expected)
            .unwrap_or(false),
        Filter::IsNull(column) => row.get(column).map(Value::is_null).unwrap_or(true),
    })
}

fn merge_into(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (k, v) in patch {
            target.insert(k.clone(), v.clone());
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            buckets: Mutex::new(HashMap::new()),
            admins: Mutex::new(Vec::new()),
        }
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        if let Ok(mut buckets) = self.buckets.lock() {
            buckets.entry(bucket.to_string()).or_default();
        }
        self
    }

    pub fn with_admin(self, username: &str, password: &str) -> Self {
        if let Ok(mut admins) = self.admins.lock() {
            admins.push((username.to_string(), password.to_string()));
        }
        self
    }

    /// Seed rows verbatim (no id or timestamp is generated).
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.entry(table.to_string()).or_default().extend(rows);
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .ok()
            .and_then(|t| t.get(table).cloned())
            .unwrap_or_default()
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.buckets
            .lock()
            .ok()
            .and_then(|b| b.get(bucket).and_then(|objects| objects.get(path).cloned()))
    }

    fn stamp_new_row(row: Value) -> Result<Value, AdminError> {
        let mut row = match row {
            Value::Object(map) => Value::Object(map),
            other => {
                return Err(AdminError::Remote {
                    status: 400,
                    message: format!("row must be an object, got {other}"),
                })
            }
        };
        if row.get("id").map(Value::is_null).unwrap_or(true) {
            row["id"] = Value::String(Uuid::new_v4().to_string());
        }
        if row.get("created_at").map(Value::is_null).unwrap_or(true) {
            row["created_at"] = Value::String(now_timestamp());
        }
        Ok(row)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, AdminError> {
        let tables = self.tables.lock().map_err(lock_err)?;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| matches(r, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some((column, ascending)) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(column), b.get(column));
                if *ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        debug!(table, rows = rows.len(), "memory select");
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, AdminError> {
        let row = Self::stamp_new_row(row)?;
        let mut tables = self.tables.lock().map_err(lock_err)?;
        tables.entry(table.to_string()).or_default().push(row.clone());
        Ok(vec![row])
    }

    async fn update(
        &self,
        table: &str,
        column: &str,
        value: &str,
        patch: Value,
    ) -> Result<Vec<Value>, AdminError> {
        let filters = [Filter::Eq(column.to_string(), value.to_string())];
        let mut tables = self.tables.lock().map_err(lock_err)?;
        let mut updated = Vec::new();
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|r| matches(r, &filters)) {
                merge_into(row, &patch);
                row["updated_at"] = Value::String(now_timestamp());
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
    ) -> Result<Vec<Value>, AdminError> {
        let filters: Vec<Filter> = on_conflict
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|column| {
                let value = row.get(column).map(filter_repr).unwrap_or_default();
                Filter::Eq(column.to_string(), value)
            })
            .collect();
        let mut tables = self.tables.lock().map_err(lock_err)?;
        let rows = tables.entry(table.to_string()).or_default();
        if let Some(existing) = rows.iter_mut().find(|r| matches(r, &filters)) {
            merge_into(existing, &row);
            return Ok(vec![existing.clone()]);
        }
        let row = Self::stamp_new_row(row)?;
        rows.push(row.clone());
        Ok(vec![row])
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, AdminError> {
        match function {
            "check_admin_login" => {
                let username = args.get("p_username").and_then(Value::as_str).unwrap_or("");
                let password = args.get("p_password").and_then(Value::as_str).unwrap_or("");
                let admins = self.admins.lock().map_err(lock_err)?;
                let success = admins
                    .iter()
                    .any(|(u, p)| u == username && p == password);
                Ok(serde_json::json!({ "success": success }))
            }
            other => Err(AdminError::Remote {
                status: 404,
                message: format!("Could not find the function public.{other}"),
            }),
        }
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), AdminError> {
        let mut buckets = self.buckets.lock().map_err(lock_err)?;
        match buckets.get_mut(bucket) {
            Some(objects) => {
                objects.insert(path.to_string(), bytes);
                Ok(())
            }
            None => Err(AdminError::from_storage_message(bucket, "Bucket not found")),
        }
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://storage/v1/object/public/{bucket}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_assigns_id_and_timestamp() {
        let store = MemoryStore::new();
        let rows = store
            .insert("customers", serde_json::json!({ "name": "Ana" }))
            .await
            .unwrap();
        assert!(rows[0]["id"].as_str().is_some());
        assert!(rows[0]["created_at"].as_str().is_some());
    }

    #[tokio::test]
    async fn select_applies_filters_order_and_limit() {
        let store = MemoryStore::new();
        store.seed(
            "orders",
            vec![
                serde_json::json!({ "id": "a", "status": "ready", "created_at": "2025-01-01T00:00:00Z" }),
                serde_json::json!({ "id": "b", "status": "ready", "created_at": "2025-03-01T00:00:00Z" }),
                serde_json::json!({ "id": "c", "status": "received", "created_at": "2025-02-01T00:00:00Z" }),
            ],
        );
        let rows = store
            .select("orders", &Query::all().eq("status", "ready").newest_first())
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let limited = store
            .select("orders", &Query::all().newest_first().limit(1))
            .await
            .unwrap();
        assert_eq!(limited[0]["id"], "b");
    }

    #[tokio::test]
    async fn upsert_merges_on_composite_key() {
        let store = MemoryStore::new();
        let key = "service_type,material";
        store
            .upsert(
                "price_list",
                serde_json::json!({ "service_type": "Cleaning", "material": "Suede", "base_price": 10.0 }),
                key,
            )
            .await
            .unwrap();
        store
            .upsert(
                "price_list",
                serde_json::json!({ "service_type": "Cleaning", "material": "Suede", "base_price": 12.0 }),
                key,
            )
            .await
            .unwrap();
        let rows = store.rows("price_list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["base_price"], 12.0);
    }

    #[tokio::test]
    async fn is_null_filter_matches_missing_and_null_columns() {
        let store = MemoryStore::new();
        store.seed(
            "receipts",
            vec![
                serde_json::json!({ "id": "1", "receipt_url": null }),
                serde_json::json!({ "id": "2", "receipt_url": "https://x" }),
                serde_json::json!({ "id": "3" }),
            ],
        );
        let rows = store
            .select("receipts", &Query::all().is_null("receipt_url"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn upload_to_unknown_bucket_reports_missing_bucket() {
        let store = MemoryStore::new();
        let err = store
            .upload("receipts", "a.pdf", vec![1, 2, 3], "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::BucketMissing { .. }));

        let store = MemoryStore::new().with_bucket("receipts");
        store
            .upload("receipts", "a.pdf", vec![1], "application/pdf")
            .await
            .unwrap();
        store
            .upload("receipts", "a.pdf", vec![2], "application/pdf")
            .await
            .unwrap();
        assert_eq!(store.object("receipts", "a.pdf"), Some(vec![2]));
    }

    #[tokio::test]
    async fn login_procedure_checks_registered_admins() {
        let store = MemoryStore::new().with_admin("admin", "secret");
        let ok = store
            .rpc(
                "check_admin_login",
                serde_json::json!({ "p_username": "admin", "p_password": "secret" }),
            )
            .await
            .unwrap();
        assert_eq!(ok["success"], true);
        let bad = store
            .rpc(
                "check_admin_login",
                serde_json::json!({ "p_username": "admin", "p_password": "nope" }),
            )
            .await
            .unwrap();
        assert_eq!(bad["success"], false);
    }
}
