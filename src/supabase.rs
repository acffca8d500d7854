//! Hosted backend client.
//!
//! Implements [`RemoteStore`] over the backend's REST surface: PostgREST for
//! tables and remote procedures, and the storage API for receipt uploads.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::AdminError;
use crate::remote::{Filter, Query, RemoteStore};

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> AdminError {
    let message = if err.is_connect() {
        format!("Cannot reach backend at {url}")
    } else if err.is_timeout() {
        format!("Connection to {url} timed out")
    } else if err.is_builder() {
        format!("Invalid backend URL: {url}")
    } else {
        format!("Network error communicating with {url}: {err}")
    };
    AdminError::Network(message)
}

/// Convert an HTTP status code into a user-friendly message.
fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Anon key is invalid or expired".to_string(),
        403 => "Request rejected by row-level security".to_string(),
        404 => "Backend endpoint not found".to_string(),
        s if s >= 500 => format!("Backend server error (HTTP {s})"),
        s => format!("Unexpected response from backend (HTTP {s})"),
    }
}

/// Pull the most descriptive message out of an error body.
fn error_detail(status: StatusCode, body_text: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body_text) {
        let message = json
            .get("message")
            .or_else(|| json.get("error"))
            .or_else(|| json.get("msg"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| status_message(status));
        return match json.get("details").filter(|d| !d.is_null()) {
            Some(Value::String(details)) => format!("{message}: {details}"),
            Some(details) => format!("{message}: {details}"),
            None => message,
        };
    }
    let trimmed = body_text.trim();
    if trimmed.is_empty() {
        status_message(status)
    } else {
        format!("{}: {trimmed}", status_message(status))
    }
}

// ---------------------------------------------------------------------------
// Query encoding
// ---------------------------------------------------------------------------

/// Encode a [`Query`] as PostgREST query parameters.
pub fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), query.columns.clone())];
    for filter in &query.filters {
        match filter {
            Filter::Eq(column, value) => params.push((column.clone(), format!("eq.{value}"))),
            Filter::IsNull(column) => params.push((column.clone(), "is.null".to_string())),
        }
    }
    if let Some((column, ascending)) = &query.order {
        let dir = if *ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{column}.{dir}")));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct SupabaseClient {
    base_url: String,
    anon_key: String,
    http: Client,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Result<Self, AdminError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AdminError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            http,
        })
    }

    fn url(&self, path: &str, params: &[(String, String)]) -> Result<Url, AdminError> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| AdminError::Config(format!("Invalid backend URL: {e}")))?;
        if !params.is_empty() {
            let mut qp = url.query_pairs_mut();
            for (k, v) in params {
                qp.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    /// Send a request and return the JSON body (`Null` for an empty body).
    async fn send(&self, req: RequestBuilder) -> Result<Value, AdminError> {
        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let message = error_detail(status, &body_text);
            warn!(status = status.as_u16(), %message, "backend request failed");
            return Err(AdminError::Remote {
                status: status.as_u16(),
                message,
            });
        }
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text)
            .map_err(|e| AdminError::decode("response", format!("invalid JSON: {e}")))
    }

    async fn send_rows(&self, req: RequestBuilder) -> Result<Vec<Value>, AdminError> {
        match self.send(req).await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Err(AdminError::decode(
                "response",
                format!("expected an array of rows, got {other}"),
            )),
        }
    }
}

#[async_trait]
impl RemoteStore for SupabaseClient {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, AdminError> {
        let url = self.url(&format!("/rest/v1/{table}"), &query_params(query))?;
        debug!(table, "select");
        self.send_rows(self.request(Method::GET, url)).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, AdminError> {
        let url = self.url(&format!("/rest/v1/{table}"), &[])?;
        debug!(table, "insert");
        let req = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(&row);
        self.send_rows(req).await
    }

    async fn update(
        &self,
        table: &str,
        column: &str,
        value: &str,
        patch: Value,
    ) -> Result<Vec<Value>, AdminError> {
        let params = vec![(column.to_string(), format!("eq.{value}"))];
        let url = self.url(&format!("/rest/v1/{table}"), &params)?;
        debug!(table, column, value, "update");
        let req = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&patch);
        self.send_rows(req).await
    }

    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
    ) -> Result<Vec<Value>, AdminError> {
        let params = vec![("on_conflict".to_string(), on_conflict.to_string())];
        let url = self.url(&format!("/rest/v1/{table}"), &params)?;
        debug!(table, on_conflict, "upsert");
        let req = self
            .request(Method::POST, url)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&row);
        self.send_rows(req).await
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, AdminError> {
        let url = self.url(&format!("/rest/v1/rpc/{function}"), &[])?;
        debug!(function, "rpc");
        self.send(self.request(Method::POST, url).json(&args)).await
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), AdminError> {
        let url = self.url(&format!("/storage/v1/object/{bucket}/{path}"), &[])?;
        let size = bytes.len();
        let req = self
            .request(Method::POST, url)
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes);
        match self.send(req).await {
            Ok(_) => {
                debug!(bucket, path, size, "object uploaded");
                Ok(())
            }
            Err(AdminError::Remote { message, .. }) => {
                Err(AdminError::from_storage_message(bucket, &message))
            }
            Err(other) => Err(other),
        }
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{bucket}/{path}",
            self.base_url
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SupabaseClient {
        let config = AppConfig {
            supabase_url: "https://demo.supabase.co/".into(),
            supabase_anon_key: "anon".into(),
            ..AppConfig::for_tests()
        };
        SupabaseClient::new(&config).unwrap()
    }

    #[test]
    fn encodes_postgrest_query() {
        let params = query_params(
            &Query::all()
                .eq("order_id", "o-1")
                .is_null("receipt_url")
                .newest_first()
                .limit(500),
        );
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("order_id".to_string(), "eq.o-1".to_string()),
                ("receipt_url".to_string(), "is.null".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "500".to_string()),
            ]
        );
    }

    #[test]
    fn public_url_strips_trailing_slash_from_base() {
        assert_eq!(
            client().public_url("receipts", "o-1.pdf"),
            "https://demo.supabase.co/storage/v1/object/public/receipts/o-1.pdf"
        );
    }

    #[test]
    fn error_detail_prefers_message_field() {
        let detail = error_detail(
            StatusCode::BAD_REQUEST,
            r#"{"message":"null value in column \"name\"","details":"Failing row"}"#,
        );
        assert_eq!(detail, "null value in column \"name\": Failing row");
    }

    #[test]
    fn error_detail_handles_storage_bucket_errors() {
        let detail = error_detail(
            StatusCode::NOT_FOUND,
            r#"{"statusCode":"404","error":"Bucket not found","message":"Bucket not found"}"#,
        );
        let err = AdminError::from_storage_message("receipts", &detail);
        assert!(matches!(err, AdminError::BucketMissing { .. }));
    }

    #[test]
    fn error_detail_falls_back_to_status_text() {
        assert_eq!(
            error_detail(StatusCode::UNAUTHORIZED, ""),
            "Anon key is invalid or expired"
        );
    }
}
