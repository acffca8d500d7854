use serde::Deserialize;
use serde_json::{json, Value};

use super::payload_object;
use crate::auth::{self, AdminContext};
use crate::config::normalize_url;
use crate::storage;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackendCredentialsPayload {
    #[serde(alias = "supabase_url", alias = "url")]
    supabase_url: String,
    #[serde(alias = "supabase_anon_key", alias = "anonKey", alias = "key")]
    supabase_anon_key: String,
}

/// Persist backend URL and anon key in the OS credential store.
pub fn settings_store_backend(arg0: Option<Value>) -> Result<Value, String> {
    let payload: BackendCredentialsPayload = serde_json::from_value(payload_object(arg0))
        .map_err(|e| format!("Invalid credentials payload: {e}"))?;
    let url = normalize_url(&payload.supabase_url);
    let key = payload.supabase_anon_key.trim();
    if url.is_empty() || key.is_empty() {
        return Err("Both the backend URL and the anon key are required".to_string());
    }
    storage::store_backend_credentials(&url, key)?;
    Ok(json!({ "success": true, "supabaseUrl": url }))
}

pub fn settings_clear_backend() -> Result<Value, String> {
    storage::clear_backend_credentials()?;
    Ok(json!({ "success": true }))
}

/// Build metadata, backend and session state.
pub fn app_get_status(ctx: &AdminContext) -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "builtAt": env!("BUILD_TIMESTAMP"),
        "backend": ctx.config.supabase_url,
        "bucket": ctx.config.bucket,
        "taxRate": ctx.config.tax_rate,
        "dataDir": ctx.config.data_dir.display().to_string(),
        "database": ctx.db.db_path.as_ref().map(|p| p.display().to_string()),
        "session": auth::session_info(ctx),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_context;
    use crate::remote::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn blank_credentials_are_rejected_before_keyring() {
        let err = settings_store_backend(Some(json!({ "url": "  ", "key": "k" }))).unwrap_err();
        assert!(err.contains("required"));
        assert!(settings_store_backend(Some(json!({ "url": "x" }))).is_err());
    }

    #[test]
    fn status_reports_backend_and_session() {
        let ctx = test_context(Arc::new(MemoryStore::new()));
        let status = app_get_status(&ctx);
        assert_eq!(status["bucket"], "receipts");
        assert_eq!(status["session"]["loggedIn"], false);
        assert!(status["database"].is_null());
    }
}
