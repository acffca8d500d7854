//! Admin login gate and session-scoped state.
//!
//! Login exchanges a username/password pair for a boolean through the
//! `check_admin_login` remote procedure. A successful login persists a
//! marker in the local `local_settings` table (category "session"); every
//! protected command checks it. There is no token and no expiry.
//!
//! State that used to be ambient (the round-robin cursor and the prepared
//! logo) lives in [`SessionState`] and is reset on logout.

use chrono::Utc;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::assignment::RoundRobin;
use crate::config::AppConfig;
use crate::db::{self, DbState};
use crate::error::AdminError;
use crate::models::Rider;
use crate::receipt_renderer::PreparedLogo;
use crate::remote::RemoteStore;

const SESSION_CATEGORY: &str = "session";
const KEY_LOGGED_IN: &str = "admin_logged_in";
const KEY_USERNAME: &str = "username";
const KEY_LOGGED_IN_AT: &str = "logged_in_at";
const KEY_ROUND_ROBIN: &str = "round_robin_position";

pub const LOGIN_PROCEDURE: &str = "check_admin_login";

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct SessionState {
    round_robin: Mutex<RoundRobin>,
    logo: Mutex<Option<Arc<PreparedLogo>>>,
}

impl SessionState {
    fn restore_round_robin(&self, position: usize) {
        if let Ok(mut rr) = self.round_robin.lock() {
            *rr = RoundRobin::starting_at(position);
        }
    }

    pub fn round_robin(&self) -> Result<MutexGuard<'_, RoundRobin>, AdminError> {
        self.round_robin
            .lock()
            .map_err(|e| AdminError::Local(format!("session lock poisoned: {e}")))
    }

    pub fn cached_logo(&self) -> Option<Arc<PreparedLogo>> {
        self.logo.lock().ok().and_then(|l| l.clone())
    }

    pub fn cache_logo(&self, logo: Arc<PreparedLogo>) {
        if let Ok(mut slot) = self.logo.lock() {
            *slot = Some(logo);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut rr) = self.round_robin.lock() {
            rr.reset();
        }
        if let Ok(mut logo) = self.logo.lock() {
            *logo = None;
        }
    }
}

/// Everything a command needs: the remote handle, local state and config.
pub struct AdminContext {
    pub store: Arc<dyn RemoteStore>,
    pub db: DbState,
    pub config: AppConfig,
    pub session: SessionState,
}

impl AdminContext {
    /// Build a context, resuming the round-robin cursor of the persisted
    /// session (each CLI invocation is a new process).
    pub fn new(store: Arc<dyn RemoteStore>, db: DbState, config: AppConfig) -> Self {
        let ctx = Self {
            store,
            db,
            config,
            session: SessionState::default(),
        };
        let saved = ctx
            .conn()
            .ok()
            .and_then(|conn| db::get_setting(&conn, SESSION_CATEGORY, KEY_ROUND_ROBIN))
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(position) = saved {
            ctx.session.restore_round_robin(position);
        }
        ctx
    }

    /// Next rider in the rotation; the advanced cursor is persisted with the
    /// session marker so it survives until logout.
    pub fn pick_rider(&self, riders: &[Rider]) -> Result<Option<Rider>, AdminError> {
        let (picked, position) = {
            let mut rr = self.session.round_robin()?;
            let picked = rr.pick(riders).cloned();
            (picked, rr.position())
        };
        if picked.is_some() {
            let conn = self.conn()?;
            db::set_setting(&conn, SESSION_CATEGORY, KEY_ROUND_ROBIN, &position.to_string())?;
        }
        Ok(picked)
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>, AdminError> {
        self.db
            .conn
            .lock()
            .map_err(|e| AdminError::Local(format!("database lock poisoned: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// Interpret the login procedure's response. The procedure returns
/// `{ "success": bool }`, sometimes wrapped in a one-element array.
pub fn parse_login_response(value: &Value) -> Result<bool, AdminError> {
    match value {
        Value::Object(obj) => obj
            .get("success")
            .and_then(Value::as_bool)
            .ok_or_else(|| AdminError::decode("login", "missing boolean `success`")),
        Value::Array(items) if items.len() == 1 => parse_login_response(&items[0]),
        other => Err(AdminError::decode(
            "login",
            format!("expected an object, got {other}"),
        )),
    }
}

pub async fn login(
    ctx: &AdminContext,
    username: &str,
    password: String,
) -> Result<Value, AdminError> {
    let password = Zeroizing::new(password);
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(AdminError::Validation(
            "Username and password are required".to_string(),
        ));
    }

    let args = serde_json::json!({
        "p_username": username,
        "p_password": password.as_str(),
    });
    let response = ctx.store.rpc(LOGIN_PROCEDURE, args).await?;
    if !parse_login_response(&response)? {
        warn!(username, "admin login rejected");
        return Err(AdminError::InvalidCredentials);
    }

    let now = Utc::now().to_rfc3339();
    {
        let conn = ctx.conn()?;
        db::delete_settings(&conn, SESSION_CATEGORY)?;
        db::set_setting(&conn, SESSION_CATEGORY, KEY_LOGGED_IN, "true")?;
        db::set_setting(&conn, SESSION_CATEGORY, KEY_USERNAME, username)?;
        db::set_setting(&conn, SESSION_CATEGORY, KEY_LOGGED_IN_AT, &now)?;
    }
    ctx.session.clear();
    info!(username, "admin logged in");
    Ok(serde_json::json!({ "success": true, "username": username, "loggedInAt": now }))
}

pub fn logout(ctx: &AdminContext) -> Result<Value, AdminError> {
    {
        let conn = ctx.conn()?;
        db::delete_settings(&conn, SESSION_CATEGORY)?;
    }
    ctx.session.clear();
    info!("admin logged out");
    Ok(serde_json::json!({ "success": true }))
}

pub fn is_logged_in(ctx: &AdminContext) -> bool {
    ctx.conn()
        .ok()
        .and_then(|conn| db::get_setting(&conn, SESSION_CATEGORY, KEY_LOGGED_IN))
        .map(|v| v == "true")
        .unwrap_or(false)
}

pub fn require_login(ctx: &AdminContext) -> Result<(), AdminError> {
    if is_logged_in(ctx) {
        Ok(())
    } else {
        Err(AdminError::NotLoggedIn)
    }
}

pub fn session_info(ctx: &AdminContext) -> Value {
    let conn = match ctx.conn() {
        Ok(c) => c,
        Err(_) => return serde_json::json!({ "loggedIn": false }),
    };
    serde_json::json!({
        "loggedIn": db::get_setting(&conn, SESSION_CATEGORY, KEY_LOGGED_IN).as_deref() == Some("true"),
        "username": db::get_setting(&conn, SESSION_CATEGORY, KEY_USERNAME),
        "loggedInAt": db::get_setting(&conn, SESSION_CATEGORY, KEY_LOGGED_IN_AT),
    })
}

#[cfg(test)]
pub(crate) fn test_context(store: Arc<dyn RemoteStore>) -> AdminContext {
    AdminContext::new(
        store,
        db::open_in_memory().expect("in-memory db"),
        AppConfig::for_tests(),
    )
}
