//! Backend credentials kept in the OS credential store.
//!
//! On Windows this uses DPAPI (via the `keyring` crate), on macOS Keychain,
//! and on Linux the Secret Service API. Environment variables always take
//! precedence; the credential store is the fallback for workstations where
//! the admin ran `config store` once.

use keyring::Entry;
use tracing::{info, warn};

const SERVICE_NAME: &str = "don-lustre-admin";

pub const KEY_SUPABASE_URL: &str = "supabase_url";
pub const KEY_SUPABASE_ANON_KEY: &str = "supabase_anon_key";

const ALL_KEYS: &[&str] = &[KEY_SUPABASE_URL, KEY_SUPABASE_ANON_KEY];

/// Retrieve a single credential. Returns `None` when the entry does not
/// exist or the platform store is unavailable.
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

pub fn set_credential(key: &str, value: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    entry.set_password(value).map_err(|e| e.to_string())?;
    Ok(())
}

/// Delete a credential. Silently succeeds if the entry does not exist.
pub fn delete_credential(key: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

/// Persist the backend URL and anon key.
pub fn store_backend_credentials(url: &str, anon_key: &str) -> Result<(), String> {
    let url = crate::config::normalize_url(url);
    if url.is_empty() || anon_key.trim().is_empty() {
        return Err("Both URL and anon key are required".to_string());
    }
    set_credential(KEY_SUPABASE_URL, &url)?;
    set_credential(KEY_SUPABASE_ANON_KEY, anon_key.trim())?;
    info!(url = %url, "backend credentials stored");
    Ok(())
}

pub fn clear_backend_credentials() -> Result<(), String> {
    info!("deleting stored backend credentials");
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    Ok(())
}
