//! Runtime configuration.
//!
//! Values come from the process environment first and fall back to the OS
//! credential store for the backend URL and anon key. The `NEXT_PUBLIC_*`
//! names used by the old web build are accepted as aliases.

use std::path::PathBuf;

use crate::error::AdminError;
use crate::pricing::TaxPolicy;
use crate::storage;

pub const DEFAULT_BUCKET: &str = "receipts";
pub const DEFAULT_TAX_RATE: f64 = 0.085;

const ENV_URL: &[&str] = &["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"];
const ENV_ANON_KEY: &[&str] = &["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"];
const ENV_BUCKET: &[&str] = &["SUPABASE_BUCKET", "NEXT_PUBLIC_SUPABASE_BUCKET"];
const ENV_DATA_DIR: &[&str] = &["DON_LUSTRE_DATA_DIR"];
const ENV_LOGO: &[&str] = &["RECEIPT_LOGO"];
const ENV_TAX_RATE: &[&str] = &["RECEIPT_TAX_RATE"];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub bucket: String,
    pub data_dir: PathBuf,
    pub logo_source: Option<String>,
    pub tax_rate: f64,
}

/// Normalise a backend URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
pub fn normalize_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

pub fn default_data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .or_else(|_| std::env::var("LOCALAPPDATA"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                .join(".local")
                .join("share")
        });
    base.join("don-lustre-admin")
}

fn first_present(lookup: &impl Fn(&str) -> Option<String>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| lookup(name))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn data_dir_from(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    first_present(env, ENV_DATA_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(default_data_dir)
}

/// `RECEIPT_TAX_RATE` as a fraction in `[0, 1)`, defaulting to 8.5 %.
fn tax_rate_from(env: &impl Fn(&str) -> Option<String>) -> Result<f64, AdminError> {
    let Some(raw) = first_present(env, ENV_TAX_RATE) else {
        return Ok(DEFAULT_TAX_RATE);
    };
    let rate: f64 = raw
        .parse()
        .map_err(|_| AdminError::Config(format!("RECEIPT_TAX_RATE is not a number: {raw}")))?;
    if !(0.0..1.0).contains(&rate) {
        return Err(AdminError::Config(format!(
            "RECEIPT_TAX_RATE must be a fraction between 0 and 1, got {raw}"
        )));
    }
    Ok(rate)
}

/// Log directory under the configured data directory. Needs no backend.
pub fn log_dir() -> PathBuf {
    data_dir_from(&|name: &str| std::env::var(name).ok()).join("logs")
}

impl AppConfig {
    /// Load from the process environment and the credential store.
    pub fn load() -> Result<Self, AdminError> {
        Self::resolve(|name| std::env::var(name).ok(), storage::get_credential)
    }

    /// Build a config from an environment lookup and a credential lookup.
    pub fn resolve(
        env: impl Fn(&str) -> Option<String>,
        credentials: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AdminError> {
        let supabase_url = first_present(&env, ENV_URL)
            .or_else(|| credentials(storage::KEY_SUPABASE_URL))
            .map(|u| normalize_url(&u))
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                AdminError::Config(
                    "SUPABASE_URL is not set (or stored via `config store`)".to_string(),
                )
            })?;
        let supabase_anon_key = first_present(&env, ENV_ANON_KEY)
            .or_else(|| credentials(storage::KEY_SUPABASE_ANON_KEY))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                AdminError::Config(
                    "SUPABASE_ANON_KEY is not set (or stored via `config store`)".to_string(),
                )
            })?;
        let tax_rate = tax_rate_from(&env)?;

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            bucket: first_present(&env, ENV_BUCKET).unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            data_dir: data_dir_from(&env),
            logo_source: first_present(&env, ENV_LOGO),
            tax_rate,
        })
    }

    /// Offline configuration: no backend, everything else from the environment.
    pub fn offline() -> Result<Self, AdminError> {
        Self::offline_from(|name| std::env::var(name).ok())
    }

    pub fn offline_from(env: impl Fn(&str) -> Option<String>) -> Result<Self, AdminError> {
        Ok(Self {
            supabase_url: "memory://local".to_string(),
            supabase_anon_key: String::new(),
            bucket: first_present(&env, ENV_BUCKET).unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            data_dir: data_dir_from(&env),
            logo_source: first_present(&env, ENV_LOGO),
            tax_rate: tax_rate_from(&env)?,
        })
    }

    pub fn tax_policy(&self) -> TaxPolicy {
        TaxPolicy::from_rate(self.tax_rate)
    }


    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            supabase_url: "memory://local".to_string(),
            supabase_anon_key: String::new(),
            bucket: DEFAULT_BUCKET.to_string(),
            data_dir: std::env::temp_dir().join("don-lustre-admin-tests"),
            logo_source: None,
            tax_rate: DEFAULT_TAX_RATE,
        }
    }
}
