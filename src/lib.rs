//! Don Lustre admin console.
//!
//! Library behind the `don-lustre-admin` binary: typed access to the hosted
//! tables, the order lifecycle, receipt generation and the dashboard
//! aggregator. The binary is a thin clap front end over [`commands`].

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod assignment;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod customers;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod orders;
pub mod pdf;
pub mod price_list;
pub mod pricing;
pub mod realtime;
pub mod receipt_renderer;
pub mod receipts;
pub mod remote;
pub mod riders;
pub mod storage;
pub mod supabase;

use crate::auth::AdminContext;
use crate::cli::{Cli, Commands, ConfigCommand};
use crate::config::AppConfig;
use crate::error::AdminError;
use crate::remote::{MemoryStore, RemoteStore};
use crate::supabase::SupabaseClient;

/// Console plus daily rolling file under `log_dir`. The returned guard
/// flushes the file writer when dropped.
fn init_logging(log_dir: &Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,don_lustre_admin_lib=debug"));
    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    if std::fs::create_dir_all(log_dir).is_err() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, "admin.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();
    Some(guard)
}

fn build_context(offline: bool) -> Result<AdminContext, AdminError> {
    if offline {
        let config = AppConfig::offline()?;
        let store: Arc<dyn RemoteStore> = Arc::new(MemoryStore::new().with_bucket(&config.bucket));
        let db = db::init(&config.data_dir)?;
        info!("running offline against an in-process store");
        return Ok(AdminContext::new(store, db, config));
    }
    let config = AppConfig::load()?;
    let store: Arc<dyn RemoteStore> = Arc::new(SupabaseClient::new(&config)?);
    let db = db::init(&config.data_dir)?;
    Ok(AdminContext::new(store, db, config))
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => error!(error = %e, "failed to format output"),
    }
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    // Credential management works before any backend is configured.
    if let Commands::Config { command } = cli.command {
        let value = match command {
            ConfigCommand::Store { url, anon_key } => commands::settings::settings_store_backend(
                Some(serde_json::json!({ "supabaseUrl": url, "supabaseAnonKey": anon_key })),
            ),
            ConfigCommand::Clear => commands::settings::settings_clear_backend(),
        }
        .map_err(anyhow::Error::msg)?;
        print_json(&value);
        return Ok(());
    }

    let ctx = build_context(cli.offline)?;
    cli::dispatch(&ctx, cli.command, print_json)
        .await
        .map_err(anyhow::Error::msg)
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let _guard = init_logging(&config::log_dir());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("BUILD_GIT_SHA"),
        "Starting Don Lustre admin"
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
