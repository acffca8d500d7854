//! Command-line surface. Each subcommand builds the JSON payload a screen
//! action would send and hands it to the matching command handler.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::io::BufRead;
use std::path::PathBuf;

use crate::auth::AdminContext;
use crate::commands;

#[derive(Parser)]
#[command(name = "don-lustre-admin")]
#[command(about = "Don Lustre admin console", version)]
pub struct Cli {
    /// Run against an empty in-process store instead of the hosted backend.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check credentials with the backend and open a session.
    Login {
        #[arg(long)]
        username: String,
        /// Read from stdin when omitted.
        #[arg(long, env = "DON_LUSTRE_ADMIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    Logout,
    /// Show who is logged in on this machine.
    Session,
    /// Build, backend and session information.
    Status,
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    Customers {
        #[command(subcommand)]
        command: CustomerCommand,
    },
    Riders {
        #[command(subcommand)]
        command: RiderCommand,
    },
    Prices {
        #[command(subcommand)]
        command: PriceCommand,
    },
    Orders {
        #[command(subcommand)]
        command: OrderCommand,
    },
    Receipts {
        #[command(subcommand)]
        command: ReceiptCommand,
    },
    /// Order totals, status counts, monthly series and top services.
    Dashboard {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        query: Option<String>,
        /// Keep running and print a refreshed summary on every order change.
        #[arg(long, default_value_t = false)]
        watch: bool,
    },
    /// Write the (filtered) order list to `orders_<timestamp>.csv`.
    Export {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Save backend URL and anon key in the OS credential store.
    Store {
        #[arg(long)]
        url: String,
        #[arg(long)]
        anon_key: String,
    },
    Clear,
}

#[derive(Subcommand)]
pub enum CustomerCommand {
    List {
        #[arg(long)]
        query: Option<String>,
    },
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        whatsapp_id: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum RiderCommand {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        zone: Option<String>,
    },
    /// Flip a rider's availability.
    Toggle { id: String },
}

#[derive(Subcommand)]
pub enum PriceCommand {
    List,
    /// Create or replace the price of a service/material pair.
    Set {
        #[arg(long)]
        service_type: String,
        #[arg(long)]
        material: String,
        #[arg(long)]
        base_price: f64,
        #[arg(long)]
        express_price: Option<f64>,
    },
}

#[derive(Subcommand)]
pub enum OrderCommand {
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    Add {
        #[arg(long)]
        customer_id: String,
        #[arg(long)]
        service_type: String,
        #[arg(long)]
        material: String,
        #[arg(long, default_value_t = 1)]
        quantity: i64,
        #[arg(long)]
        pickup_address: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        express: bool,
    },
    /// Move an order to its next status.
    Advance { id: String },
    SetStatus { id: String, status: String },
    Assign {
        id: String,
        #[arg(long)]
        rider: String,
    },
    /// Assign the next rider in the session's rotation.
    AutoAssign { id: String },
}

#[derive(Subcommand)]
pub enum ReceiptCommand {
    List,
    Generate {
        order_id: String,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Regenerate receipts whose upload failed.
    Retry,
}

fn read_password_from_stdin() -> Result<String, String> {
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| format!("Failed to read password: {e}"))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn filter_payload(status: Option<String>, query: Option<String>) -> Value {
    json!({ "status": status, "query": query })
}

/// Run one subcommand. `emit` receives every result value; `dashboard
/// --watch` emits repeatedly.
pub async fn dispatch<F>(ctx: &AdminContext, command: Commands, mut emit: F) -> Result<(), String>
where
    F: FnMut(&Value),
{
    let value = match command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => read_password_from_stdin()?,
            };
            commands::auth::auth_login(
                ctx,
                Some(json!({ "username": username, "password": password })),
            )
            .await?
        }
        Commands::Logout => commands::auth::auth_logout(ctx).await?,
        Commands::Session => commands::auth::auth_get_current_session(ctx).await?,
        Commands::Status => commands::settings::app_get_status(ctx),
        Commands::Config { command } => match command {
            ConfigCommand::Store { url, anon_key } => commands::settings::settings_store_backend(
                Some(json!({ "supabaseUrl": url, "supabaseAnonKey": anon_key })),
            )?,
            ConfigCommand::Clear => commands::settings::settings_clear_backend()?,
        },
        Commands::Customers { command } => match command {
            CustomerCommand::List { query } => {
                let payload = json!({ "query": query.unwrap_or_default() });
                commands::customers::customer_list(ctx, Some(payload)).await?
            }
            CustomerCommand::Add {
                name,
                phone,
                whatsapp_id,
            } => {
                commands::customers::customer_create(
                    ctx,
                    Some(json!({ "name": name, "phone": phone, "whatsappId": whatsapp_id })),
                )
                .await?
            }
        },
        Commands::Riders { command } => match command {
            RiderCommand::List => commands::riders::rider_list(ctx).await?,
            RiderCommand::Add { name, phone, zone } => {
                commands::riders::rider_create(
                    ctx,
                    Some(json!({ "name": name, "phone": phone, "zone": zone })),
                )
                .await?
            }
            RiderCommand::Toggle { id } => {
                commands::riders::rider_toggle_active(ctx, Some(Value::String(id))).await?
            }
        },
        Commands::Prices { command } => match command {
            PriceCommand::List => commands::prices::price_get_all(ctx).await?,
            PriceCommand::Set {
                service_type,
                material,
                base_price,
                express_price,
            } => {
                commands::prices::price_set(
                    ctx,
                    Some(json!({
                        "serviceType": service_type,
                        "material": material,
                        "basePrice": base_price,
                        "expressPrice": express_price,
                    })),
                )
                .await?
            }
        },
        Commands::Orders { command } => match command {
            OrderCommand::List { limit } => {
                commands::orders::order_get_all(ctx, Some(json!({ "limit": limit }))).await?
            }
            OrderCommand::Add {
                customer_id,
                service_type,
                material,
                quantity,
                pickup_address,
                notes,
                express,
            } => {
                commands::orders::order_create(
                    ctx,
                    Some(json!({
                        "customerId": customer_id,
                        "serviceType": service_type,
                        "material": material,
                        "quantity": quantity,
                        "pickupAddress": pickup_address,
                        "notes": notes,
                        "express": express.then_some(true),
                    })),
                )
                .await?
            }
            OrderCommand::Advance { id } => {
                commands::orders::order_advance(ctx, Some(Value::String(id))).await?
            }
            OrderCommand::SetStatus { id, status } => {
                commands::orders::order_update_status(
                    ctx,
                    Some(json!({ "orderId": id, "status": status })),
                )
                .await?
            }
            OrderCommand::Assign { id, rider } => {
                commands::orders::order_assign_rider(
                    ctx,
                    Some(json!({ "orderId": id, "riderId": rider })),
                )
                .await?
            }
            OrderCommand::AutoAssign { id } => {
                commands::orders::order_auto_assign(ctx, Some(Value::String(id))).await?
            }
        },
        Commands::Receipts { command } => match command {
            ReceiptCommand::List => commands::receipts::receipt_list(ctx).await?,
            ReceiptCommand::Generate { order_id, out_dir } => {
                commands::receipts::receipt_generate(
                    ctx,
                    Some(json!({ "orderId": order_id, "outDir": out_dir })),
                )
                .await?
            }
            ReceiptCommand::Retry => commands::receipts::receipt_retry_uploads(ctx).await?,
        },
        Commands::Dashboard {
            status,
            query,
            watch,
        } => {
            let payload = filter_payload(status, query);
            if watch {
                return commands::dashboard::dashboard_watch(ctx, Some(payload), emit).await;
            }
            commands::dashboard::dashboard_get_summary(ctx, Some(payload)).await?
        }
        Commands::Export {
            status,
            query,
            out_dir,
        } => {
            let mut payload = filter_payload(status, query);
            payload["outDir"] = json!(out_dir.display().to_string());
            commands::export::export_orders_csv(ctx, Some(payload)).await?
        }
    };
    emit(&value);
    Ok(())
}
