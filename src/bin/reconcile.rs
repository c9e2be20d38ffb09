#![recursion_limit = "256"]
//! Operator entry point for the reconciliation auditor.
//!
//! Runs one auditor operation against the configured database and prints the
//! result as JSON on stdout.

use anyhow::Result;
use clap::{Parser, Subcommand};
use finalization_engine::config::Settings;
use finalization_engine::gateway::{PaystackClient, PaystackConfig, WebhookVerifier};
use finalization_engine::observability::{init_logging, LogConfig};
use finalization_engine::repositories::PostgresOrderStore;
use finalization_engine::services::PipelineBuilder;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "reconcile")]
#[command(about = "Find and repair orders with missing tickets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List success orders whose stored tickets fall short.
    Scan,

    /// Insert the missing tickets of one order.
    Repair {
        /// Order id (UUID)
        order_id: Uuid,
    },

    /// Repair every broken success order.
    #[command(name = "repair-all")]
    RepairAll,

    /// Resume orders stuck in ticket issuance past the grace period.
    Sweep {
        /// Override the configured grace period
        #[arg(long)]
        grace_secs: Option<i64>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::new()?;
    init_logging(&LogConfig::from(&settings.application));

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;
    let store = PostgresOrderStore::new(pool.clone());
    store.migrate().await?;

    let mut auditor_settings = settings.auditor.clone();
    if let Commands::Sweep {
        grace_secs: Some(grace),
    } = &cli.command
    {
        auditor_settings.grace_period_secs = *grace;
    }

    let gateway = Arc::new(PaystackClient::new(PaystackConfig {
        base_url: settings.gateway.base_url.clone(),
        secret_key: settings.gateway.secret_key.clone(),
    }));
    let pipeline = PipelineBuilder::new(
        Arc::new(store),
        gateway,
        WebhookVerifier::new(settings.gateway.effective_webhook_secret()),
        settings.gateway.timeout(),
    )
    .finalization_settings(settings.finalization.clone())
    .auditor_settings(auditor_settings)
    .build();
    let auditor = pipeline.auditor;

    let outcome = match cli.command {
        Commands::Scan => {
            let ids = auditor.scan().await?;
            print_json(&serde_json::json!({ "count": ids.len(), "order_ids": ids }))
        }
        Commands::Repair { order_id } => print_json(&auditor.repair(order_id).await?),
        Commands::RepairAll => print_json(&auditor.repair_all().await?),
        Commands::Sweep { .. } => print_json(&auditor.sweep_issuing().await?),
    };

    pool.close().await;
    outcome
}
