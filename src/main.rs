mod config;
mod error;
mod ledger;
mod reconciler;
mod report;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AuditConfig;
use crate::error::AuditError;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,bridge_auditor=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🔍 Starting cross-chain bridge proposal audit");

    // Load configuration
    dotenv::dotenv().ok();
    let config = AuditConfig::from_env().map_err(AuditError::from)?;

    info!(
        "Auditing {} (chain {}) <-> {} (chain {})",
        config.chain_a.name, config.chain_a.chain_id, config.chain_b.name, config.chain_b.chain_id
    );

    report::run_audit(&config).await?;

    info!("✅ Audit run completed");

    Ok(())
}
