// Policy Duplicate Detection - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use policy_dedup::{api, logging, AppConfig, SqlitePolicyStore};
use std::path::Path;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(policy_dedup::config::DEFAULT_CONFIG_FILE)?;
    logging::init_stderr(&config.log_filter)?;

    println!("🌐 Policy Duplicate Detection - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = Path::new(&config.database_path);
    if !db_path.exists() {
        eprintln!("❌ Database not found at {:?}", db_path);
        eprintln!("   Run: cargo run -- import <policies.csv>");
        eprintln!("   to import policies first.");
        std::process::exit(1);
    }

    let store = SqlitePolicyStore::open(db_path)?;
    info!(path = ?db_path, "database opened");

    let app = api::router(api::AppState::new(store));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   Check: /api/users/<user>/duplicates?policy_number=<number>");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
