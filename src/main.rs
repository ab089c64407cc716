//! # Veritas Core Main Entry Point
//!
//! This is the main entry point for the Veritas Core service.

use migration::MigratorTrait;
use veritas_core::{config::ConfigLoader, db, server::run_server, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    telemetry::init_tracing(&config)?;

    println!("Loaded configuration for profile: {}", config.profile);
    if let Ok(redacted_json) = config.redacted_json() {
        println!("Configuration: {}", redacted_json);
    }

    let pool = db::init_pool(&config).await?;
    migration::Migrator::up(&pool, None).await?;

    // Start the server with the loaded configuration
    run_server(config, pool).await
}
