use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use uuid::Uuid;
use veritas_core::{
    auth::{generate_agent_key, hash_agent_key},
    config::ConfigLoader,
    db,
    repositories::AgentKeyRepository,
};

/// Mint a telemetry agent key for an org.
///
/// The plaintext key is printed exactly once; only its SHA-256 hash is stored.
#[derive(Parser, Debug)]
#[command(name = "mint-agent-key")]
struct Args {
    /// Org the key is scoped to
    #[arg(long)]
    org_id: Uuid,

    /// Operator-assigned name for the key (e.g., "ada-laptop")
    #[arg(long)]
    name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loader = ConfigLoader::new();
    let config = loader.load().context("loading configuration")?;

    let pool = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    let repo = AgentKeyRepository::new(Arc::new(pool));

    let plaintext = generate_agent_key();
    let key = repo
        .insert(args.org_id, &hash_agent_key(&plaintext), &args.name)
        .await
        .context("inserting agent key")?;

    println!("Minted agent key {} ({})", key.id, key.name);
    println!("Org: {}", key.org_id);
    println!();
    println!("{}", plaintext);
    println!();
    println!("Store this key now. It cannot be recovered later.");

    Ok(())
}
