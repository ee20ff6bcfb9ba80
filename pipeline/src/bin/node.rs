//! Pipeline Node Binary
//!
//! Runs a single-peer ledger pipeline.

use anyhow::Context;
use ledger_core::genesis::Genesis;
use ledger_core::storage::open_storage;
use ledger_core::KeyPair;
use pipeline::{Config, Pipeline, SoloAgreement};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Hex-encoded 32-byte seed for the admin and peer key
fn admin_seed() -> anyhow::Result<[u8; 32]> {
    let Ok(encoded) = std::env::var("PIPELINE_ADMIN_SEED") else {
        warn!("PIPELINE_ADMIN_SEED not set, using an all-zero development seed");
        return Ok([0u8; 32]);
    };
    parse_seed(&encoded)
}

fn parse_seed(encoded: &str) -> anyhow::Result<[u8; 32]> {
    let mut seed = [0u8; 32];
    hex::decode_to_slice(encoded.trim(), &mut seed)
        .context("PIPELINE_ADMIN_SEED must be 64 hex characters")?;
    Ok(seed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    info!("Starting ledger pipeline node");

    // Load configuration
    let config = if let Some(config_path) = std::env::args().nth(1) {
        info!("Loading config from: {}", config_path);
        Config::from_file(&config_path)?
    } else if let Ok(config_path) = std::env::var("PIPELINE_CONFIG") {
        info!("Loading config from: {}", config_path);
        Config::from_file(&config_path)?
    } else {
        info!("Loading config from environment variables");
        Config::from_env()?
    };

    let keypair = KeyPair::from_seed(&admin_seed()?);
    info!("Admin key: {}", keypair.public_key());

    let genesis = Genesis::new(keypair.public_key()).block(&keypair);

    info!(
        "Opening {:?} storage at: {:?}",
        config.ledger.storage, config.ledger.data_dir
    );
    let storage = open_storage(&config.ledger)?;

    let pipeline = Pipeline::builder(genesis)
        .config(config)
        .agreement(Arc::new(SoloAgreement::new(keypair)))
        .storage(storage)
        .start()
        .await?;

    // Log commits
    let mut blocks = pipeline.on_block();
    let block_log = tokio::spawn(async move {
        loop {
            match blocks.recv().await {
                Ok(block) => info!(
                    "Block {} committed: {} accepted, {} rejected",
                    block.height(),
                    block.transactions.len(),
                    block.rejected_transactions.len()
                ),
                Err(RecvError::Lagged(skipped)) => warn!("Block log skipped {} blocks", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!("Pipeline node running at height {}", pipeline.ledger().head().height);

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    // Graceful shutdown
    info!("Shutting down pipeline node...");
    pipeline.shutdown().await?;
    block_log.abort();

    info!("Pipeline node stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed() {
        let seed = parse_seed(&format!(" {}\n", "0f".repeat(32))).unwrap();
        assert_eq!(seed, [0x0f; 32]);
    }

    #[test]
    fn test_parse_seed_rejects_bad_input() {
        assert!(parse_seed("abcd").is_err());
        assert!(parse_seed(&"zz".repeat(32)).is_err());
        // Multi-byte characters must error, not panic on a char boundary
        assert!(parse_seed(&"é".repeat(32)).is_err());
    }
}
