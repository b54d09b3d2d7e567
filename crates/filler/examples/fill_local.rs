//! Terminal rendition of the fill demo: append one buffer to one file in a
//! quota-limited sandbox until the quota runs out.

use std::sync::Arc;
use std::time::Duration;

use fillfs::{FillConfig, FillState, StorageFiller, TracingObserver};
use fillfs_store::LocalStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config = FillConfig {
        buffer_mib: 1,
        quota_bytes: 8 * 1024 * 1024,
        ..FillConfig::load()
    };

    let sandbox = tempfile::tempdir()?;
    let backend = Arc::new(LocalStore::new(sandbox.path(), config.quota_bytes));
    let filler = Arc::new(StorageFiller::new(
        backend,
        Arc::new(TracingObserver),
        &config,
    ));

    filler.initialize().await?;
    filler.start();

    // Run until the quota is exhausted
    while filler.state() != FillState::Failed {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    filler.join().await;

    Ok(())
}
