pub mod config;
pub mod factory;
pub mod log;
pub mod types;

// Re-export pipeline types for testing and external use
pub use config::FactoryConfig;
pub use factory::{
    AtomSource, BoundedChannel, BoundedWorkerPool, FactoryError, FactoryStats, LogSink,
    MoleculeAssembler, MoleculeFactory, ProductSink, RateScheduler, ShutdownSummary,
};
pub use types::{Product, Unit, UnitKind, WorkerId, RECIPE};

use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info};

/// Resolves on Ctrl-C / SIGINT
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("❌ Failed to listen for shutdown signal: {}", e);
        // Keep running until the process is killed
        std::future::pending::<()>().await;
    }
}

/// Process entry point: load config, run the factory until Ctrl-C, shut down in order
pub fn run() -> anyhow::Result<()> {
    log::init_tracing("info");
    if std::env::var("FACTORY_DEBUG").map(|v| v == "1").unwrap_or(false) {
        log::set_factory_debug(true);
    }

    // Configuration errors stop us before anything is spawned
    let config = FactoryConfig::load().context("loading factory configuration")?;
    config.validate().context("invalid factory configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("molecule-factory")
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async move {
        let mut factory = MoleculeFactory::new(config, Arc::new(LogSink))?;
        info!(
            "🏭 Molecule factory {} starting, press Ctrl-C to stop",
            factory.run_id()
        );

        let summary = factory.run_until(shutdown_signal()).await?;
        info!(
            "👋 Shutting down... {} products in {:?} ({:.2}/s)",
            summary.stats.assembler.products_completed,
            summary.stats.uptime,
            summary.stats.realized_rate
        );
        Ok(())
    })
}
