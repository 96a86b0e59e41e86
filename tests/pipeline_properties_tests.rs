use molecule_factory_lib::factory::{FactoryState, MoleculeFactory, ProductSink};
use molecule_factory_lib::{FactoryConfig, Product, WorkerId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every reported product
#[derive(Default)]
struct CollectingSink {
    products: Mutex<Vec<Product>>,
}

impl CollectingSink {
    fn count(&self) -> usize {
        self.products.lock().unwrap().len()
    }

    fn workers(&self) -> HashSet<WorkerId> {
        self.products
            .lock()
            .unwrap()
            .iter()
            .map(|product| product.worker)
            .collect()
    }
}

impl ProductSink for CollectingSink {
    fn report(&self, product: &Product) {
        self.products.lock().unwrap().push(product.clone());
    }
}

/// Reference pacing with sources fast enough not to limit throughput
fn steady_state_config() -> FactoryConfig {
    FactoryConfig {
        channel_capacity: 500,
        a_period_ms: 10,
        b_period_ms: 20,
        assembly_ms: 5000,
        target_rate: 10.0,
        ..FactoryConfig::default()
    }
}

#[cfg(test)]
mod pipeline_properties_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_throughput_converges_to_target_rate() {
        let sink = Arc::new(CollectingSink::default());
        let mut factory = MoleculeFactory::new(steady_state_config(), sink.clone()).unwrap();
        assert_eq!(factory.config().worker_count(), 50);

        factory.start().unwrap();

        // First products appear after one assembly time; measure once all workers are busy
        tokio::time::sleep(Duration::from_millis(6_050)).await;
        let before = sink.count();
        assert_eq!(factory.get_stats().pool.active_workers, 50);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let produced = sink.count() - before;

        assert!(
            (90..=110).contains(&produced),
            "expected ~100 products in 10s window, got {}",
            produced
        );
        assert!(sink.workers().len() <= 50);

        factory.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_recipe_conservation_across_shutdown() {
        let sink = Arc::new(CollectingSink::default());
        let mut factory = MoleculeFactory::new(steady_state_config(), sink.clone()).unwrap();
        factory.start().unwrap();

        tokio::time::sleep(Duration::from_millis(7_350)).await;
        let summary = factory.shutdown().await.unwrap();
        let stats = summary.stats;

        let products = stats.assembler.products_completed;
        assert!(products > 0);
        assert_eq!(products as usize, sink.count());

        // Every unit taken either went into a product or was discarded on cancellation
        assert_eq!(
            stats.channel_a.total_taken,
            2 * products + stats.assembler.a_units_discarded
        );
        assert_eq!(
            stats.channel_b.total_taken,
            products + stats.assembler.b_units_discarded
        );
        assert_eq!(stats.assembler.a_units_taken, stats.channel_a.total_taken);
        assert_eq!(stats.assembler.b_units_taken, stats.channel_b.total_taken);

        // Nothing a source produced was lost
        assert_eq!(stats.source_a.units_produced, stats.channel_a.total_put);
        assert_eq!(
            stats.channel_a.total_put,
            stats.channel_a.total_taken + stats.channel_a.len as u64
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_channels_never_exceed_capacity() {
        let config = FactoryConfig {
            channel_capacity: 5,
            a_period_ms: 5,
            b_period_ms: 10,
            assembly_ms: 500,
            target_rate: 4.0,
            ..FactoryConfig::default()
        };
        let sink = Arc::new(CollectingSink::default());
        let mut factory = MoleculeFactory::new(config, sink).unwrap();
        factory.start().unwrap();

        let mut saw_full = false;
        for _ in 0..300 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let stats = factory.get_stats();
            assert!(stats.channel_a.len <= 5);
            assert!(stats.channel_b.len <= 5);
            saw_full |= stats.channel_a.len == 5;
        }
        assert!(saw_full, "source A outpaces demand and should fill its channel");

        let stats = factory.get_stats();
        assert!(stats.source_a.blocked_puts > 0);
        factory.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sources_and_resolves_all_jobs() {
        let sink = Arc::new(CollectingSink::default());
        let mut factory = MoleculeFactory::new(steady_state_config(), sink.clone()).unwrap();
        factory.start().unwrap();

        tokio::time::sleep(Duration::from_millis(8_020)).await;
        let summary = factory.shutdown().await.unwrap();
        assert_eq!(factory.state(), FactoryState::Stopped);

        let produced_a = summary.stats.source_a.units_produced;
        let produced_b = summary.stats.source_b.units_produced;
        assert!(!summary.stats.source_a.is_running);
        assert!(!summary.stats.source_b.is_running);
        assert!(!summary.stats.scheduler.is_running);

        // Every submitted job resolved as a product or a cancellation
        let pool = &summary.stats.pool;
        assert_eq!(
            pool.jobs_submitted,
            pool.jobs_completed + pool.jobs_cancelled + pool.jobs_closed
        );
        assert_eq!(pool.active_workers, 0);
        assert_eq!(summary.pool.workers_aborted, 0);
        assert_eq!(summary.pool.workers_exited, 50);

        // In-flight assemblies were allowed to finish
        assert!(pool.jobs_completed > 30);
        assert_eq!(pool.jobs_completed as usize, sink.count());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let after = factory.get_stats();
        assert_eq!(after.source_a.units_produced, produced_a);
        assert_eq!(after.source_b.units_produced, produced_b);
        assert!(after.channel_a.closed && after.channel_b.closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_assembly_completes_within_derived_grace() {
        let config = FactoryConfig {
            channel_capacity: 500,
            a_period_ms: 10,
            b_period_ms: 20,
            assembly_ms: 20_000,
            target_rate: 2.0,
            ..FactoryConfig::default()
        };
        assert_eq!(config.shutdown_grace(), Duration::from_secs(40));

        let sink = Arc::new(CollectingSink::default());
        let mut factory = MoleculeFactory::new(config, sink.clone()).unwrap();
        factory.start().unwrap();

        tokio::time::sleep(Duration::from_millis(3_050)).await;
        let summary = factory.shutdown().await.unwrap();
        assert_eq!(summary.pool.workers_aborted, 0);

        let stats = summary.stats;
        let pool = &stats.pool;
        assert!(pool.jobs_submitted > 0);
        assert_eq!(pool.jobs_completed, pool.jobs_submitted);
        assert_eq!(pool.jobs_cancelled + pool.jobs_closed, 0);
        assert_eq!(pool.jobs_completed as usize, sink.count());

        assert_eq!(
            stats.channel_a.total_taken,
            2 * stats.assembler.products_completed + stats.assembler.a_units_discarded
        );
        assert_eq!(
            stats.channel_b.total_taken,
            stats.assembler.products_completed + stats.assembler.b_units_discarded
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_b_supply_limits_throughput() {
        // Reference periods: B arrives every 150ms, so at most ~6.7 products/s
        let sink = Arc::new(CollectingSink::default());
        let mut factory = MoleculeFactory::new(FactoryConfig::default(), sink.clone()).unwrap();
        factory.start().unwrap();

        tokio::time::sleep(Duration::from_secs(15)).await;
        let stats = factory.get_stats();

        assert!(stats.assembler.b_units_taken <= stats.source_b.units_produced);
        assert!(sink.count() as u64 <= stats.source_b.units_produced);
        // Demand keeps arriving at the target rate even though supply lags
        assert!(stats.scheduler.ticks >= 150);

        factory.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_deadlock_under_contention() {
        // Many workers racing for scarce units on real threads
        let config = FactoryConfig {
            channel_capacity: 3,
            a_period_ms: 1,
            b_period_ms: 2,
            assembly_ms: 5,
            target_rate: 400.0,
            workers: Some(16),
            shutdown_grace_ms: Some(2_000),
            ..FactoryConfig::default()
        };
        let sink = Arc::new(CollectingSink::default());
        let mut factory = MoleculeFactory::new(config, sink.clone()).unwrap();
        factory.start().unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        let mid_run = sink.count();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(sink.count() > mid_run, "assembly stalled");

        let summary = factory.shutdown().await.unwrap();
        assert_eq!(summary.pool.workers_aborted, 0);

        let stats = summary.stats;
        assert_eq!(
            stats.channel_a.total_taken,
            2 * stats.assembler.products_completed + stats.assembler.a_units_discarded
        );
        assert_eq!(
            stats.channel_b.total_taken,
            stats.assembler.products_completed + stats.assembler.b_units_discarded
        );
    }
}
