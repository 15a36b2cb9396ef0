// Forbid unwrap() in production code to prevent panics from corrupt pages.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use pagetree::config::WorkloadConfig;
use pagetree::storage::BufferPool;
use pagetree::storage::btree::BTree;
use pagetree::workload;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Segment holding the workload's tree.
const SEGMENT_ID: u16 = 1;

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagetree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match WorkloadConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: pool_capacity={}, threads={}, operations={}, key_space={}, seed={}",
        config.pool_capacity,
        config.threads,
        config.operations,
        config.key_space,
        config.seed
    );

    let pool = BufferPool::new(config.pool_capacity);
    let tree = match config.node_capacity {
        Some(capacity) => BTree::<u64, u64>::with_capacity(SEGMENT_ID, &pool, capacity),
        None => BTree::<u64, u64>::new(SEGMENT_ID, &pool),
    };
    let tree = tree.unwrap_or_else(|e| {
        tracing::error!("Failed to create tree: {e}");
        std::process::exit(1);
    });
    tracing::info!("Node layout: {:?}", tree.layout());

    let started = std::time::Instant::now();
    let report = workload::run(&tree, &config).unwrap_or_else(|e| {
        tracing::error!("Workload failed: {e}");
        std::process::exit(1);
    });
    let elapsed = started.elapsed();

    tracing::info!(
        "Ran {} operations in {elapsed:?}: {} inserts, {} updates, {} erases, {} lookups ({} hits)",
        report.operations(),
        report.inserts,
        report.updates,
        report.erases,
        report.lookups,
        report.hits
    );

    let stats = tree.validate().unwrap_or_else(|e| {
        tracing::error!("Tree validation failed: {e}");
        std::process::exit(1);
    });
    tracing::info!(
        "Tree: height {}, {} inner nodes, {} leaves, {} entries; peak {} pages fixed",
        stats.height,
        stats.inner_nodes,
        stats.leaf_nodes,
        stats.entries,
        pool.peak_fixed()
    );

    let dirty = pool.take_dirty();
    let checksum = dirty.iter().fold(0u32, |acc, page| acc ^ page.checksum);
    tracing::info!(
        "Drained {} dirty pages of {} resident (checksum {checksum:08x})",
        dirty.len(),
        pool.resident()
    );

    if report.mismatches > 0 || stats.entries != report.expected_entries {
        tracing::error!(
            "Tree disagrees with reference: {} mismatched results, {} entries (expected {})",
            report.mismatches,
            stats.entries,
            report.expected_entries
        );
        std::process::exit(1);
    }
}
