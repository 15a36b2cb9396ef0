//! Concurrent randomized workload against a tree.
//!
//! Each worker thread owns a disjoint slice of the key space and mirrors its
//! operations in a `BTreeMap`, so every lookup and every returned old value
//! can be checked without coordinating with the other workers.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::WorkloadConfig;
use crate::storage::btree::{BTree, BTreeError};

/// Operation counts of one worker, or of all workers combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadReport {
    pub inserts: u64,
    pub updates: u64,
    pub erases: u64,
    pub lookups: u64,
    pub hits: u64,
    /// Results that disagreed with the reference map.
    pub mismatches: u64,
    /// Entries the workers expect the tree to hold at the end.
    pub expected_entries: usize,
}

impl WorkloadReport {
    fn merge(&mut self, other: &Self) {
        self.inserts += other.inserts;
        self.updates += other.updates;
        self.erases += other.erases;
        self.lookups += other.lookups;
        self.hits += other.hits;
        self.mismatches += other.mismatches;
        self.expected_entries += other.expected_entries;
    }

    /// Total operations performed.
    #[must_use]
    pub const fn operations(&self) -> u64 {
        self.inserts + self.updates + self.erases + self.lookups
    }
}

/// Error returned when the workload cannot complete.
#[derive(Debug)]
pub enum WorkloadError {
    /// A tree operation failed.
    Tree(BTreeError),
    /// A worker thread panicked.
    WorkerPanicked(usize),
}

impl std::fmt::Display for WorkloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree(e) => write!(f, "tree error: {e}"),
            Self::WorkerPanicked(worker) => write!(f, "worker {worker} panicked"),
        }
    }
}

impl std::error::Error for WorkloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tree(e) => Some(e),
            Self::WorkerPanicked(_) => None,
        }
    }
}

impl From<BTreeError> for WorkloadError {
    fn from(e: BTreeError) -> Self {
        Self::Tree(e)
    }
}

/// Run `config.operations` operations on each of `config.threads` workers.
///
/// Operations are half inserts (or updates), a quarter erases and a quarter
/// lookups, on keys drawn uniformly from the worker's slice.
///
/// # Errors
///
/// Returns the first tree error any worker hit, or `WorkerPanicked`.
pub fn run(tree: &BTree<'_, u64, u64>, config: &WorkloadConfig) -> Result<WorkloadReport, WorkloadError> {
    let results: Vec<Result<WorkloadReport, WorkloadError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|worker| scope.spawn(move || run_worker(tree, config, worker)))
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(worker, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(WorkloadError::WorkerPanicked(worker)))
            })
            .collect()
    });

    let mut report = WorkloadReport::default();
    for result in results {
        report.merge(&result?);
    }
    Ok(report)
}

fn run_worker(
    tree: &BTree<'_, u64, u64>,
    config: &WorkloadConfig,
    worker: usize,
) -> Result<WorkloadReport, WorkloadError> {
    let threads = config.threads as u64;
    let slot = worker as u64;
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(slot));
    let mut reference = BTreeMap::new();
    let mut report = WorkloadReport::default();

    for _ in 0..config.operations {
        let key = rng.random_range(0..config.key_space) * threads + slot;
        match rng.random_range(0..4u8) {
            0 | 1 => {
                let value = rng.random::<u64>();
                let old = tree.insert(key, value)?;
                let expected = reference.insert(key, value);
                if expected.is_some() {
                    report.updates += 1;
                } else {
                    report.inserts += 1;
                }
                report.mismatches += u64::from(old != expected);
            }
            2 => {
                report.erases += 1;
                let removed = tree.erase(&key)?;
                report.mismatches += u64::from(removed != reference.remove(&key));
            }
            _ => {
                report.lookups += 1;
                let found = tree.lookup(&key)?;
                report.hits += u64::from(found.is_some());
                report.mismatches += u64::from(found != reference.get(&key).copied());
            }
        }
    }

    // Keys of this worker that the tree lost or resurrected.
    for key in (0..config.key_space).map(|k| k * threads + slot) {
        report.mismatches += u64::from(tree.lookup(&key)? != reference.get(&key).copied());
    }

    tracing::debug!(
        "worker {worker} done: {} operations, {} mismatches",
        report.operations(),
        report.mismatches
    );

    report.expected_entries = reference.len();
    Ok(report)
}
