//! Workload configuration module.
//!
//! This module loads the settings of the `pagetree` binary from environment
//! variables. Every variable is optional.
//!
//! # Environment Variables
//!
//! - `PAGETREE_POOL_CAPACITY`: Buffer pool capacity in pages (default: `65536`)
//! - `PAGETREE_OPERATIONS`: Operations per worker thread (default: `100000`)
//! - `PAGETREE_THREADS`: Number of worker threads (default: `4`)
//! - `PAGETREE_KEY_SPACE`: Distinct keys each worker draws from (default: `50000`)
//! - `PAGETREE_SEED`: Base seed of the workers' random generators (default: `42`)
//! - `PAGETREE_NODE_CAPACITY`: Node capacity override (default: largest that fits a page)
//!
//! # Invariants
//!
//! - `pool_capacity`, `threads` and `key_space` are always positive

use crate::storage::DEFAULT_POOL_CAPACITY;

/// Workload configuration.
///
/// # Post-conditions
///
/// When constructed via `from_env()`, `pool_capacity`, `threads` and
/// `key_space` are at least 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadConfig {
    /// Maximum number of resident pages.
    pub pool_capacity: usize,
    /// Operations each worker performs.
    pub operations: u64,
    /// Number of concurrent workers.
    pub threads: usize,
    /// Keys drawn by each worker.
    /// Worker `i` owns the keys `k * threads + i` for `k < key_space`.
    pub key_space: u64,
    /// Worker `i` seeds its generator with `seed + i`.
    pub seed: u64,
    /// Node capacity; `None` uses the largest capacity that fits a page.
    pub node_capacity: Option<usize>,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            pool_capacity: Self::DEFAULT_POOL_CAPACITY,
            operations: Self::DEFAULT_OPERATIONS,
            threads: Self::DEFAULT_THREADS,
            key_space: Self::DEFAULT_KEY_SPACE,
            seed: Self::DEFAULT_SEED,
            node_capacity: None,
        }
    }
}

impl WorkloadConfig {
    /// Default buffer pool capacity in pages.
    pub const DEFAULT_POOL_CAPACITY: usize = DEFAULT_POOL_CAPACITY;
    /// Default operations per worker.
    pub const DEFAULT_OPERATIONS: u64 = 100_000;
    /// Default number of workers.
    pub const DEFAULT_THREADS: usize = 4;
    /// Default key space per worker.
    pub const DEFAULT_KEY_SPACE: u64 = 50_000;
    /// Default base seed.
    pub const DEFAULT_SEED: u64 = 42;

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but does not parse, or if a
    /// value that must be positive is 0.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value if set.
    ///
    /// # Errors
    ///
    /// Same as `from_env`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let pool_capacity = load_positive(&lookup, "PAGETREE_POOL_CAPACITY", Self::DEFAULT_POOL_CAPACITY)?;
        let operations = load(&lookup, "PAGETREE_OPERATIONS")?.unwrap_or(Self::DEFAULT_OPERATIONS);
        let threads = load_positive(&lookup, "PAGETREE_THREADS", Self::DEFAULT_THREADS)?;
        let key_space = load_positive(&lookup, "PAGETREE_KEY_SPACE", Self::DEFAULT_KEY_SPACE)?;
        let seed = load(&lookup, "PAGETREE_SEED")?.unwrap_or(Self::DEFAULT_SEED);
        let node_capacity = load(&lookup, "PAGETREE_NODE_CAPACITY")?;

        Ok(Self {
            pool_capacity,
            operations,
            threads,
            key_space,
            seed,
            node_capacity,
        })
    }
}

/// Parse a variable if it is set.
///
/// # Errors
///
/// Returns an error if the value is set but does not parse.
fn load<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    lookup(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("'{value}' is not a valid number"),
            })
        })
        .transpose()
}

/// Parse a variable that must be at least 1, falling back to `default`.
///
/// # Errors
///
/// Returns an error if the value does not parse or is 0.
fn load_positive<T: std::str::FromStr + PartialEq + From<u8>>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match load(lookup, name)? {
        Some(value) if value == T::from(0) => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: "must be at least 1".to_string(),
        }),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        assert_eq!(WorkloadConfig::DEFAULT_POOL_CAPACITY, 65_536);
        assert_eq!(WorkloadConfig::DEFAULT_OPERATIONS, 100_000);
        assert_eq!(WorkloadConfig::DEFAULT_THREADS, 4);
        assert_eq!(WorkloadConfig::DEFAULT_KEY_SPACE, 50_000);
        assert_eq!(WorkloadConfig::DEFAULT_SEED, 42);
    }

    #[test]
    fn test_unset_variables_use_defaults() {
        let config = WorkloadConfig::from_lookup(lookup_from(&[])).expect("defaults");
        assert_eq!(config, WorkloadConfig::default());
    }

    #[test]
    fn test_variables_override_defaults() {
        let config = WorkloadConfig::from_lookup(lookup_from(&[
            ("PAGETREE_POOL_CAPACITY", "128"),
            ("PAGETREE_OPERATIONS", "0"),
            ("PAGETREE_THREADS", " 2 "),
            ("PAGETREE_KEY_SPACE", "10"),
            ("PAGETREE_SEED", "7"),
            ("PAGETREE_NODE_CAPACITY", "4"),
        ]))
        .expect("valid config");

        assert_eq!(
            config,
            WorkloadConfig {
                pool_capacity: 128,
                operations: 0,
                threads: 2,
                key_space: 10,
                seed: 7,
                node_capacity: Some(4),
            }
        );
    }

    #[test]
    fn test_zero_threads_rejected() {
        let error = WorkloadConfig::from_lookup(lookup_from(&[("PAGETREE_THREADS", "0")]))
            .expect_err("zero threads");
        assert_eq!(
            error,
            ConfigError::InvalidValue {
                name: "PAGETREE_THREADS".to_string(),
                message: "must be at least 1".to_string(),
            }
        );
    }

    #[test]
    fn test_unparsable_value_rejected() {
        let error = WorkloadConfig::from_lookup(lookup_from(&[("PAGETREE_SEED", "abc")]))
            .expect_err("bad seed");
        assert_eq!(
            error.to_string(),
            "invalid value for PAGETREE_SEED: 'abc' is not a valid number"
        );
    }
}
