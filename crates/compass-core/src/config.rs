//! Indexing configuration with environment overrides.

use serde::{Deserialize, Serialize};

/// Default damping factor for importance ranking.
pub const DEFAULT_DAMPING: f64 = 0.85;

/// Default number of propagation rounds.
pub const DEFAULT_ITERATIONS: usize = 10;

/// Cache directory created under the project root.
pub const CACHE_DIR_NAME: &str = ".code-compass";

/// Database file name inside [`CACHE_DIR_NAME`].
pub const CACHE_DB_NAME: &str = "cache.db";

/// How the resolver treats an import that has no exact module-path match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuffixFallback {
    /// Take the first module whose last component equals the import's last
    /// component, in index order.
    #[default]
    FirstMatch,
    /// Only accept the suffix match when exactly one module matches.
    Unambiguous,
    /// Never fall back; unmatched imports are external.
    Disabled,
}

impl SuffixFallback {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "first" | "first_match" => Some(SuffixFallback::FirstMatch),
            "unique" | "unambiguous" => Some(SuffixFallback::Unambiguous),
            "off" | "disabled" | "none" => Some(SuffixFallback::Disabled),
            _ => None,
        }
    }
}

/// Parameters of the damped propagation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub damping: f64,
    pub iterations: usize,
    /// Stop early once the total absolute score change of a round drops
    /// below this value.
    pub epsilon: Option<f64>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            damping: DEFAULT_DAMPING,
            iterations: DEFAULT_ITERATIONS,
            epsilon: None,
        }
    }
}

/// Options for one indexing run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Parser worker threads.
    pub workers: usize,
    /// Re-parse every file even if its stored hash is current.
    pub force: bool,
    /// Delete stored files that are not among the run's candidates.
    pub prune_missing: bool,
    pub suffix_fallback: SuffixFallback,
    pub ranking: RankingConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            force: false,
            prune_missing: true,
            suffix_fallback: SuffixFallback::default(),
            ranking: RankingConfig::default(),
        }
    }
}

impl IndexConfig {
    /// Defaults overridden by `COMPASS_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(workers) = env_usize("COMPASS_WORKERS") {
            config.workers = workers.max(1);
        }
        config.force = env_flag("COMPASS_FORCE_REINDEX", config.force);
        config.prune_missing = env_flag("COMPASS_PRUNE_MISSING", config.prune_missing);
        if let Ok(value) = std::env::var("COMPASS_SUFFIX_FALLBACK") {
            if let Some(mode) = SuffixFallback::parse(&value) {
                config.suffix_fallback = mode;
            }
        }
        if let Some(iterations) = env_usize("COMPASS_PAGERANK_ITERATIONS") {
            config.ranking.iterations = iterations;
        }
        config
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.trim().parse::<usize>().ok()
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(val) => parse_flag(&val, default),
        Err(_) => default,
    }
}

fn parse_flag(value: &str, default: bool) -> bool {
    let v = value.trim().to_lowercase();
    if matches!(v.as_str(), "0" | "false" | "no" | "off") {
        false
    } else if matches!(v.as_str(), "1" | "true" | "yes" | "on") {
        true
    } else {
        default
    }
}
