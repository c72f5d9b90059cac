//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - typegraph.toml (default configuration)
//! - typegraph.local.toml (git-ignored local overrides)
//! - Environment variables (TYPEGRAPH_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # typegraph.toml
//! [planner]
//! time_limit_ms = 100
//!
//! [reasoner]
//! pass_budget = 64
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! TYPEGRAPH_PLANNER__TIME_LIMIT_MS=250
//! TYPEGRAPH_REASONER__PASS_BUDGET=16
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub reasoner: ReasonerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Traversal planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Solver time limit per optimise call, in milliseconds
    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: u64,

    /// Extended time limit used when the caller requests it
    #[serde(default = "default_extended_time_limit_ms")]
    pub extended_time_limit_ms: u64,

    /// A cached plan goes stale when one edge's cost grows by this factor...
    #[serde(default = "default_edge_cost_change")]
    pub edge_cost_change: f64,

    /// ...while contributing at least this share of the previous total cost
    #[serde(default = "default_edge_cost_share")]
    pub edge_cost_share: f64,

    /// Relative change of the total cost that invalidates a cached plan on its own
    #[serde(default = "default_total_cost_change")]
    pub total_cost_change: f64,

    /// Clamp range for the schema-estimated branching factor
    #[serde(default = "default_branching_factor_min")]
    pub branching_factor_min: f64,
    #[serde(default = "default_branching_factor_max")]
    pub branching_factor_max: f64,
}

/// Rule-reasoning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerConfig {
    /// Upper bound on materialisation passes before ReasoningBudgetExceeded
    #[serde(default = "default_pass_budget")]
    pub pass_budget: usize,
}

/// Query execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Answers fetched per batch by streaming callers
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Enable the parallel producer by default
    #[serde(default)]
    pub parallel: bool,

    /// Number of worker threads for the parallel producer (0 = all cores)
    #[serde(default)]
    pub num_threads: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_time_limit_ms() -> u64 {
    100
}
fn default_extended_time_limit_ms() -> u64 {
    200
}
fn default_edge_cost_change() -> f64 {
    2.0
}
fn default_edge_cost_share() -> f64 {
    0.02
}
fn default_total_cost_change() -> f64 {
    0.2
}
fn default_branching_factor_min() -> f64 {
    2.0
}
fn default_branching_factor_max() -> f64 {
    32.0
}
fn default_pass_budget() -> usize {
    64
}
fn default_batch_size() -> usize {
    50
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            time_limit_ms: default_time_limit_ms(),
            extended_time_limit_ms: default_extended_time_limit_ms(),
            edge_cost_change: default_edge_cost_change(),
            edge_cost_share: default_edge_cost_share(),
            total_cost_change: default_total_cost_change(),
            branching_factor_min: default_branching_factor_min(),
            branching_factor_max: default_branching_factor_max(),
        }
    }
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        ReasonerConfig {
            pass_budget: default_pass_budget(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            batch_size: default_batch_size(),
            parallel: false,
            num_threads: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. typegraph.toml (base configuration)
    /// 2. typegraph.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (TYPEGRAPH_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("typegraph.toml"))
            .merge(Toml::file("typegraph.local.toml"))
            .merge(Env::prefixed("TYPEGRAPH_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TYPEGRAPH_").split("__"))
            .extract()
    }
}

/// Initialise tracing from the logging config. Safe to call more than once;
/// later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
