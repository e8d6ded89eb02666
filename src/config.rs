use clap::{Args, Parser};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_SMT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_FINDER_MAX_BOUND: i64 = 1024;
pub const DEFAULT_AUGMENT_LIMIT: usize = 64;
pub const DEFAULT_SATURATE_LIMIT: usize = 512;
pub const DEFAULT_LINEAR_SET_FACTOR: usize = 4;

/// liastar: LIA* star elimination for SQL equivalence obligations
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
    /// problem file in toml format, one [[problem]] table per query pair
    pub problems: PathBuf,

    /// wall clock limit of one query pair in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,

    /// only check the problem with this name
    #[arg(long)]
    pub only: Option<String>,

    #[command(flatten)]
    pub engine: EngineConfig,
}

impl Config {
    #[inline]
    pub fn pair_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Args, Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[command(flatten)]
    pub smt: SmtConfig,

    #[command(flatten)]
    pub sls: SlsConfig,

    #[command(flatten)]
    pub star: StarConfig,
}

#[derive(Args, Clone, Debug, Serialize, Deserialize)]
pub struct SmtConfig {
    /// time limit of a single smt query in milliseconds
    #[arg(long = "smt-timeout", default_value_t = DEFAULT_SMT_TIMEOUT_MS)]
    pub timeout_ms: u64,
}

impl Default for SmtConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_SMT_TIMEOUT_MS,
        }
    }
}

#[derive(Args, Clone, Debug, Serialize, Deserialize)]
pub struct SlsConfig {
    /// per dimension magnitude ceiling of the augmentation vector search
    #[arg(long = "finder-max-bound", default_value_t = DEFAULT_FINDER_MAX_BOUND)]
    pub finder_max_bound: i64,

    /// max number of augmentation rounds
    #[arg(long = "augment-limit", default_value_t = DEFAULT_AUGMENT_LIMIT)]
    pub augment_limit: usize,

    /// max number of saturation rule applications after one augmentation
    #[arg(long = "saturate-limit", default_value_t = DEFAULT_SATURATE_LIMIT)]
    pub saturate_limit: usize,

    /// a linear set may hold at most factor * dimension offsets
    #[arg(long = "linear-set-factor", default_value_t = DEFAULT_LINEAR_SET_FACTOR)]
    pub linear_set_factor: usize,
}

impl Default for SlsConfig {
    fn default() -> Self {
        Self {
            finder_max_bound: DEFAULT_FINDER_MAX_BOUND,
            augment_limit: DEFAULT_AUGMENT_LIMIT,
            saturate_limit: DEFAULT_SATURATE_LIMIT,
            linear_set_factor: DEFAULT_LINEAR_SET_FACTOR,
        }
    }
}

impl SlsConfig {
    #[inline]
    pub fn max_offsets(&self, dim: usize) -> usize {
        self.linear_set_factor * dim.max(1)
    }
}

#[derive(Args, Clone, Debug, Default, Serialize, Deserialize)]
pub struct StarConfig {
    /// skip the contradiction fast path
    #[arg(long = "no-fast-path", default_value_t = false)]
    pub no_fast_path: bool,

    /// do not add the reduced semi-linear set to over-approximations
    #[arg(long = "no-approx-sls", default_value_t = false)]
    pub no_approx_sls: bool,

    /// do not check the eliminated formula against the outer constraint
    #[arg(long = "no-outer-check", default_value_t = false)]
    pub no_outer_check: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_default_impls() {
        let cfg = Config::parse_from(["liastar", "p.toml"]);
        assert_eq!(cfg.engine.smt.timeout_ms, SmtConfig::default().timeout_ms);
        assert_eq!(
            cfg.engine.sls.finder_max_bound,
            SlsConfig::default().finder_max_bound
        );
        assert_eq!(cfg.engine.sls.augment_limit, DEFAULT_AUGMENT_LIMIT);
        assert!(!cfg.engine.star.no_fast_path);
        assert_eq!(cfg.pair_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn flags_override() {
        let cfg = Config::parse_from([
            "liastar",
            "p.toml",
            "--smt-timeout",
            "100",
            "--augment-limit",
            "3",
            "--no-fast-path",
        ]);
        assert_eq!(cfg.engine.smt.timeout_ms, 100);
        assert_eq!(cfg.engine.sls.augment_limit, 3);
        assert!(cfg.engine.star.no_fast_path);
    }
}
