use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CapcatError, Result};
use crate::models::RateLimitSpec;

/// Process-wide configuration, resolved from (in order of precedence)
/// CLI flags, environment variables (`CAPCAT_*`), a config file, then
/// these defaults. Owned by the `Runtime` for the lifetime of one
/// process invocation; never mutated after resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_workers: usize,
    pub max_discovery_workers: usize,
    pub default_count: u32,
    pub output_dir: String,
    pub max_filename_length: usize,
    pub pool_connections: usize,
    pub pool_maxsize: usize,
    pub connect_timeout_seconds: f64,
    pub per_article_timeout_seconds: u64,
    #[serde(default)]
    pub rate_limit_overrides: HashMap<String, RateLimitSpec>,
    #[serde(default)]
    pub circuit_breaker_overrides: HashMap<String, CircuitBreakerSpec>,
}

/// Per-source circuit breaker tuning. Kept in a table independent from
/// `rate_limit_overrides`: a source can be tuned in one table and not
/// the other, falling back to `default` for whichever it omits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerSpec {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_seconds: f64,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerSpec {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_seconds: 60.0,
            half_open_max_calls: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: 8,
            max_discovery_workers: 4,
            default_count: 5,
            output_dir: ".".to_string(),
            max_filename_length: 200,
            pool_connections: 10,
            pool_maxsize: 10,
            connect_timeout_seconds: 10.0,
            per_article_timeout_seconds: 60,
            rate_limit_overrides: HashMap::new(),
            circuit_breaker_overrides: HashMap::new(),
        }
    }
}

impl Config {
    /// Load a config file (TOML), layer environment variable overrides
    /// on top, and fall back to built-in defaults for anything unset.
    /// CLI-flag overrides are applied by the caller after this returns,
    /// since flag parsing is outside the core's scope.
    pub fn resolve(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path).map_err(|e| CapcatError::FileSystem {
                    operation: "read config".to_string(),
                    path: path.to_path_buf(),
                    source: e,
                })?;
                toml::from_str(&text).map_err(|e| CapcatError::Validation {
                    field: "config file".to_string(),
                    requirement: e.to_string(),
                })?
            }
            _ => Config::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CAPCAT_MAX_WORKERS") {
            if let Ok(n) = v.parse() {
                self.max_workers = n;
            }
        }
        if let Ok(v) = std::env::var("CAPCAT_MAX_DISCOVERY_WORKERS") {
            if let Ok(n) = v.parse() {
                self.max_discovery_workers = n;
            }
        }
        if let Ok(v) = std::env::var("CAPCAT_DEFAULT_COUNT") {
            if let Ok(n) = v.parse() {
                self.default_count = n;
            }
        }
        if let Ok(v) = std::env::var("CAPCAT_OUTPUT_DIR") {
            self.output_dir = v;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(CapcatError::Validation {
                field: "max_workers".to_string(),
                requirement: "must be > 0".to_string(),
            });
        }
        if self.max_discovery_workers == 0 {
            return Err(CapcatError::Validation {
                field: "max_discovery_workers".to_string(),
                requirement: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Rate-limit spec for a source, falling back to whatever entry is
    /// keyed `"default"`, then to `RateLimitSpec::default()`.
    pub fn rate_limit_for(&self, source_id: &str) -> RateLimitSpec {
        self.rate_limit_overrides
            .get(source_id)
            .or_else(|| self.rate_limit_overrides.get("default"))
            .copied()
            .unwrap_or_default()
    }

    /// Circuit breaker spec for a source, independently overridable from
    /// the rate limit table (see the Open Question resolution on
    /// override asymmetry in DESIGN.md).
    pub fn circuit_breaker_for(&self, source_id: &str) -> CircuitBreakerSpec {
        self.circuit_breaker_overrides
            .get(source_id)
            .or_else(|| self.circuit_breaker_overrides.get("default"))
            .copied()
            .unwrap_or_default()
    }
}
