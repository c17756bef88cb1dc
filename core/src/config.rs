//! Runtime configuration
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. TOML file (`--config`, `CADENCE_CONFIG_PATH`, or `./cadence.toml` if present)
//! 3. Environment variables prefixed `CADENCE_`, nested with `__`
//!    (e.g. `CADENCE_LIMITS__MAX_LOOP_ITERATIONS=5000`)
//!
//! A `.env` file in the working directory is loaded before anything else.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::executor::Limits;

const DEFAULT_CONFIG_FILE: &str = "cadence.toml";
const CONFIG_PATH_VAR: &str = "CADENCE_CONFIG_PATH";
const ENV_PREFIX: &str = "CADENCE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default filter when `RUST_LOG` is unset
    pub log_level: String,
    pub limits: LimitsConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_loop_iterations: usize,
    pub max_call_depth: usize,
    pub max_macro_depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Deadline applied to every `await`; unbounded when unset
    pub await_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            limits: LimitsConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            max_loop_iterations: limits.max_loop_iterations,
            max_call_depth: limits.max_call_depth,
            max_macro_depth: limits.max_macro_depth,
        }
    }
}

impl Config {
    /// Load from the default sources
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_loop_iterations: self.limits.max_loop_iterations,
            max_call_depth: self.limits.max_call_depth,
            max_macro_depth: self.limits.max_macro_depth,
        }
    }

    pub fn await_timeout(&self) -> Option<Duration> {
        self.runtime.await_timeout_ms.map(Duration::from_millis)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }

    fn validate(&self) -> Result<()> {
        if self.limits.max_loop_iterations == 0 {
            anyhow::bail!("limits.max_loop_iterations must be greater than zero");
        }
        if self.limits.max_call_depth == 0 {
            anyhow::bail!("limits.max_call_depth must be greater than zero");
        }
        if self.limits.max_macro_depth == 0 {
            anyhow::bail!("limits.max_macro_depth must be greater than zero");
        }
        Ok(())
    }
}

/// Programmatic overrides applied on top of file and environment sources
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    skip_env: bool,
    max_loop_iterations: Option<usize>,
    max_call_depth: Option<usize>,
    max_macro_depth: Option<usize>,
    await_timeout_ms: Option<u64>,
    log_level: Option<String>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Ignore `.env` and `CADENCE_*` variables
    pub fn skip_env(mut self, skip: bool) -> Self {
        self.skip_env = skip;
        self
    }

    pub fn max_loop_iterations(mut self, n: usize) -> Self {
        self.max_loop_iterations = Some(n);
        self
    }

    pub fn max_call_depth(mut self, n: usize) -> Self {
        self.max_call_depth = Some(n);
        self
    }

    pub fn max_macro_depth(mut self, n: usize) -> Self {
        self.max_macro_depth = Some(n);
        self
    }

    pub fn await_timeout_ms(mut self, ms: u64) -> Self {
        self.await_timeout_ms = Some(ms);
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn build(self) -> Result<Config> {
        if !self.skip_env {
            // Missing .env is fine
            let _ = dotenvy::dotenv();
        }

        let mut sources = config::Config::builder();

        let explicit = self.config_path.clone().or_else(|| {
            if self.skip_env {
                None
            } else {
                std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from)
            }
        });
        match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                sources = sources.add_source(config::File::from(path));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    sources = sources.add_source(config::File::from(default_path));
                }
            }
        }

        if !self.skip_env {
            sources = sources.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let mut config: Config = sources
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if let Some(n) = self.max_loop_iterations {
            config.limits.max_loop_iterations = n;
        }
        if let Some(n) = self.max_call_depth {
            config.limits.max_call_depth = n;
        }
        if let Some(n) = self.max_macro_depth {
            config.limits.max_macro_depth = n;
        }
        if let Some(ms) = self.await_timeout_ms {
            config.runtime.await_timeout_ms = Some(ms);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::builder().skip_env(true).build().unwrap();
        assert_eq!(config.limits(), Limits::default());
        assert_eq!(config.await_timeout(), None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::builder()
            .skip_env(true)
            .max_loop_iterations(10)
            .max_call_depth(8)
            .await_timeout_ms(250)
            .log_level("debug")
            .build()
            .unwrap();
        assert_eq!(config.limits().max_loop_iterations, 10);
        assert_eq!(config.limits().max_call_depth, 8);
        assert_eq!(config.limits().max_macro_depth, 100);
        assert_eq!(config.await_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = Config::builder()
            .skip_env(true)
            .max_call_depth(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max_call_depth"));
    }

    #[test]
    fn test_file_source() {
        let path = std::env::temp_dir().join(format!("cadence-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "log_level = \"warn\"\n\n[limits]\nmax_loop_iterations = 42").unwrap();

        let config = Config::builder()
            .skip_env(true)
            .config_path(Some(path.clone()))
            .build()
            .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.limits.max_loop_iterations, 42);
        assert_eq!(config.limits.max_call_depth, 256);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Config::builder()
            .skip_env(true)
            .config_path(Some(PathBuf::from("/nonexistent/cadence.toml")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_to_toml_round_trips() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("max_loop_iterations = 1000000"));
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
