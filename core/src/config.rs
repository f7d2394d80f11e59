//! Layered configuration
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. TOML file: `LOOPVIZ_CONFIG_PATH` (set by `--config`), else `./loopviz.toml` if present
//! 3. environment variables prefixed `LOOPVIZ__`, e.g. `LOOPVIZ__TICKER__SPEED=2`
//!
//! A `.env` file in the working directory is loaded before the environment is read.

use anyhow::{bail, Context, Result};
use config::{Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::engine::DEFAULT_TRACE_CAPACITY;

pub const CONFIG_PATH_ENV: &str = "LOOPVIZ_CONFIG_PATH";
pub const DEFAULT_CONFIG_FILE: &str = "loopviz.toml";
const ENV_PREFIX: &str = "LOOPVIZ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub ticker: TickerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of trace events kept
    pub trace_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerConfig {
    /// Wall-clock interval between ticks, and virtual time advanced per tick at speed 1
    pub interval_ms: u64,
    /// Speed multiplier
    pub speed: f64,
    /// Upper bound on ticks for a single run
    pub max_ticks: u64,
    /// Jump the virtual clock to the next timer when nothing is runnable
    pub fast_forward: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                trace_capacity: DEFAULT_TRACE_CAPACITY,
            },
            ticker: TickerConfig {
                interval_ms: 1000,
                speed: 1.0,
                max_ticks: 10_000,
                fast_forward: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => Some((PathBuf::from(path), true)),
            Err(_) => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some((default, false))
            }
        };

        Self::load_from(file.as_ref().map(|(p, required)| (p.as_path(), *required)), None)
    }

    /// Load with an explicit file and, for tests, an explicit environment map
    ///
    /// `env_source: None` reads the process environment.
    pub fn load_from(
        file: Option<(&Path, bool)>,
        env_source: Option<Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = Self::defaults_builder()?;

        if let Some((path, required)) = file {
            if required && !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(required));
        }

        let builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env_source),
        );

        let config: Config = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document layered over the defaults
    pub fn from_toml_str(toml_src: &str) -> Result<Self> {
        let config: Config = Self::defaults_builder()?
            .add_source(File::from_str(toml_src, FileFormat::Toml))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn defaults_builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = Config::default();
        let builder = config::Config::builder()
            .set_default("engine.trace_capacity", defaults.engine.trace_capacity as i64)?
            .set_default("ticker.interval_ms", defaults.ticker.interval_ms as i64)?
            .set_default("ticker.speed", defaults.ticker.speed)?
            .set_default("ticker.max_ticks", defaults.ticker.max_ticks as i64)?
            .set_default("ticker.fast_forward", defaults.ticker.fast_forward)?
            .set_default("logging.level", defaults.logging.level)?;
        Ok(builder)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.trace_capacity == 0 {
            bail!("engine.trace_capacity must be at least 1");
        }
        if self.ticker.interval_ms == 0 {
            bail!("ticker.interval_ms must be at least 1");
        }
        if !(self.ticker.speed.is_finite() && self.ticker.speed > 0.0) {
            bail!("ticker.speed must be a positive number, got {}", self.ticker.speed);
        }
        Ok(())
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").expect("defaults load");
        assert_eq!(config, Config::default());
        assert_eq!(config.engine.trace_capacity, 100);
        assert_eq!(config.ticker.interval_ms, 1000);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = Config::from_toml_str(
            r#"
[ticker]
speed = 2.5
fast_forward = false

[logging]
level = "debug"
"#,
        )
        .expect("config load");

        assert_eq!(config.ticker.speed, 2.5);
        assert!(!config.ticker.fast_forward);
        assert_eq!(config.ticker.interval_ms, 1000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_environment_overrides() {
        let env = Map::from([
            ("LOOPVIZ__TICKER__SPEED".to_string(), "4".to_string()),
            ("LOOPVIZ__ENGINE__TRACE_CAPACITY".to_string(), "7".to_string()),
        ]);
        let config = Config::load_from(None, Some(env)).expect("config load");
        assert_eq!(config.ticker.speed, 4.0);
        assert_eq!(config.engine.trace_capacity, 7);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::from_toml_str("[ticker]\nspeed = 0.0").is_err());
        assert!(Config::from_toml_str("[engine]\ntrace_capacity = 0").is_err());
    }

    #[test]
    fn test_missing_required_file_fails() {
        let result = Config::load_from(Some((Path::new("/nonexistent/loopviz.toml"), true)), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_round_trips_through_toml() {
        let rendered = Config::default().to_toml().expect("serialize");
        assert!(rendered.contains("[ticker]"));
        let parsed = Config::from_toml_str(&rendered).expect("parse");
        assert_eq!(parsed, Config::default());
    }
}
