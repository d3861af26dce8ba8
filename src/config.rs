//! Simulator configuration, persisted as TOML.
//!
//! Every field carries a serde default, so an empty file (or a file naming
//! only the data paths) yields the movie-ticket setup.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DomainConfig;
use crate::noise::ErrorModelConfig;
use crate::tracker::belief::BeliefConfig;

/// Errors from configuration loading and validation.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read simulator config: {path}")]
    #[diagnostic(
        code(dsim::config::read),
        help("Ensure the config file exists. `dialogue-sim init-config <path>` writes a default one.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse simulator config {path}: {message}")]
    #[diagnostic(
        code(dsim::config::parse),
        help("Check the TOML syntax and the section names ([run], [data], [noise], [belief], [domain]).")
    )]
    Parse { path: String, message: String },

    #[error("failed to serialize simulator config for {path}: {message}")]
    #[diagnostic(
        code(dsim::config::serialize),
        help("A value in the in-memory config has no TOML representation.")
    )]
    Serialize { path: String, message: String },

    #[error("failed to write simulator config: {path}")]
    #[diagnostic(
        code(dsim::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(dsim::config::invalid),
        help("Fix the offending value in the config file and retry.")
    )]
    Invalid { message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// `[run]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Agent round at which an unfinished episode fails.
    #[serde(default = "default_max_round")]
    pub max_round: usize,
    /// Base RNG seed. `None` draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Episodes run by `simulate` when `--episodes` is not given.
    #[serde(default = "default_episodes")]
    pub episodes: usize,
    /// Tracker registry tag.
    #[serde(default = "default_tracker")]
    pub tracker: String,
}

fn default_max_round() -> usize {
    20
}
fn default_episodes() -> usize {
    100
}
fn default_tracker() -> String {
    "state".into()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_round: default_max_round(),
            seed: None,
            episodes: default_episodes(),
            tracker: default_tracker(),
        }
    }
}

/// `[data]` section: snapshot file locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_entities_path")]
    pub entities: PathBuf,
    #[serde(default = "default_vocabulary_path")]
    pub vocabulary: PathBuf,
    #[serde(default = "default_goals_path")]
    pub goals: PathBuf,
}

fn default_entities_path() -> PathBuf {
    "data/entities.json".into()
}
fn default_vocabulary_path() -> PathBuf {
    "data/vocabulary.json".into()
}
fn default_goals_path() -> PathBuf {
    "data/goals.json".into()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            entities: default_entities_path(),
            vocabulary: default_vocabulary_path(),
            goals: default_goals_path(),
        }
    }
}

/// Complete simulator configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub noise: ErrorModelConfig,
    #[serde(default)]
    pub belief: BeliefConfig,
    #[serde(default)]
    pub domain: DomainConfig,
}

impl SimConfig {
    /// Load and validate a TOML config.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                    path: parent.display().to_string(),
                    source: e,
                })?;
            }
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Reject values the simulator cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.run.max_round == 0 {
            return Err(invalid("run.max_round must be at least 1"));
        }
        self.noise.validate()?;
        self.belief.validate()?;
        Ok(())
    }

    /// RNG for one independent stream (an episode worker, a session).
    ///
    /// With a configured seed every stream is reproducible and distinct.
    pub fn rng(&self, stream: u64) -> StdRng {
        match self.run.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            None => StdRng::from_entropy(),
        }
    }
}

pub(crate) fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

/// Fail unless `value` is a probability.
pub(crate) fn check_probability(name: &str, value: f64) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} = {value} is outside [0, 1]")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn empty_file_yields_defaults() {
        let config: SimConfig = toml::from_str("").unwrap();
        assert_eq!(config, SimConfig::default());
        assert_eq!(config.run.max_round, 20);
        assert_eq!(config.domain.match_key, "ticket");
        config.validate().unwrap();
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("sim.toml");
        let mut config = SimConfig::default();
        config.run.seed = Some(7);
        config.run.tracker = "belief".into();
        config.save(&path).unwrap();

        let loaded = SimConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: SimConfig = toml::from_str(
            r#"
            [run]
            max_round = 8

            [noise]
            slot_error_prob = 0.25
            "#,
        )
        .unwrap();
        assert_eq!(config.run.max_round, 8);
        assert_eq!(config.run.tracker, "state");
        assert_eq!(config.noise.slot_error_prob, 0.25);
    }

    #[test]
    fn zero_max_round_rejected() {
        let mut config = SimConfig::default();
        config.run.max_round = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn out_of_range_probability_rejected() {
        let mut config = SimConfig::default();
        config.noise.intent_error_prob = 1.5;
        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("intent_error_prob"));
    }

    #[test]
    fn parse_error_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[run\nmax_round = ").unwrap();
        let err = SimConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn serialize_failure_is_not_a_parse_error() {
        let err = ConfigError::Serialize {
            path: "out.toml".into(),
            message: "unsupported value".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to serialize simulator config for out.toml: unsupported value"
        );
        assert_eq!(err.code().unwrap().to_string(), "dsim::config::serialize");
    }

    #[test]
    fn seeded_streams_are_reproducible_and_distinct() {
        let mut config = SimConfig::default();
        config.run.seed = Some(42);
        let a: u64 = config.rng(1).gen_range(0..u64::MAX);
        let b: u64 = config.rng(1).gen_range(0..u64::MAX);
        let c: u64 = config.rng(2).gen_range(0..u64::MAX);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
