use rollcall_core::{DatePolicy, DEFAULT_MATCH_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Descriptor length produced by the face-api recognition net.
pub const DEFAULT_DESCRIPTOR_LEN: usize = 128;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("match_threshold must be a finite number greater than 0, got {0}")]
    InvalidThreshold(f32),
}

/// CLI configuration: defaults, then an optional TOML file, then `ROLLCALL_*` variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance for a positive match.
    pub match_threshold: f32,
    /// Timezone used to decide which calendar day a check-in belongs to.
    pub timezone: DatePolicy,
    /// Class used when a command does not pass `--class`.
    pub default_class: Option<String>,
    /// Expected descriptor length; 0 accepts any length.
    pub descriptor_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("attendance.db"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            timezone: DatePolicy::Local,
            default_class: None,
            descriptor_len: DEFAULT_DESCRIPTOR_LEN,
        }
    }
}

impl Config {
    /// Load from `ROLLCALL_CONFIG` (if set) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("ROLLCALL_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&src).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if !valid_threshold(config.match_threshold) {
            return Err(ConfigError::InvalidThreshold(config.match_threshold));
        }
        Ok(config)
    }

    /// Override fields from `ROLLCALL_*` variables looked up through `var`.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = var("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_MATCH_THRESHOLD") {
            let threshold: f32 = parse_env("ROLLCALL_MATCH_THRESHOLD", v.clone())?;
            if !valid_threshold(threshold) {
                return Err(ConfigError::InvalidEnv {
                    key: "ROLLCALL_MATCH_THRESHOLD",
                    value: v,
                });
            }
            self.match_threshold = threshold;
        }
        if let Some(v) = var("ROLLCALL_TIMEZONE") {
            self.timezone = parse_env("ROLLCALL_TIMEZONE", v)?;
        }
        if let Some(v) = var("ROLLCALL_CLASS") {
            self.default_class = Some(v).filter(|c| !c.is_empty());
        }
        if let Some(v) = var("ROLLCALL_DESCRIPTOR_LEN") {
            self.descriptor_len = parse_env("ROLLCALL_DESCRIPTOR_LEN", v)?;
        }
        Ok(())
    }

    /// Expected descriptor length, if enforced.
    pub fn expected_descriptor_len(&self) -> Option<usize> {
        (self.descriptor_len > 0).then_some(self.descriptor_len)
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

/// NaN or a non-positive threshold would silently reject every face.
fn valid_threshold(threshold: f32) -> bool {
    threshold.is_finite() && threshold > 0.0
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}
