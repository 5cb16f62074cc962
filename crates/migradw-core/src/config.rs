//! Configuration file (dwh.toml)
//!
//! The loader reads a small file of key/value sections:
//!
//! ```toml
//! [dwh]
//! host = "example.ap-southeast-2.redshift.amazonaws.com"
//! dwh_db = "dwh"
//! dwh_db_user = "loader"
//! dwh_db_password = "secret"
//! dwh_port = 5439
//!
//! [s3]
//! immigration_data = "s3://bucket/immigration.csv"
//! demographics_data = "s3://bucket/demographics.csv"
//!
//! [iam_role]
//! arn = "arn:aws:iam::123456789012:role/dwhRole"
//! ```
//!
//! Values are kept as strings; consumers pull what they need through
//! [`Config::get`] and friends, so a missing key surfaces where it is used.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Sections the loader knows about, used to split environment overrides
pub const KNOWN_SECTIONS: &[&str] = &["dwh", "s3", "iam_role", "copy"];

/// Prefix for environment variable overrides (`MIGRADW_<SECTION>_<KEY>`)
pub const ENV_PREFIX: &str = "MIGRADW_";

/// Target SQL dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Amazon Redshift (S3 COPY, identity/sortkey DDL)
    Redshift,

    /// Vanilla PostgreSQL (server-side file COPY)
    Postgres,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::Redshift
    }
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redshift => "redshift",
            Self::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redshift" => Ok(Self::Redshift),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("unknown dialect '{}' (expected redshift or postgres)", other)),
        }
    }
}

/// Key/value sections read from the configuration file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Section name (lowercase) to key/value pairs
    sections: BTreeMap<String, BTreeMap<String, String>>,

    /// File the config was read from, if any
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Create an empty config
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::from_toml(&contents)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load config from a TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let mut config = Self::new();
        for (section, value) in table {
            let toml::Value::Table(entries) = value else {
                return Err(ConfigError::ParseError(format!(
                    "top-level key '{}' must be a [section]",
                    section
                )));
            };

            for (key, value) in entries {
                let value = scalar_to_string(&value).ok_or_else(|| ConfigError::InvalidValue {
                    section: section.clone(),
                    key: key.clone(),
                    reason: "expected a string, integer, float or boolean".to_string(),
                })?;
                config.set(&section, &key, value);
            }
        }

        Ok(config)
    }

    /// Apply `MIGRADW_<SECTION>_<KEY>` overrides from an iterator of
    /// environment variables
    ///
    /// Only [`KNOWN_SECTIONS`] can be targeted. Returns the number of values
    /// that were applied.
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut applied = 0;

        for (name, value) in vars {
            let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let rest = rest.to_ascii_lowercase();

            // Longest section first so "iam_role_arn" never splits as "iam" + "role_arn"
            let mut sections: Vec<&str> = KNOWN_SECTIONS.to_vec();
            sections.sort_by_key(|s| std::cmp::Reverse(s.len()));

            let split = sections.iter().find_map(|section| {
                rest.strip_prefix(section)
                    .and_then(|r| r.strip_prefix('_'))
                    .filter(|key| !key.is_empty())
                    .map(|key| (*section, key.to_string()))
            });

            if let Some((section, key)) = split {
                self.set(section, &key, value);
                applied += 1;
            }
        }

        applied
    }

    /// Set a value, creating the section if needed
    ///
    /// Section and key names are case-insensitive.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_ascii_lowercase())
            .or_default()
            .insert(key.to_ascii_lowercase(), value.into());
    }

    /// Remove a value, returning it if it was present
    pub fn remove(&mut self, section: &str, key: &str) -> Option<String> {
        self.sections
            .get_mut(&section.to_ascii_lowercase())
            .and_then(|entries| entries.remove(&key.to_ascii_lowercase()))
    }

    /// Check whether a section exists
    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(&section.to_ascii_lowercase())
    }

    /// Section names in sorted order
    pub fn section_names(&self) -> Vec<&str> {
        self.sections.keys().map(String::as_str).collect()
    }

    /// Get a required value
    pub fn get(&self, section: &str, key: &str) -> Result<&str, ConfigError> {
        let entries = self
            .sections
            .get(&section.to_ascii_lowercase())
            .ok_or_else(|| ConfigError::MissingSection(section.to_string()))?;

        entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingKey {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    /// Get an optional value, falling back to `default`
    pub fn get_or<'a>(&'a self, section: &str, key: &str, default: &'a str) -> &'a str {
        self.get(section, key).unwrap_or(default)
    }

    /// Get a required value parsed as a port number
    pub fn get_u16(&self, section: &str, key: &str) -> Result<u16, ConfigError> {
        let raw = self.get(section, key)?;
        raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("'{}' is not a valid port number", raw),
        })
    }

    /// Target dialect from `[dwh] dialect`, defaulting to Redshift
    pub fn dialect(&self) -> Result<Dialect, ConfigError> {
        match self.get("dwh", "dialect") {
            Ok(raw) => raw.parse().map_err(|reason| ConfigError::InvalidValue {
                section: "dwh".to_string(),
                key: "dialect".to_string(),
                reason,
            }),
            Err(_) => Ok(Dialect::default()),
        }
    }
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Config error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing config section [{0}]")]
    MissingSection(String),

    #[error("Missing config key '{key}' in section [{section}]")]
    MissingKey { section: String, key: String },

    #[error("Invalid value for '{key}' in section [{section}]: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },
}
