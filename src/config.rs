//! Environment-driven configuration, validated once at startup.
//!
//! The clients themselves take their endpoints as plain constructor
//! arguments; all "is this endpoint set" checking happens here in the
//! composition root so a misconfigured deployment fails before the first
//! label is processed.

use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_DATABASE_PATH: &str = "indimap.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set in the environment")]
    Missing(&'static str),
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// DailyMed REST base, e.g. `https://dailymed.nlm.nih.gov/dailymed/services/v2`.
    pub dailymed_base: String,
    /// Full URL of the ICD-10-CM terminology search endpoint.
    pub icd10_base: String,
    pub openai_base: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub database_path: PathBuf,
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Lets tests supply values
    /// without mutating process-global environment state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(ConfigError::Missing(key)),
            }
        };

        Ok(Self {
            dailymed_base: required("DAILYMED_API_BASE")?,
            icd10_base: required("ICD10_API_BASE")?,
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_base: lookup("OPENAI_API_BASE")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE.to_string()),
            openai_model: lookup("OPENAI_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            database_path: lookup("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
        })
    }
}
