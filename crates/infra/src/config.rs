//! Engine configuration.

use anyhow::{Context, Result};
use serde::Deserialize;

use cadence_observability::LogFormat;

pub const DATABASE_URL_VAR: &str = "CADENCE_DATABASE_URL";
pub const DB_MAX_CONNECTIONS_VAR: &str = "CADENCE_DB_MAX_CONNECTIONS";
pub const DEFAULT_PAYMENT_TERMS_VAR: &str = "CADENCE_DEFAULT_PAYMENT_TERMS_DAYS";
pub const MAX_PERIODS_PER_RUN_VAR: &str = "CADENCE_MAX_PERIODS_PER_RUN";

/// Runtime settings for the engine and its store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Postgres URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Invoice payment terms when the service sets none.
    pub default_payment_terms_days: u32,
    /// Upper bound on windows not yet stored that one materialization run examines.
    pub max_periods_per_run: u32,
    /// Output format used by [`EngineConfig::init_observability`].
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 10,
            default_payment_terms_days: 15,
            max_periods_per_run: 600,
            log_format: LogFormat::Json,
        }
    }
}

impl EngineConfig {
    /// Load from `CADENCE_*` environment variables, defaulting what is unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |name: &str, default: u32| -> Result<u32> {
            match lookup(name) {
                Some(raw) => raw
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("{name} must be a non-negative integer, got {raw:?}")),
                None => Ok(default),
            }
        };

        let log_format = match lookup(cadence_observability::tracing::LOG_FORMAT_VAR) {
            Some(raw) => LogFormat::parse(&raw).with_context(|| {
                format!(
                    "{} must be json or pretty, got {raw:?}",
                    cadence_observability::tracing::LOG_FORMAT_VAR
                )
            })?,
            None => defaults.log_format,
        };

        let config = Self {
            database_url: lookup(DATABASE_URL_VAR).filter(|url| !url.trim().is_empty()),
            db_max_connections: number(DB_MAX_CONNECTIONS_VAR, defaults.db_max_connections)?,
            default_payment_terms_days: number(
                DEFAULT_PAYMENT_TERMS_VAR,
                defaults.default_payment_terms_days,
            )?,
            max_periods_per_run: number(MAX_PERIODS_PER_RUN_VAR, defaults.max_periods_per_run)?,
            log_format,
        };

        anyhow::ensure!(
            config.max_periods_per_run > 0,
            "{MAX_PERIODS_PER_RUN_VAR} must be at least 1"
        );
        anyhow::ensure!(
            config.db_max_connections > 0,
            "{DB_MAX_CONNECTIONS_VAR} must be at least 1"
        );
        Ok(config)
    }

    /// Install the tracing subscriber in `log_format` and register metrics.
    ///
    /// Later calls are no-ops.
    pub fn init_observability(&self) {
        cadence_observability::init_with(self.log_format);
    }
}
