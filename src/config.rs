//! Runtime settings and pipeline definition files
//!
//! [`Settings`] comes from the process environment (after the CLI has
//! sourced the dotenv file); [`PipelineConfig`] comes from a YAML or JSON5
//! file describing the jobs of one run.

use crate::client::{ApiClient, Auth, AuthType, RetryPolicy};
use crate::load::{DEFAULT_BATCH_SIZE, SqliteStore, TableLoader};
use crate::orchestrator::{DEFAULT_AUDIT_TABLE, JobSpec, Orchestrator, RunOptions};
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_DATABASE_PATH: &str = "data_pipeline.db";

/// Environment-derived settings
///
/// Expected environment variables:
/// - API_BASE_URL: base address for remote sources (optional)
/// - API_KEY: bearer token (optional, wins over basic credentials)
/// - API_USERNAME / API_PASSWORD: basic auth (optional)
/// - API_TIMEOUT_SECS: per-call timeout, default 30
/// - API_MAX_ATTEMPTS: retry cap, default 3
/// - API_BASE_DELAY_MS: first backoff delay, default 1000
/// - DATABASE_PATH: SQLite file, default `data_pipeline.db`
/// - ETL_BATCH_SIZE: rows per insert batch, default 1000
/// - ETL_AUDIT_TABLE: audit target, default `etl_job_logs`
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_base_url: Option<Url>,
    pub auth: Auth,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub database_path: PathBuf,
    pub batch_size: usize,
    pub audit_table: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let api_base_url = match env_opt("API_BASE_URL") {
            Some(raw) => {
                Some(Url::parse(&raw).with_context(|| format!("Invalid API_BASE_URL: {}", raw))?)
            }
            None => None,
        };
        let (username, password, token) = (
            env_opt("API_USERNAME"),
            env_opt("API_PASSWORD"),
            env_opt("API_KEY"),
        );
        let auth = match env_opt("API_AUTH_TYPE") {
            Some(raw) => {
                let auth_type = raw.parse::<AuthType>().map_err(|_| {
                    eyre!("Invalid API_AUTH_TYPE: {} (expected bearer, basic or none)", raw)
                })?;
                Auth::new(&auth_type, username, password, token)
            }
            None => Auth::infer(username, password, token),
        };

        let timeout = Duration::from_secs(env_parse("API_TIMEOUT_SECS", 30u64)?);
        let retry = RetryPolicy::new(
            env_parse("API_MAX_ATTEMPTS", 3u32)?,
            Duration::from_millis(env_parse("API_BASE_DELAY_MS", 1000u64)?),
            2.0,
        );

        let batch_size = env_parse("ETL_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 {
            return Err(eyre!("ETL_BATCH_SIZE must be positive"));
        }

        Ok(Self {
            api_base_url,
            auth,
            timeout,
            retry,
            database_path: env_opt("DATABASE_PATH")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string())
                .into(),
            batch_size,
            audit_table: env_opt("ETL_AUDIT_TABLE")
                .unwrap_or_else(|| DEFAULT_AUDIT_TABLE.to_string()),
        })
    }

    /// API client for remote sources, if a base address is configured
    pub fn api_client(&self) -> Result<Option<ApiClient>> {
        let Some(url) = &self.api_base_url else {
            return Ok(None);
        };
        let client = ApiClient::try_new(url.clone(), self.auth.clone(), self.timeout, self.retry)
            .context("Failed to create API client")?;
        Ok(Some(client))
    }

    /// Loader over the configured database file
    pub fn loader(&self, database: Option<&Path>) -> Result<TableLoader<SqliteStore>> {
        let path = database.unwrap_or(self.database_path.as_path());
        let store = SqliteStore::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Ok(TableLoader::new(store))
    }

    /// Orchestrator for a pipeline file under these settings
    pub fn orchestrator(
        &self,
        config: &PipelineConfig,
        database: Option<&Path>,
        continue_on_failure: bool,
    ) -> Result<Orchestrator<SqliteStore>> {
        let options = RunOptions {
            name: config.name.clone(),
            stop_on_failure: config.stop_on_failure && !continue_on_failure,
            batch_size: self.batch_size,
            audit_table: Some(self.audit_table.clone()),
        };
        Ok(Orchestrator::new(
            self.loader(database)?,
            self.api_client()?,
            options,
        ))
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| eyre!("Invalid {} '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

fn default_pipeline_name() -> String {
    "etl_pipeline".to_string()
}

fn default_stop_on_failure() -> bool {
    true
}

/// A run definition: named list of jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_pipeline_name")]
    pub name: String,
    #[serde(default = "default_stop_on_failure")]
    pub stop_on_failure: bool,
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

impl PipelineConfig {
    /// Read a pipeline file: `.yml`/`.yaml` as YAML, `.json`/`.json5` as JSON5
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let config: Self = match extension.as_deref() {
            Some("json") | Some("json5") => json5::from_str(&content)
                .with_context(|| format!("Failed to parse pipeline JSON5: {}", path.display()))?,
            Some("yml") | Some("yaml") | None => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse pipeline YAML: {}", path.display()))?,
            Some(other) => {
                return Err(eyre!(
                    "Unsupported pipeline file extension '{}': {}",
                    other,
                    path.display()
                ));
            }
        };
        log::debug!(
            "Read pipeline '{}' with {} job(s) from {}",
            config.name,
            config.jobs.len(),
            path.display()
        );
        Ok(config)
    }
}
