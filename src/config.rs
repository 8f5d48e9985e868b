use crate::orchestration::CommitScope;
use crate::store::FetchMode;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub match_mode: FetchMode,
    pub commit_scope: CommitScope,
    pub max_parallel_buckets: usize,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let match_mode = match env_map
            .get("MATCH_MODE")
            .map(|s| s.as_str())
            .unwrap_or("incremental")
        {
            "incremental" => FetchMode::Unmatched,
            "full" => FetchMode::All,
            other => {
                return Err(ConfigError::InvalidValue(
                    "MATCH_MODE".to_string(),
                    format!("must be incremental or full, got {}", other),
                ))
            }
        };

        let commit_scope = match env_map
            .get("COMMIT_SCOPE")
            .map(|s| s.as_str())
            .unwrap_or("bucket")
        {
            "bucket" => CommitScope::Bucket,
            "run" => CommitScope::Run,
            other => {
                return Err(ConfigError::InvalidValue(
                    "COMMIT_SCOPE".to_string(),
                    format!("must be bucket or run, got {}", other),
                ))
            }
        };

        let max_parallel_buckets = env_map
            .get("MAX_PARALLEL_BUCKETS")
            .map(|s| s.as_str())
            .unwrap_or("4")
            .parse::<usize>()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "MAX_PARALLEL_BUCKETS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let log_format = match env_map
            .get("LOG_FORMAT")
            .map(|s| s.as_str())
            .unwrap_or("text")
        {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::InvalidValue(
                    "LOG_FORMAT".to_string(),
                    format!("must be text or json, got {}", other),
                ))
            }
        };

        Ok(Config {
            database_path,
            match_mode,
            commit_scope,
            max_parallel_buckets,
            log_format,
        })
    }
}
