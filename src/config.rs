use std::env;

/// Worker-process configuration, loaded from environment variables.
///
/// Everything the engine itself needs per crawl lives in the run's settings
/// snapshot; this covers only the shared clients and worker-level knobs.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub queue_key: String,
    pub max_concurrent_runs: usize,
    pub max_job_attempts: u32,
    pub retry_backoff_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://hydrafrog.db?mode=rwc".to_string());

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let queue_key = env::var("QUEUE_KEY").unwrap_or_else(|_| "crawl:jobs".to_string());

        let max_concurrent_runs = env::var("MAX_CONCURRENT_RUNS")
            .unwrap_or_else(|_| "1".to_string())
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidValue("MAX_CONCURRENT_RUNS", "must be a valid usize"))?;
        if max_concurrent_runs == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_CONCURRENT_RUNS",
                "must be at least 1",
            ));
        }

        let max_job_attempts = env::var("MAX_JOB_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidValue("MAX_JOB_ATTEMPTS", "must be a valid u32"))?;

        let retry_backoff_secs = env::var("RETRY_BACKOFF_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue("RETRY_BACKOFF_SECS", "must be a valid u64"))?;

        Ok(Config {
            database_url,
            redis_url,
            queue_key,
            max_concurrent_runs,
            max_job_attempts,
            retry_backoff_secs,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, &'static str),
}
