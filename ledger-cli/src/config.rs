//! Configuration loading from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use ledger_repo::DEFAULT_ALERT_THRESHOLD;

const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("Unknown LOG_FORMAT: {} (expected text or json)", other),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Lifetime of cached account reads
    pub cache_ttl: Duration,
    /// Consecutive invalidation failures before logging at ERROR
    pub cache_alert_threshold: u64,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// `database_url` overrides `DATABASE_URL` when given on the command line.
    pub fn from_env(database_url: Option<String>) -> anyhow::Result<Self> {
        let database_url = match database_url {
            Some(url) => url,
            None => env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
        };

        let cache_ttl_secs = match env::var("CACHE_TTL_SECS") {
            Ok(v) => v.parse()?,
            Err(_) => DEFAULT_CACHE_TTL_SECS,
        };

        let cache_alert_threshold = match env::var("CACHE_ALERT_THRESHOLD") {
            Ok(v) => v.parse()?,
            Err(_) => DEFAULT_ALERT_THRESHOLD,
        };

        let log_format = log_format()?;

        Ok(Self {
            database_url,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            cache_alert_threshold,
            log_format,
        })
    }
}

fn log_format() -> anyhow::Result<LogFormat> {
    env::var("LOG_FORMAT")
        .map(|v| v.parse())
        .unwrap_or(Ok(LogFormat::Text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_explicit_database_url_wins() {
        let config = Config::from_env(Some("sqlite://ledger.db".into())).unwrap();
        assert_eq!(config.database_url, "sqlite://ledger.db");
    }
}
