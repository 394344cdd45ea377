use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Queue backend. `None` disables auto-apply dispatch.
    pub redis_url: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub app_env: String,
    pub scrape: ScrapeConfig,
    pub apply: ApplyConfig,
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Six-field cron expression (seconds first), as tokio-cron-scheduler expects.
    pub cron_schedule: String,
    pub default_keywords: String,
    pub default_location: String,
    pub page_limit: u32,
    pub page_timeout: Duration,
    pub run_timeout: Duration,
    pub indeed_base_url: String,
}

#[derive(Debug, Clone)]
pub struct ApplyConfig {
    pub workers: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub poll_interval: Duration,
    pub webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cron_schedule = normalize_cron(
            &get("CRON_SCHEDULE").unwrap_or_else(|| "0 */6 * * *".to_string()),
        )?;

        let scrape = ScrapeConfig {
            cron_schedule,
            default_keywords: get("SCRAPE_KEYWORDS")
                .unwrap_or_else(|| "software engineer".to_string()),
            default_location: get("SCRAPE_LOCATION")
                .unwrap_or_else(|| "United States".to_string()),
            page_limit: parse_or(&get, "SCRAPE_PAGE_LIMIT", 1)?,
            page_timeout: Duration::from_secs(parse_or(&get, "SCRAPE_PAGE_TIMEOUT_SECS", 30)?),
            run_timeout: Duration::from_secs(parse_or(&get, "SCRAPE_RUN_TIMEOUT_SECS", 300)?),
            indeed_base_url: get("INDEED_BASE_URL")
                .unwrap_or_else(|| "https://www.indeed.com".to_string()),
        };

        let apply = ApplyConfig {
            workers: parse_or(&get, "APPLY_WORKERS", 2)?,
            max_attempts: parse_or(&get, "APPLY_MAX_ATTEMPTS", 3)?,
            backoff_base: Duration::from_secs(parse_or(&get, "APPLY_BACKOFF_BASE_SECS", 2)?),
            poll_interval: Duration::from_millis(parse_or(&get, "APPLY_POLL_INTERVAL_MS", 1000)?),
            webhook_url: get("APPLY_WEBHOOK_URL"),
        };

        if apply.max_attempts == 0 {
            bail!("APPLY_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Config {
            database_url: get("DATABASE_URL")
                .context("Required environment variable 'DATABASE_URL' is not set")?,
            redis_url: get("REDIS_URL"),
            port: parse_or(&get, "PORT", 8080)?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            app_env: get("APP_ENV").unwrap_or_else(|| "development".to_string()),
            scrape,
            apply,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} is invalid ({raw}): {e}")),
    }
}

/// Accepts classic 5-field crontab syntax and prepends a seconds field.
/// 6 and 7 field expressions pass through. Anything else is rejected.
pub fn normalize_cron(expr: &str) -> Result<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {}", fields.join(" "))),
        6 | 7 => Ok(fields.join(" ")),
        n => bail!("CRON_SCHEDULE '{expr}' has {n} fields; expected 5, 6 or 7"),
    }
}
