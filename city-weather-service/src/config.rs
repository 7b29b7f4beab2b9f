use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub struct Config {
    pub port: u16,
    pub open_meteo_url: String,
    pub weather_api_key: Option<String>,
    pub refresh_interval_secs: u64,
    pub refresh_on_startup: bool,
    pub refresh_concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub http_max_retries: u32,
    pub rate_limit_per_minute: u32,
    pub database_url: Option<String>,
    pub cities_file: Option<PathBuf>,
    pub admin_jwt_secret: Option<String>,
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> Self {
        let refresh_concurrency = parse_var("REFRESH_CONCURRENCY").unwrap_or(4);
        let http_timeout_secs = parse_var("HTTP_TIMEOUT_SECS").unwrap_or(5);
        let http_max_retries = parse_var("HTTP_MAX_RETRIES").unwrap_or(2);
        let rate_limit_per_minute = parse_var("RATE_LIMIT_PER_MINUTE").unwrap_or(60);

        Self {
            port: parse_var("PORT").unwrap_or(3002),
            open_meteo_url: env::var("OPEN_METEO_URL")
                .unwrap_or_else(|_| "https://api.open-meteo.com/v1/forecast".to_string()),
            weather_api_key: non_empty_var("WEATHER_API_KEY"),
            refresh_interval_secs: parse_var("REFRESH_INTERVAL_SECS").unwrap_or(3600), // hourly
            refresh_on_startup: parse_var("REFRESH_ON_STARTUP").unwrap_or(true),
            refresh_concurrency,
            fetch_timeout_secs: parse_var("FETCH_TIMEOUT_SECS").unwrap_or_else(|| {
                fetch_budget_secs(
                    http_timeout_secs,
                    http_max_retries,
                    refresh_concurrency,
                    rate_limit_per_minute,
                )
            }),
            http_timeout_secs,
            http_max_retries,
            rate_limit_per_minute,
            database_url: non_empty_var("DATABASE_URL"),
            cities_file: non_empty_var("CITIES_FILE").map(PathBuf::from),
            admin_jwt_secret: non_empty_var("ADMIN_JWT_SECRET"),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn fetch_budget_secs(&self) -> u64 {
        fetch_budget_secs(
            self.http_timeout_secs,
            self.http_max_retries,
            self.refresh_concurrency,
            self.rate_limit_per_minute,
        )
    }
}

/// Worst case for one fetch: every HTTP attempt times out, the client sleeps
/// its full backoff between attempts, and a full throttle queue is ahead of it.
fn fetch_budget_secs(
    http_timeout_secs: u64,
    max_retries: u32,
    concurrency: usize,
    rate_limit_per_minute: u32,
) -> u64 {
    let attempts = u64::from(max_retries) + 1;
    let backoff_ms = 2_u64
        .saturating_pow(max_retries)
        .saturating_sub(1)
        .saturating_mul(100);
    let throttle_ms = (concurrency.max(1) as u64)
        .saturating_mul(60_000 / u64::from(rate_limit_per_minute.max(1)));

    http_timeout_secs
        .saturating_mul(attempts)
        .saturating_add(backoff_ms.saturating_add(throttle_ms).div_ceil(1000))
        .saturating_add(1)
}

fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
