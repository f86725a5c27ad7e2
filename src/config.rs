use crate::error::{AppError, Result};

pub const KMA_API_URL: &str = "http://apis.data.go.kr/1360000/VilageFcstInfoService_2.0";
pub const FCM_API_URL: &str = "https://fcm.googleapis.com/v1";

/// Hours of forecast considered for alerting when no override is given.
pub const DEFAULT_LOOKAHEAD_HOURS: i64 = 24;

/// Recipients, display times, and the upstream forecast service all share
/// the KST wall clock; the engine itself works in UTC.
pub const KST_OFFSET_HOURS: i64 = 9;

/// A recipient interested in this many or more alerting markets gets a
/// single digest message instead of per-market messages.
pub const DIGEST_MIN_MARKETS: usize = 3;

/// Evaluation cycle interval (seconds) — matches the original hourly cron.
pub const CYCLE_INTERVAL_SECS: u64 = 3600;

/// Concurrent forecast fetches per cycle. The upstream service enforces
/// call-rate limits, so this stays small.
pub const FETCH_CONCURRENCY: usize = 4;

/// Per-dispatch timeout (seconds). A timed-out send counts as a failure.
pub const DISPATCH_TIMEOUT_SECS: u64 = 10;

/// Forecast fetch timeout (seconds).
pub const FETCH_TIMEOUT_SECS: u64 = 30;

/// System default thresholds, used wherever a market has no override.
pub mod default_thresholds {
    pub const RAIN_PROBABILITY_PCT: f64 = 30.0;
    pub const HIGH_TEMP_C: f64 = 33.0;
    pub const LOW_TEMP_C: f64 = -12.0;
    pub const WIND_SPEED_MS: f64 = 14.0;
    pub const SNOW_AMOUNT_CM: f64 = 1.0;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// KMA village forecast endpoint (KMA_API_URL)
    pub kma_api_url: String,
    /// Service key for the KMA API (KMA_SERVICE_KEY, required)
    pub kma_service_key: String,
    /// FCM HTTP v1 endpoint (FCM_API_URL)
    pub fcm_api_url: String,
    /// FCM project id (FCM_PROJECT_ID, required)
    pub fcm_project_id: String,
    /// OAuth bearer token for FCM (FCM_AUTH_TOKEN, required)
    pub fcm_auth_token: String,
    /// Scheduled cycle interval in seconds (CYCLE_INTERVAL_SECS)
    pub cycle_interval_secs: u64,
    /// Default lookahead horizon in hours (LOOKAHEAD_HOURS)
    pub lookahead_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "alerter.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            kma_api_url: std::env::var("KMA_API_URL").unwrap_or_else(|_| KMA_API_URL.to_string()),
            kma_service_key: std::env::var("KMA_SERVICE_KEY")
                .map_err(|_| AppError::Config("KMA_SERVICE_KEY must be set".to_string()))?,
            fcm_api_url: std::env::var("FCM_API_URL").unwrap_or_else(|_| FCM_API_URL.to_string()),
            fcm_project_id: std::env::var("FCM_PROJECT_ID")
                .map_err(|_| AppError::Config("FCM_PROJECT_ID must be set".to_string()))?,
            fcm_auth_token: std::env::var("FCM_AUTH_TOKEN")
                .map_err(|_| AppError::Config("FCM_AUTH_TOKEN must be set".to_string()))?,
            cycle_interval_secs: std::env::var("CYCLE_INTERVAL_SECS")
                .unwrap_or_default()
                .parse::<u64>()
                .unwrap_or(CYCLE_INTERVAL_SECS),
            lookahead_hours: std::env::var("LOOKAHEAD_HOURS")
                .unwrap_or_default()
                .parse::<i64>()
                .unwrap_or(DEFAULT_LOOKAHEAD_HOURS),
        })
    }
}
