use crate::config::default_thresholds as defaults;
use crate::types::ThresholdOverrides;

/// Fully-populated per-market thresholds after merging overrides with the
/// system defaults. Produced once per market per cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedThresholds {
    pub rain_probability_pct: f64,
    pub high_temp_c: f64,
    pub low_temp_c: f64,
    pub wind_speed_ms: f64,
    pub snow_amount_cm: f64,
    pub rain_alerts: bool,
    pub snow_alerts: bool,
    pub temp_alerts: bool,
    pub wind_alerts: bool,
}

/// Merge a market's optional overrides with the system defaults. Returns
/// `None` when the master flag resolves to disabled — the caller skips the
/// market before any forecast or database work is spent on it.
pub fn resolve(overrides: &ThresholdOverrides) -> Option<ResolvedThresholds> {
    if !overrides.enabled.unwrap_or(true) {
        return None;
    }
    Some(ResolvedThresholds {
        rain_probability_pct: overrides
            .rain_probability_pct
            .unwrap_or(defaults::RAIN_PROBABILITY_PCT),
        high_temp_c: overrides.high_temp_c.unwrap_or(defaults::HIGH_TEMP_C),
        low_temp_c: overrides.low_temp_c.unwrap_or(defaults::LOW_TEMP_C),
        wind_speed_ms: overrides.wind_speed_ms.unwrap_or(defaults::WIND_SPEED_MS),
        snow_amount_cm: overrides.snow_amount_cm.unwrap_or(defaults::SNOW_AMOUNT_CM),
        rain_alerts: overrides.rain_alerts.unwrap_or(true),
        snow_alerts: overrides.snow_alerts.unwrap_or(true),
        temp_alerts: overrides.temp_alerts.unwrap_or(true),
        wind_alerts: overrides.wind_alerts.unwrap_or(true),
    })
}
