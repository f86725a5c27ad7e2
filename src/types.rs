use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type MarketId = i64;
pub type UserId = i64;

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// KMA forecast grid cell. The upstream weather service keys forecasts by
/// discretized (nx, ny) rather than raw latitude/longitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCoord {
    pub nx: i32,
    pub ny: i32,
}

impl std::fmt::Display for GridCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.nx, self.ny)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub name: String,
    pub coord: GridCoord,
    pub is_active: bool,
    pub overrides: ThresholdOverrides,
}

/// Per-market threshold overrides. `None` means "use the system default"
/// for that field — resolution happens in `engine::thresholds`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdOverrides {
    pub enabled: Option<bool>,
    pub rain_probability_pct: Option<f64>,
    pub high_temp_c: Option<f64>,
    pub low_temp_c: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub snow_amount_cm: Option<f64>,
    pub rain_alerts: Option<bool>,
    pub snow_alerts: Option<bool>,
    pub temp_alerts: Option<bool>,
    pub wind_alerts: Option<bool>,
}

// ---------------------------------------------------------------------------
// Forecast samples
// ---------------------------------------------------------------------------

/// KMA PTY precipitation-type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecipType {
    /// 0 — no precipitation
    Clear,
    /// 1 — rain
    Rain,
    /// 2 — rain and snow (sleet)
    RainSnow,
    /// 3 — snow
    Snow,
    /// 4 — showers
    Shower,
}

impl PrecipType {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "1" => PrecipType::Rain,
            "2" => PrecipType::RainSnow,
            "3" => PrecipType::Snow,
            "4" => PrecipType::Shower,
            _ => PrecipType::Clear,
        }
    }

    /// Any non-clear condition counts as precipitation for rain alerting.
    pub fn is_precip(self) -> bool {
        self != PrecipType::Clear
    }

    /// Snow and sleet qualify for snow-accumulation refinement.
    pub fn is_snowy(self) -> bool {
        matches!(self, PrecipType::Snow | PrecipType::RainSnow)
    }

    pub fn description(self) -> &'static str {
        match self {
            PrecipType::Clear => "no precipitation",
            PrecipType::Rain => "rain",
            PrecipType::RainSnow => "rain and snow",
            PrecipType::Snow => "snow",
            PrecipType::Shower => "showers",
        }
    }
}

/// One forecast instant, decoded from the upstream provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSample {
    pub at: DateTime<Utc>,
    pub temp_c: f64,
    pub precip_probability: f64,
    pub precip_type: PrecipType,
    pub wind_speed_ms: f64,
    pub snow_amount_cm: f64,
}

// ---------------------------------------------------------------------------
// Alert classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    HighTemp,
    LowTemp,
    StrongWind,
    Snow,
    Rain,
}

impl AlertCategory {
    /// All categories in headline-priority order (highest first).
    pub const PRIORITY: [AlertCategory; 5] = [
        AlertCategory::HighTemp,
        AlertCategory::LowTemp,
        AlertCategory::StrongWind,
        AlertCategory::Snow,
        AlertCategory::Rain,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertCategory::HighTemp => "high_temp",
            AlertCategory::LowTemp => "low_temp",
            AlertCategory::StrongWind => "strong_wind",
            AlertCategory::Snow => "snow",
            AlertCategory::Rain => "rain",
        }
    }

}

impl std::fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One threshold crossing on one forecast sample. Ephemeral — lives only
/// within a single evaluation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct AlertOccurrence {
    pub category: AlertCategory,
    pub at: DateTime<Utc>,
    pub value: f64,
    pub description: String,
}

/// Per-market classification result: occurrences grouped by category,
/// chronological within each category. Only non-empty categories appear.
#[derive(Debug, Clone, Default)]
pub struct AlertSet {
    by_category: BTreeMap<AlertCategory, Vec<AlertOccurrence>>,
}

impl AlertSet {
    pub fn push(&mut self, occ: AlertOccurrence) {
        self.by_category.entry(occ.category).or_default().push(occ);
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }

    pub fn categories(&self) -> impl Iterator<Item = AlertCategory> + '_ {
        self.by_category.keys().copied()
    }

    /// Earliest occurrence in a category — both the dedup key and the
    /// headline hang off this.
    pub fn first(&self, category: AlertCategory) -> Option<&AlertOccurrence> {
        self.by_category.get(&category).and_then(|v| v.first())
    }

    pub fn occurrences(&self, category: AlertCategory) -> &[AlertOccurrence] {
        self.by_category.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn retain_categories(&mut self, mut keep: impl FnMut(AlertCategory) -> bool) {
        self.by_category.retain(|cat, _| keep(*cat));
    }
}

// ---------------------------------------------------------------------------
// Recipients
// ---------------------------------------------------------------------------

/// Do-not-disturb window. Minutes are minute-of-day in the recipient's
/// clock; `days` restricts the window to specific weekdays when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DndWindow {
    pub all_day: bool,
    pub start_min: u32,
    pub end_min: u32,
    /// chrono weekday numbers, Monday = 0. `None` = every day.
    pub days: Option<Vec<u32>>,
}

impl DndWindow {
    /// Whether delivery is suppressed at the given minute-of-day/weekday.
    /// Windows that cross midnight (start > end) match `cur >= start OR
    /// cur < end`; the end bound is always exclusive.
    pub fn suppresses(&self, minute_of_day: u32, weekday_num: u32) -> bool {
        if let Some(days) = &self.days {
            if !days.contains(&weekday_num) {
                return false;
            }
        }
        if self.all_day {
            return true;
        }
        if self.start_min <= self.end_min {
            minute_of_day >= self.start_min && minute_of_day < self.end_min
        } else {
            minute_of_day >= self.start_min || minute_of_day < self.end_min
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecipientProfile {
    pub user_id: UserId,
    pub push_token: Option<String>,
    pub is_active: bool,
    pub push_enabled: bool,
    pub dnd: Option<DndWindow>,
}

impl RecipientProfile {
    /// Push capability only — DND is evaluated separately against the clock.
    pub fn can_receive_push(&self) -> bool {
        self.is_active && self.push_enabled && self.push_token.is_some()
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// Structured payload for client deep-linking.
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SendOutcome {
    pub success_count: u32,
    pub failure_count: u32,
}

// ---------------------------------------------------------------------------
// Alarm log
// ---------------------------------------------------------------------------

/// One audit row per (market, category) alert event with delivery counts.
/// `total_users == success_count + failure_count` always holds.
#[derive(Debug, Clone)]
pub struct NewAlarmLog {
    pub market_id: MarketId,
    pub category: AlertCategory,
    pub title: String,
    pub body: String,
    pub total_users: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub measured_value: f64,
    pub description: String,
    pub forecast_at: DateTime<Utc>,
    pub lookahead_hours: i64,
}

// ---------------------------------------------------------------------------
// Cycle summary
// ---------------------------------------------------------------------------

/// Best-effort accounting returned by every evaluation cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub checked_markets: u32,
    /// Successfully delivered messages across all recipients.
    pub alerts_sent: u32,
    /// Markets whose master alert flag resolved to disabled.
    pub skipped_markets: u32,
    pub unique_coordinates: u32,
    /// Coordinates whose forecast fetch failed or was unusable this cycle.
    pub failed_coordinates: u32,
    pub log_rows_written: u32,
}
