//! Database row types. SQLite has no native booleans, so flags travel as
//! integers and convert at the edge into the domain types.

use serde::Serialize;

use crate::types::{
    DndWindow, GridCoord, Market, RecipientProfile, ThresholdOverrides,
};

#[derive(Debug, sqlx::FromRow)]
pub struct MarketRow {
    pub id: i64,
    pub name: String,
    pub nx: i64,
    pub ny: i64,
    pub is_active: i64,
    pub alert_enabled: Option<i64>,
    pub rain_probability_pct: Option<f64>,
    pub high_temp_c: Option<f64>,
    pub low_temp_c: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub snow_amount_cm: Option<f64>,
    pub rain_alerts: Option<i64>,
    pub snow_alerts: Option<i64>,
    pub temp_alerts: Option<i64>,
    pub wind_alerts: Option<i64>,
}

impl MarketRow {
    pub fn into_market(self) -> Market {
        Market {
            id: self.id,
            name: self.name,
            coord: GridCoord { nx: self.nx as i32, ny: self.ny as i32 },
            is_active: self.is_active != 0,
            overrides: ThresholdOverrides {
                enabled: self.alert_enabled.map(|v| v != 0),
                rain_probability_pct: self.rain_probability_pct,
                high_temp_c: self.high_temp_c,
                low_temp_c: self.low_temp_c,
                wind_speed_ms: self.wind_speed_ms,
                snow_amount_cm: self.snow_amount_cm,
                rain_alerts: self.rain_alerts.map(|v| v != 0),
                snow_alerts: self.snow_alerts.map(|v| v != 0),
                temp_alerts: self.temp_alerts.map(|v| v != 0),
                wind_alerts: self.wind_alerts.map(|v| v != 0),
            },
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub is_active: i64,
    pub push_enabled: i64,
    pub push_token: Option<String>,
    pub dnd_enabled: i64,
    pub dnd_all_day: i64,
    pub dnd_start_min: Option<i64>,
    pub dnd_end_min: Option<i64>,
    pub dnd_days: Option<String>,
}

impl UserRow {
    pub fn into_profile(self) -> RecipientProfile {
        let dnd = if self.dnd_enabled != 0 {
            Some(DndWindow {
                all_day: self.dnd_all_day != 0,
                start_min: self.dnd_start_min.unwrap_or(0) as u32,
                end_min: self.dnd_end_min.unwrap_or(0) as u32,
                days: self.dnd_days.as_deref().map(parse_day_list),
            })
        } else {
            None
        };
        RecipientProfile {
            user_id: self.id,
            push_token: self.push_token,
            is_active: self.is_active != 0,
            push_enabled: self.push_enabled != 0,
            dnd,
        }
    }
}

/// "5,6" → [5, 6]; unparseable entries are dropped.
fn parse_day_list(s: &str) -> Vec<u32> {
    s.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AlarmLogEntry {
    pub id: i64,
    pub market_id: i64,
    pub category: String,
    pub title: String,
    pub body: String,
    pub total_users: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub measured_value: f64,
    pub description: String,
    /// Unix seconds of the triggering forecast slot.
    pub forecast_at: i64,
    pub lookahead_hours: i64,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_list_parsing() {
        assert_eq!(parse_day_list("5,6"), vec![5, 6]);
        assert_eq!(parse_day_list(" 0 , 2 "), vec![0, 2]);
        assert_eq!(parse_day_list("1,x,3"), vec![1, 3]);
        assert!(parse_day_list("").is_empty());
    }

    #[test]
    fn dnd_disabled_maps_to_none() {
        let row = UserRow {
            id: 1,
            is_active: 1,
            push_enabled: 1,
            push_token: Some("tok".into()),
            dnd_enabled: 0,
            dnd_all_day: 1,
            dnd_start_min: Some(100),
            dnd_end_min: Some(200),
            dnd_days: Some("1".into()),
        };
        assert!(row.into_profile().dnd.is_none());
    }
}
