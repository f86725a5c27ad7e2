use chrono::Duration;

use crate::config::KST_OFFSET_HOURS;
use crate::types::{AlertCategory, AlertOccurrence, AlertSet, Market, PushMessage};

/// Severity wording tier, derived from the magnitude of the triggering
/// value. `Notice` only appears for low-probability rain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Notice,
    Caution,
    Warning,
    Danger,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Notice => "notice",
            Severity::Caution => "caution",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        }
    }
}

/// Magnitude → severity tier per category.
pub fn severity(category: AlertCategory, value: f64) -> Severity {
    match category {
        AlertCategory::HighTemp => {
            if value >= 35.0 {
                Severity::Danger
            } else if value >= 33.0 {
                Severity::Warning
            } else {
                Severity::Caution
            }
        }
        AlertCategory::LowTemp => {
            if value <= -15.0 {
                Severity::Danger
            } else if value <= -12.0 {
                Severity::Warning
            } else {
                Severity::Caution
            }
        }
        AlertCategory::StrongWind => {
            if value >= 20.0 {
                Severity::Danger
            } else if value >= 17.0 {
                Severity::Warning
            } else {
                Severity::Caution
            }
        }
        AlertCategory::Snow => {
            if value >= 10.0 {
                Severity::Danger
            } else if value >= 5.0 {
                Severity::Warning
            } else {
                Severity::Caution
            }
        }
        AlertCategory::Rain => {
            if value >= 80.0 {
                Severity::Danger
            } else if value >= 70.0 {
                Severity::Warning
            } else if value >= 50.0 {
                Severity::Caution
            } else {
                Severity::Notice
            }
        }
    }
}

fn emoji(category: AlertCategory) -> &'static str {
    match category {
        AlertCategory::HighTemp => "🌡️",
        AlertCategory::LowTemp => "🥶",
        AlertCategory::StrongWind => "💨",
        AlertCategory::Snow => "❄️",
        AlertCategory::Rain => "🌧️",
    }
}

fn category_label(category: AlertCategory) -> &'static str {
    match category {
        AlertCategory::HighTemp => "Heat",
        AlertCategory::LowTemp => "Cold",
        AlertCategory::StrongWind => "Strong wind",
        AlertCategory::Snow => "Heavy snow",
        AlertCategory::Rain => "Rain",
    }
}

/// Headline category for an individual market message: fixed priority
/// `high_temp > low_temp > strong_wind > snow > rain`, earliest occurrence
/// within the winning category.
pub fn headline(set: &AlertSet) -> Option<(AlertCategory, &AlertOccurrence)> {
    AlertCategory::PRIORITY
        .iter()
        .find_map(|&cat| set.first(cat).map(|occ| (cat, occ)))
}

/// Title/body for one (market, category) pair. Also the rendering stored
/// on that pair's alarm-log row.
pub fn compose_category(
    market: &Market,
    category: AlertCategory,
    occ: &AlertOccurrence,
    lookahead_hours: i64,
) -> (String, String) {
    let sev = severity(category, occ.value);
    let title = format!(
        "{} {} {} — {}",
        emoji(category),
        category_label(category),
        sev.label(),
        market.name
    );
    // message bodies render on the recipients' KST wall clock
    let local = occ.at + Duration::hours(KST_OFFSET_HOURS);
    let body = format!(
        "{} expected around {} within the next {} hours.",
        capitalize(&occ.description),
        local.format("%H:%M"),
        lookahead_hours
    );
    (title, body)
}

/// One individual market notification: headline category only, full
/// occurrence detail in the data payload for client deep-linking.
pub fn compose_individual(market: &Market, set: &AlertSet, lookahead_hours: i64) -> PushMessage {
    let (category, occ) = headline(set).expect("individual message requires a non-empty set");
    let (title, body) = compose_category(market, category, occ, lookahead_hours);

    let categories: Vec<&str> = set.categories().map(AlertCategory::as_str).collect();
    PushMessage {
        title,
        body,
        data: serde_json::json!({
            "kind": "weather_alert",
            "category": category.as_str(),
            "categories": categories,
            "market_id": market.id,
            "market_name": market.name,
            "forecast_at": occ.at.timestamp(),
            "value": occ.value,
            "description": occ.description,
        }),
    }
}

/// One digest message summarizing several alerting markets for one
/// recipient. Body names at most two markets; detail lives in the client.
pub fn compose_digest(markets: &[&Market], lookahead_hours: i64) -> PushMessage {
    let count = markets.len();
    let title = format!("🔔 Weather alerts for {count} markets");

    let names: Vec<&str> = markets.iter().take(2).map(|m| m.name.as_str()).collect();
    let body = if count > names.len() {
        format!(
            "{} and {} more have weather alerts in the next {} hours.",
            names.join(", "),
            count - names.len(),
            lookahead_hours
        )
    } else {
        format!(
            "{} have weather alerts in the next {} hours.",
            names.join(" and "),
            lookahead_hours
        )
    };

    let ids: Vec<i64> = markets.iter().map(|m| m.id).collect();
    let all_names: Vec<&str> = markets.iter().map(|m| m.name.as_str()).collect();
    PushMessage {
        title,
        body,
        data: serde_json::json!({
            "kind": "weather_digest",
            "count": count,
            "market_ids": ids,
            "market_names": all_names,
        }),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GridCoord, ThresholdOverrides};
    use chrono::{TimeZone, Utc};

    fn market(id: i64, name: &str) -> Market {
        Market {
            id,
            name: name.to_string(),
            coord: GridCoord { nx: 60, ny: 127 },
            is_active: true,
            overrides: ThresholdOverrides::default(),
        }
    }

    fn occ(category: AlertCategory, value: f64, description: &str) -> AlertOccurrence {
        AlertOccurrence {
            category,
            at: Utc.with_ymd_and_hms(2026, 8, 25, 6, 0, 0).unwrap(),
            value,
            description: description.to_string(),
        }
    }

    #[test]
    fn heat_severity_tiers() {
        assert_eq!(severity(AlertCategory::HighTemp, 36.0), Severity::Danger);
        assert_eq!(severity(AlertCategory::HighTemp, 35.0), Severity::Danger);
        assert_eq!(severity(AlertCategory::HighTemp, 34.0), Severity::Warning);
        assert_eq!(severity(AlertCategory::HighTemp, 33.0), Severity::Warning);
        assert_eq!(severity(AlertCategory::HighTemp, 32.0), Severity::Caution);
    }

    #[test]
    fn cold_severity_tiers() {
        assert_eq!(severity(AlertCategory::LowTemp, -16.0), Severity::Danger);
        assert_eq!(severity(AlertCategory::LowTemp, -15.0), Severity::Danger);
        assert_eq!(severity(AlertCategory::LowTemp, -13.0), Severity::Warning);
        assert_eq!(severity(AlertCategory::LowTemp, -11.0), Severity::Caution);
    }

    #[test]
    fn wind_and_snow_severity_tiers() {
        assert_eq!(severity(AlertCategory::StrongWind, 21.0), Severity::Danger);
        assert_eq!(severity(AlertCategory::StrongWind, 18.0), Severity::Warning);
        assert_eq!(severity(AlertCategory::StrongWind, 15.0), Severity::Caution);
        assert_eq!(severity(AlertCategory::Snow, 12.0), Severity::Danger);
        assert_eq!(severity(AlertCategory::Snow, 6.0), Severity::Warning);
        assert_eq!(severity(AlertCategory::Snow, 2.0), Severity::Caution);
    }

    #[test]
    fn rain_has_four_tiers() {
        assert_eq!(severity(AlertCategory::Rain, 85.0), Severity::Danger);
        assert_eq!(severity(AlertCategory::Rain, 75.0), Severity::Warning);
        assert_eq!(severity(AlertCategory::Rain, 55.0), Severity::Caution);
        assert_eq!(severity(AlertCategory::Rain, 40.0), Severity::Notice);
    }

    #[test]
    fn headline_follows_priority_order() {
        let mut set = AlertSet::default();
        set.push(occ(AlertCategory::Rain, 80.0, "rain (80% chance)"));
        set.push(occ(AlertCategory::StrongWind, 18.0, "wind of 18.0 m/s"));
        set.push(occ(AlertCategory::HighTemp, 34.0, "high of 34.0°C"));

        let (cat, _) = headline(&set).unwrap();
        assert_eq!(cat, AlertCategory::HighTemp);
    }

    #[test]
    fn individual_message_renders_headline_and_payload() {
        let m = market(7, "Central Market");
        let mut set = AlertSet::default();
        set.push(occ(AlertCategory::HighTemp, 34.0, "high of 34.0°C"));

        let msg = compose_individual(&m, &set, 24);
        assert_eq!(msg.title, "🌡️ Heat warning — Central Market");
        // 06:00 UTC renders as 15:00 KST
        assert_eq!(msg.body, "High of 34.0°C expected around 15:00 within the next 24 hours.");
        assert_eq!(msg.data["kind"], "weather_alert");
        assert_eq!(msg.data["market_id"], 7);
        assert_eq!(msg.data["category"], "high_temp");
    }

    #[test]
    fn digest_lists_two_names_plus_remainder() {
        let a = market(1, "Central Market");
        let b = market(2, "East Gate Market");
        let c = market(3, "Harbor Market");
        let d = market(4, "Night Market");

        let msg = compose_digest(&[&a, &b, &c, &d], 24);
        assert_eq!(msg.title, "🔔 Weather alerts for 4 markets");
        assert_eq!(
            msg.body,
            "Central Market, East Gate Market and 2 more have weather alerts in the next 24 hours."
        );
        assert_eq!(msg.data["count"], 4);
    }

    #[test]
    fn small_digest_names_every_market() {
        // the planner only digests at 3+, so both names fit
        let a = market(1, "Central Market");
        let b = market(2, "East Gate Market");
        let c = market(3, "Harbor Market");
        let msg = compose_digest(&[&a, &b, &c], 24);
        assert_eq!(
            msg.body,
            "Central Market, East Gate Market and 1 more have weather alerts in the next 24 hours."
        );
    }
}
