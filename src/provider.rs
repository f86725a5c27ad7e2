use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Timelike, Utc};
use tracing::warn;

use crate::config::{Config, FETCH_TIMEOUT_SECS, KST_OFFSET_HOURS};
use crate::error::{AppError, Result};
use crate::types::{ForecastSample, GridCoord, PrecipType};

/// KMA publishes the village forecast at these hours (KST), available
/// roughly ten minutes past the hour.
const BASE_HOURS: [u32; 8] = [2, 5, 8, 11, 14, 17, 20, 23];

/// Upstream forecast source. One call per unique grid coordinate per cycle.
/// Samples come back sorted ascending by timestamp.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn get_forecast(&self, coord: GridCoord) -> Result<Vec<ForecastSample>>;
}

pub struct KmaForecastProvider {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl KmaForecastProvider {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.kma_api_url.clone(),
            service_key: cfg.kma_service_key.clone(),
        })
    }
}

#[async_trait]
impl ForecastProvider for KmaForecastProvider {
    async fn get_forecast(&self, coord: GridCoord) -> Result<Vec<ForecastSample>> {
        let kst_now = Utc::now().naive_utc() + ChronoDuration::hours(KST_OFFSET_HOURS);
        let (base_date, base_time) = latest_base(kst_now);

        let url = format!(
            "{}/getVilageFcst?serviceKey={}&pageNo=1&numOfRows=1000&dataType=JSON&base_date={}&base_time={}&nx={}&ny={}",
            self.base_url, self.service_key, base_date, base_time, coord.nx, coord.ny
        );

        let resp: serde_json::Value = self.client.get(&url).send().await?.json().await?;

        let result_code = resp
            .pointer("/response/header/resultCode")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if result_code != "00" {
            let msg = resp
                .pointer("/response/header/resultMsg")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            return Err(AppError::Provider(format!(
                "KMA forecast for {coord} failed: {result_code} {msg}"
            )));
        }

        let items = resp
            .pointer("/response/body/items/item")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                AppError::Provider(format!("KMA forecast for {coord}: items missing"))
            })?;

        Ok(parse_samples(items))
    }
}

/// Latest published (base_date, base_time) as of the given KST wall clock.
fn latest_base(kst_now: NaiveDateTime) -> (String, String) {
    // ten-minute publication lag
    let effective = kst_now - ChronoDuration::minutes(10);
    let hour = effective.hour();

    let base_hour = BASE_HOURS.iter().rev().find(|&&h| h <= hour).copied();
    match base_hour {
        Some(h) => (effective.format("%Y%m%d").to_string(), format!("{h:02}00")),
        // before 02:10 KST — fall back to yesterday's 23:00 run
        None => {
            let yesterday = effective - ChronoDuration::days(1);
            (yesterday.format("%Y%m%d").to_string(), "2300".to_string())
        }
    }
}

#[derive(Default)]
struct SlotFields {
    temp_c: Option<f64>,
    precip_probability: Option<f64>,
    precip_type: Option<PrecipType>,
    wind_speed_ms: Option<f64>,
    snow_amount_cm: Option<f64>,
}

/// Decode the flat per-category item list into per-timestamp samples.
/// KMA returns one item per (slot, category); grouping by (fcstDate,
/// fcstTime) in a BTreeMap keeps the output ascending by timestamp.
/// Malformed slots are skipped with a warning rather than failing the fetch.
pub fn parse_samples(items: &[serde_json::Value]) -> Vec<ForecastSample> {
    let mut slots: std::collections::BTreeMap<(String, String), SlotFields> =
        std::collections::BTreeMap::new();

    for item in items {
        let (Some(date), Some(time), Some(category), Some(value)) = (
            item.get("fcstDate").and_then(|v| v.as_str()),
            item.get("fcstTime").and_then(|v| v.as_str()),
            item.get("category").and_then(|v| v.as_str()),
            item.get("fcstValue").and_then(|v| v.as_str()),
        ) else {
            warn!("Forecast item missing fields, skipped: {item}");
            continue;
        };

        let slot = slots
            .entry((date.to_string(), time.to_string()))
            .or_default();

        match category {
            // TMP in the village forecast, T1H in the ultra-short one
            "TMP" | "T1H" => slot.temp_c = value.parse().ok(),
            "POP" => slot.precip_probability = value.parse().ok(),
            "PTY" => slot.precip_type = Some(PrecipType::from_code(value)),
            "WSD" => slot.wind_speed_ms = value.parse().ok(),
            // SNO carries strings like "적설없음" for zero accumulation
            "SNO" => slot.snow_amount_cm = Some(parse_lenient_amount(value)),
            _ => {}
        }
    }

    let mut samples = Vec::with_capacity(slots.len());
    for ((date, time), fields) in slots {
        let Some(at) = parse_slot_timestamp(&date, &time) else {
            warn!("Unparseable forecast timestamp {date}{time}, slot skipped");
            continue;
        };
        let Some(temp_c) = fields.temp_c else {
            warn!("Forecast slot {date}{time} has no temperature, skipped");
            continue;
        };
        samples.push(ForecastSample {
            at,
            temp_c,
            precip_probability: fields.precip_probability.unwrap_or(0.0),
            precip_type: fields.precip_type.unwrap_or(PrecipType::Clear),
            wind_speed_ms: fields.wind_speed_ms.unwrap_or(0.0),
            snow_amount_cm: fields.snow_amount_cm.unwrap_or(0.0),
        });
    }
    samples
}

fn parse_slot_timestamp(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let padded = format!("{date}{time:0>4}");
    let naive = NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M").ok()?;
    Some((naive - ChronoDuration::hours(KST_OFFSET_HOURS)).and_utc())
}

/// Amount fields mix numbers with prose ("적설없음", "1cm 미만"). Anything
/// that does not lead with a number means no measurable accumulation.
fn parse_lenient_amount(value: &str) -> f64 {
    let numeric: String = value
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    numeric.parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn item(date: &str, time: &str, category: &str, value: &str) -> serde_json::Value {
        json!({
            "fcstDate": date,
            "fcstTime": time,
            "category": category,
            "fcstValue": value,
            "nx": 60,
            "ny": 127,
        })
    }

    #[test]
    fn groups_items_into_ascending_samples() {
        let items = vec![
            // deliberately out of order across slots
            item("20260825", "1800", "TMP", "31.0"),
            item("20260825", "1500", "TMP", "34.0"),
            item("20260825", "1500", "POP", "20"),
            item("20260825", "1500", "PTY", "0"),
            item("20260825", "1500", "WSD", "3.2"),
            item("20260825", "1800", "POP", "60"),
            item("20260825", "1800", "PTY", "1"),
        ];

        let samples = parse_samples(&items);
        assert_eq!(samples.len(), 2);
        assert!(samples[0].at < samples[1].at);
        assert_eq!(samples[0].temp_c, 34.0);
        assert_eq!(samples[0].precip_probability, 20.0);
        assert_eq!(samples[1].precip_type, PrecipType::Rain);
        assert_eq!(samples[1].precip_probability, 60.0);
    }

    #[test]
    fn kst_timestamps_shift_to_utc() {
        let items = vec![item("20260825", "1500", "TMP", "30.0")];
        let samples = parse_samples(&items);
        let expected = NaiveDate::from_ymd_opt(2026, 8, 25)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(samples[0].at, expected);
    }

    #[test]
    fn malformed_timestamp_skips_slot_only() {
        let items = vec![
            item("20260825", "1500", "TMP", "30.0"),
            item("not-a-date", "9999", "TMP", "12.0"),
        ];
        let samples = parse_samples(&items);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn slot_without_temperature_is_dropped() {
        let items = vec![item("20260825", "1500", "POP", "80")];
        assert!(parse_samples(&items).is_empty());
    }

    #[test]
    fn lenient_snow_amounts() {
        assert_eq!(parse_lenient_amount("1.5"), 1.5);
        assert_eq!(parse_lenient_amount("적설없음"), 0.0);
        assert_eq!(parse_lenient_amount("1cm 미만"), 1.0);
    }

    #[test]
    fn base_run_selection() {
        let at = |h: u32, m: u32| {
            NaiveDate::from_ymd_opt(2026, 8, 25)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap()
        };
        // 14:30 → the 14:00 run is out
        assert_eq!(latest_base(at(14, 30)).1, "1400");
        // 14:05 → 14:00 run not yet published, use 11:00
        assert_eq!(latest_base(at(14, 5)).1, "1100");
        // 01:00 → yesterday's 23:00 run
        let (d, t) = latest_base(at(1, 0));
        assert_eq!(d, "20260824");
        assert_eq!(t, "2300");
    }
}
