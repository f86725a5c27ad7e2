use chrono::{DateTime, Duration, Utc};

use crate::engine::thresholds::ResolvedThresholds;
use crate::types::{AlertCategory, AlertOccurrence, AlertSet, ForecastSample};

/// Outcome of inspecting one market's forecast.
///
/// `Unavailable` (failed fetch or no usable samples) is distinct from an
/// empty `Evaluated` set — the former is an upstream problem retried next
/// cycle, the latter is a quiet market.
#[derive(Debug, Clone)]
pub enum Evaluation {
    Unavailable,
    Evaluated(AlertSet),
}

/// Classify a forecast time series against resolved thresholds.
///
/// Samples are assumed ascending by timestamp; only those within
/// `now + lookahead_hours` are considered. All comparisons are inclusive
/// (`>=`, and `<=` for the low-temperature side). Occurrences accumulate
/// per category in chronological order.
pub fn evaluate(
    samples: &[ForecastSample],
    th: &ResolvedThresholds,
    now: DateTime<Utc>,
    lookahead_hours: i64,
) -> Evaluation {
    if samples.is_empty() {
        return Evaluation::Unavailable;
    }

    let horizon = now + Duration::hours(lookahead_hours);
    let mut set = AlertSet::default();

    for sample in samples.iter().filter(|s| s.at <= horizon) {
        if th.rain_alerts {
            let rain_fired = sample.precip_probability >= th.rain_probability_pct
                || sample.precip_type.is_precip();
            if rain_fired {
                set.push(AlertOccurrence {
                    category: AlertCategory::Rain,
                    at: sample.at,
                    value: sample.precip_probability,
                    description: format!(
                        "{} ({:.0}% chance)",
                        sample.precip_type.description(),
                        sample.precip_probability
                    ),
                });

                // Snow refines a rain occurrence: same sample, snowy
                // precipitation type, and enough forecast accumulation.
                if th.snow_alerts
                    && sample.precip_type.is_snowy()
                    && sample.snow_amount_cm >= th.snow_amount_cm
                {
                    set.push(AlertOccurrence {
                        category: AlertCategory::Snow,
                        at: sample.at,
                        value: sample.snow_amount_cm,
                        description: format!("snowfall of {:.1} cm", sample.snow_amount_cm),
                    });
                }
            }
        }

        if th.temp_alerts {
            if sample.temp_c >= th.high_temp_c {
                set.push(AlertOccurrence {
                    category: AlertCategory::HighTemp,
                    at: sample.at,
                    value: sample.temp_c,
                    description: format!("high of {:.1}°C", sample.temp_c),
                });
            }
            if sample.temp_c <= th.low_temp_c {
                set.push(AlertOccurrence {
                    category: AlertCategory::LowTemp,
                    at: sample.at,
                    value: sample.temp_c,
                    description: format!("low of {:.1}°C", sample.temp_c),
                });
            }
        }

        if th.wind_alerts && sample.wind_speed_ms >= th.wind_speed_ms {
            set.push(AlertOccurrence {
                category: AlertCategory::StrongWind,
                at: sample.at,
                value: sample.wind_speed_ms,
                description: format!("wind of {:.1} m/s", sample.wind_speed_ms),
            });
        }
    }

    Evaluation::Evaluated(set)
}
