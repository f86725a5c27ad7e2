use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::config::{DIGEST_MIN_MARKETS, KST_OFFSET_HOURS};
use crate::types::{AlertSet, Market, RecipientProfile, UserId};

/// One market's surviving alerts after deduplication.
#[derive(Debug, Clone)]
pub struct MarketAlerts {
    pub market: Market,
    pub alerts: AlertSet,
}

/// One multicast: every recipient receiving this market as an individual
/// message. `market_idx` indexes the cycle's `MarketAlerts` slice.
#[derive(Debug, Clone)]
pub struct IndividualBatch {
    pub market_idx: usize,
    pub tokens: Vec<String>,
}

/// One per-recipient digest covering several markets.
#[derive(Debug, Clone)]
pub struct DigestPlan {
    pub user_id: UserId,
    pub token: String,
    pub market_idxs: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchPlan {
    pub individual: Vec<IndividualBatch>,
    pub digests: Vec<DigestPlan>,
}

/// Push capability plus the do-not-disturb clock check. DND windows are
/// wall-clock KST, the same clock message display times use. Excluded
/// recipients are never counted in any alarm-log `total_users`.
pub fn is_eligible(profile: &RecipientProfile, now: DateTime<Utc>) -> bool {
    if !profile.can_receive_push() {
        return false;
    }
    match &profile.dnd {
        Some(window) => {
            let local = now + Duration::hours(KST_OFFSET_HOURS);
            let minute_of_day = local.hour() * 60 + local.minute();
            let weekday = local.weekday().num_days_from_monday();
            !window.suppresses(minute_of_day, weekday)
        }
        None => true,
    }
}

/// Fan surviving alerts out to recipients and decide individual vs. digest
/// delivery per recipient.
///
/// `recipients[i]` is the interested, notification-enabled pool for
/// `alerting[i]`. A recipient holding `DIGEST_MIN_MARKETS` or more
/// alerting markets gets exactly one digest; below that, one individual
/// message per market, batched per market for multicast.
pub fn build_plan(
    alerting: &[MarketAlerts],
    recipients: &[Vec<RecipientProfile>],
    now: DateTime<Utc>,
) -> DispatchPlan {
    debug_assert_eq!(alerting.len(), recipients.len());

    // user → (token, alerting market indices); BTreeMap keeps the plan
    // deterministic for a given input.
    let mut buckets: BTreeMap<UserId, (String, Vec<usize>)> = BTreeMap::new();
    for (idx, pool) in recipients.iter().enumerate() {
        for profile in pool {
            if !is_eligible(profile, now) {
                continue;
            }
            let token = profile.push_token.clone().unwrap_or_default();
            let entry = buckets.entry(profile.user_id).or_insert_with(|| (token, Vec::new()));
            if !entry.1.contains(&idx) {
                entry.1.push(idx);
            }
        }
    }

    let mut individual_tokens: Vec<Vec<String>> = vec![Vec::new(); alerting.len()];
    let mut digests = Vec::new();

    for (user_id, (token, market_idxs)) in buckets {
        if market_idxs.len() >= DIGEST_MIN_MARKETS {
            digests.push(DigestPlan { user_id, token, market_idxs });
        } else {
            for idx in market_idxs {
                individual_tokens[idx].push(token.clone());
            }
        }
    }

    let individual = individual_tokens
        .into_iter()
        .enumerate()
        .filter(|(_, tokens)| !tokens.is_empty())
        .map(|(market_idx, tokens)| IndividualBatch { market_idx, tokens })
        .collect();

    DispatchPlan { individual, digests }
}
