use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::config::FETCH_CONCURRENCY;
use crate::db::models::AlarmLogEntry;
use crate::db::{AlarmLogStore, InterestRepository, MarketCatalog, RecipientDirectory};
use crate::engine::collapse::collapse;
use crate::engine::composer;
use crate::engine::evaluator::{self, Evaluation};
use crate::engine::planner::{self, MarketAlerts};
use crate::engine::thresholds::{self, ResolvedThresholds};
use crate::error::{AppError, Result};
use crate::gateway::NotificationGateway;
use crate::provider::ForecastProvider;
use crate::types::{
    AlertCategory, CycleSummary, ForecastSample, GridCoord, Market, MarketId, NewAlarmLog,
    RecipientProfile,
};

/// The alert evaluation and dispatch engine. All collaborators are
/// injected, so tests run the full cycle against in-memory fakes.
pub struct AlertEngine {
    provider: Arc<dyn ForecastProvider>,
    catalog: Arc<dyn MarketCatalog>,
    interests: Arc<dyn InterestRepository>,
    directory: Arc<dyn RecipientDirectory>,
    gateway: Arc<dyn NotificationGateway>,
    logs: Arc<dyn AlarmLogStore>,
    cycle_running: AtomicBool,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    total: u32,
    success: u32,
    failure: u32,
}

/// Releases the run-in-progress flag even on early return.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AlertEngine {
    pub fn new(
        provider: Arc<dyn ForecastProvider>,
        catalog: Arc<dyn MarketCatalog>,
        interests: Arc<dyn InterestRepository>,
        directory: Arc<dyn RecipientDirectory>,
        gateway: Arc<dyn NotificationGateway>,
        logs: Arc<dyn AlarmLogStore>,
    ) -> Self {
        Self {
            provider,
            catalog,
            interests,
            directory,
            gateway,
            logs,
            cycle_running: AtomicBool::new(false),
        }
    }

    pub async fn recent_logs(&self, limit: i64) -> Result<Vec<AlarmLogEntry>> {
        self.logs.recent(limit).await
    }

    /// One full evaluation cycle: collapse coordinates, fetch forecasts,
    /// classify, deduplicate, plan, dispatch, record. Never escalates
    /// per-market or per-coordinate failures — the summary is best-effort.
    pub async fn run_cycle(&self, lookahead_hours: i64) -> Result<CycleSummary> {
        // Cycles must not overlap: the dedup check is only race-free
        // within a single run (backstopped by the DB unique key).
        if self
            .cycle_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AppError::CycleInProgress);
        }
        let _guard = RunGuard(&self.cycle_running);

        let now = Utc::now();
        let mut summary = CycleSummary::default();

        let markets = self.catalog.active_markets().await?;
        info!("Evaluation cycle started: {} watched markets, {lookahead_hours}h horizon", markets.len());

        // Resolve thresholds up front; disabled markets cost nothing more.
        let mut resolved: HashMap<MarketId, ResolvedThresholds> = HashMap::new();
        let mut enabled = Vec::new();
        for market in markets {
            match thresholds::resolve(&market.overrides) {
                Some(th) => {
                    resolved.insert(market.id, th);
                    enabled.push(market);
                }
                None => summary.skipped_markets += 1,
            }
        }

        let groups = collapse(enabled);
        summary.unique_coordinates = groups.len() as u32;

        let forecasts = self.fetch_forecasts(groups.keys().copied()).await;

        // Classify and deduplicate per market.
        let mut alerting: Vec<MarketAlerts> = Vec::new();
        for (coord, cell_markets) in &groups {
            let samples = match forecasts.get(coord) {
                Some(samples) => samples,
                None => {
                    // fetch failed — skip the cell this cycle, retry next run
                    summary.failed_coordinates += 1;
                    continue;
                }
            };

            for market in cell_markets {
                let th = &resolved[&market.id];
                let set = match evaluator::evaluate(samples, th, now, lookahead_hours) {
                    Evaluation::Unavailable => {
                        summary.failed_coordinates += 1;
                        break; // no usable samples for the whole cell
                    }
                    Evaluation::Evaluated(set) => set,
                };
                summary.checked_markets += 1;
                if set.is_empty() {
                    continue;
                }

                let set = self.deduplicate(market, set).await;
                if !set.is_empty() {
                    alerting.push(MarketAlerts { market: market.clone(), alerts: set });
                }
            }
        }

        if alerting.is_empty() {
            info!(
                checked = summary.checked_markets,
                skipped = summary.skipped_markets,
                coordinates = summary.unique_coordinates,
                failed_coordinates = summary.failed_coordinates,
                "Evaluation cycle complete: no new alerts",
            );
            return Ok(summary);
        }

        // Recipient pools, one per alerting market.
        let mut pools: Vec<Vec<RecipientProfile>> = Vec::with_capacity(alerting.len());
        for ma in &alerting {
            pools.push(self.recipient_pool(ma.market.id).await);
        }

        let plan = planner::build_plan(&alerting, &pools, now);

        // Dispatch, tallying per (market, category) across every attempt —
        // digests count toward each constituent market.
        let mut tallies: HashMap<(usize, AlertCategory), Tally> = HashMap::new();

        for batch in &plan.individual {
            let ma = &alerting[batch.market_idx];
            let msg = composer::compose_individual(&ma.market, &ma.alerts, lookahead_hours);
            let outcome = self.gateway.send_many(&batch.tokens, &msg).await;
            summary.alerts_sent += outcome.success_count;
            for cat in ma.alerts.categories() {
                let t = tallies.entry((batch.market_idx, cat)).or_default();
                t.total += batch.tokens.len() as u32;
                t.success += outcome.success_count;
                t.failure += outcome.failure_count;
            }
        }

        for digest in &plan.digests {
            let constituents: Vec<&Market> =
                digest.market_idxs.iter().map(|&i| &alerting[i].market).collect();
            let msg = composer::compose_digest(&constituents, lookahead_hours);
            let ok = self.gateway.send_one(&digest.token, &msg).await;
            if ok {
                summary.alerts_sent += 1;
            }
            for &idx in &digest.market_idxs {
                for cat in alerting[idx].alerts.categories() {
                    let t = tallies.entry((idx, cat)).or_default();
                    t.total += 1;
                    if ok {
                        t.success += 1;
                    } else {
                        t.failure += 1;
                    }
                }
            }
        }

        // Audit trail: one row per (market, category) that reached anyone.
        for (idx, ma) in alerting.iter().enumerate() {
            for cat in ma.alerts.categories() {
                let Some(tally) = tallies.get(&(idx, cat)) else {
                    continue; // no eligible recipients — "no action", not an error
                };
                let occ = ma.alerts.first(cat).expect("non-empty category");
                let (title, body) = composer::compose_category(&ma.market, cat, occ, lookahead_hours);
                let log = NewAlarmLog {
                    market_id: ma.market.id,
                    category: cat,
                    title,
                    body,
                    total_users: tally.total,
                    success_count: tally.success,
                    failure_count: tally.failure,
                    measured_value: occ.value,
                    description: occ.description.clone(),
                    forecast_at: occ.at,
                    lookahead_hours,
                };
                match self.logs.record(&log).await {
                    Ok(true) => summary.log_rows_written += 1,
                    Ok(false) => warn!(
                        market_id = ma.market.id,
                        category = %cat,
                        "Alarm log row already present — concurrent cycle won the insert",
                    ),
                    Err(e) => warn!(
                        market_id = ma.market.id,
                        category = %cat,
                        "Alarm log write failed: {e}",
                    ),
                }
            }
        }

        info!(
            checked = summary.checked_markets,
            sent = summary.alerts_sent,
            skipped = summary.skipped_markets,
            coordinates = summary.unique_coordinates,
            failed_coordinates = summary.failed_coordinates,
            log_rows = summary.log_rows_written,
            "Evaluation cycle complete: {} markets checked, {} messages delivered",
            summary.checked_markets,
            summary.alerts_sent,
        );

        Ok(summary)
    }

    /// One fetch per unique coordinate, bounded concurrency. Failures are
    /// logged and leave the coordinate out of the result map.
    async fn fetch_forecasts(
        &self,
        coords: impl Iterator<Item = GridCoord>,
    ) -> HashMap<GridCoord, Vec<ForecastSample>> {
        let results: Vec<(GridCoord, Result<Vec<ForecastSample>>)> = stream::iter(coords)
            .map(|coord| async move { (coord, self.provider.get_forecast(coord).await) })
            .buffer_unordered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut forecasts = HashMap::new();
        for (coord, result) in results {
            match result {
                Ok(samples) => {
                    forecasts.insert(coord, samples);
                }
                Err(e) => warn!("Forecast fetch for {coord} failed: {e}"),
            }
        }
        forecasts
    }

    /// Drop categories already logged for the same (market, category,
    /// forecast timestamp) triple. A dedup query failure keeps the
    /// category — a duplicate beats a silently dropped alert.
    async fn deduplicate(
        &self,
        market: &Market,
        mut set: crate::types::AlertSet,
    ) -> crate::types::AlertSet {
        let mut drop = Vec::new();
        for cat in set.categories() {
            let occ = set.first(cat).expect("non-empty category");
            match self.logs.already_notified(market.id, cat, occ.at).await {
                Ok(true) => drop.push(cat),
                Ok(false) => {}
                Err(e) => warn!(
                    market_id = market.id,
                    category = %cat,
                    "Dedup lookup failed, keeping alert: {e}",
                ),
            }
        }
        set.retain_categories(|cat| !drop.contains(&cat));
        set
    }

    /// Interested, notification-enabled recipients for one market.
    /// Repository failures degrade to an empty pool — "no action".
    async fn recipient_pool(&self, market_id: MarketId) -> Vec<RecipientProfile> {
        let user_ids = match self.interests.interested_user_ids(market_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(market_id, "Interest lookup failed: {e}");
                return Vec::new();
            }
        };

        let mut pool = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            match self.directory.recipient(user_id).await {
                Ok(Some(profile)) => pool.push(profile),
                Ok(None) => {}
                Err(e) => warn!(user_id, "Recipient lookup failed: {e}"),
            }
        }
        pool
    }
}
