pub mod models;
pub mod store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{AlertCategory, Market, MarketId, NewAlarmLog, RecipientProfile, UserId};
use models::AlarmLogEntry;

/// Read-only view of the market catalog owned by the wider system.
#[async_trait]
pub trait MarketCatalog: Send + Sync {
    /// Active markets holding at least one active, notification-enabled
    /// interest. Markets nobody watches cost nothing.
    async fn active_markets(&self) -> Result<Vec<Market>>;
}

/// Read-only view of the (user, market) interest edges.
#[async_trait]
pub trait InterestRepository: Send + Sync {
    async fn interested_user_ids(&self, market_id: MarketId) -> Result<Vec<UserId>>;
}

/// Per-user push capability and do-not-disturb configuration.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn recipient(&self, user_id: UserId) -> Result<Option<RecipientProfile>>;
}

/// The alarm audit trail, doubling as the deduplication ledger.
#[async_trait]
pub trait AlarmLogStore: Send + Sync {
    async fn already_notified(
        &self,
        market_id: MarketId,
        category: AlertCategory,
        forecast_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Insert one audit row. Returns `false` when the
    /// (market, category, forecast_at) key already exists — a concurrent
    /// cycle won the race and the event is already logged.
    async fn record(&self, log: &NewAlarmLog) -> Result<bool>;

    async fn recent(&self, limit: i64) -> Result<Vec<AlarmLogEntry>>;
}
