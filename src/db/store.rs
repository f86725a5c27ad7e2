use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::models::{AlarmLogEntry, MarketRow, UserRow};
use crate::db::{AlarmLogStore, InterestRepository, MarketCatalog, RecipientDirectory};
use crate::error::Result;
use crate::types::{AlertCategory, Market, MarketId, NewAlarmLog, RecipientProfile, UserId};

/// SQLite-backed implementation of every repository seam. The engine only
/// ever sees the traits, so tests swap in fakes without a database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarketCatalog for SqliteStore {
    async fn active_markets(&self) -> Result<Vec<Market>> {
        let rows: Vec<MarketRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT
                m.id, m.name, m.nx, m.ny, m.is_active,
                m.alert_enabled, m.rain_probability_pct, m.high_temp_c, m.low_temp_c,
                m.wind_speed_ms, m.snow_amount_cm,
                m.rain_alerts, m.snow_alerts, m.temp_alerts, m.wind_alerts
            FROM markets m
            JOIN user_market_interests i
                ON i.market_id = m.id
               AND i.is_active = 1
               AND i.notification_enabled = 1
            WHERE m.is_active = 1
            ORDER BY m.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(MarketRow::into_market).collect())
    }
}

#[async_trait]
impl InterestRepository for SqliteStore {
    async fn interested_user_ids(&self, market_id: MarketId) -> Result<Vec<UserId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT user_id FROM user_market_interests
            WHERE market_id = ? AND is_active = 1 AND notification_enabled = 1
            ORDER BY user_id
            "#,
        )
        .bind(market_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl RecipientDirectory for SqliteStore {
    async fn recipient(&self, user_id: UserId) -> Result<Option<RecipientProfile>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, is_active, push_enabled, push_token,
                   dnd_enabled, dnd_all_day, dnd_start_min, dnd_end_min, dnd_days
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_profile))
    }
}

#[async_trait]
impl AlarmLogStore for SqliteStore {
    async fn already_notified(
        &self,
        market_id: MarketId,
        category: AlertCategory,
        forecast_at: DateTime<Utc>,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM alarm_logs WHERE market_id = ? AND category = ? AND forecast_at = ?",
        )
        .bind(market_id)
        .bind(category.as_str())
        .bind(forecast_at.timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn record(&self, log: &NewAlarmLog) -> Result<bool> {
        // ON CONFLICT DO NOTHING makes the dedup lookup-then-insert
        // effectively atomic: a concurrent cycle that raced past
        // already_notified() lands here and affects zero rows.
        let result = sqlx::query(
            r#"
            INSERT INTO alarm_logs (
                market_id, category, title, body,
                total_users, success_count, failure_count,
                measured_value, description, forecast_at, lookahead_hours, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (market_id, category, forecast_at) DO NOTHING
            "#,
        )
        .bind(log.market_id)
        .bind(log.category.as_str())
        .bind(&log.title)
        .bind(&log.body)
        .bind(log.total_users as i64)
        .bind(log.success_count as i64)
        .bind(log.failure_count as i64)
        .bind(log.measured_value)
        .bind(&log.description)
        .bind(log.forecast_at.timestamp())
        .bind(log.lookahead_hours)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AlarmLogEntry>> {
        let rows: Vec<AlarmLogEntry> = sqlx::query_as(
            r#"
            SELECT id, market_id, category, title, body,
                   total_users, success_count, failure_count,
                   measured_value, description, forecast_at, lookahead_hours, created_at
            FROM alarm_logs
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn store() -> SqliteStore {
        // in-memory SQLite is per-connection; a one-connection pool keeps
        // migrations and queries on the same database
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    async fn seed_market(store: &SqliteStore, id: i64, name: &str, nx: i64, ny: i64) {
        sqlx::query("INSERT INTO markets (id, name, nx, ny, is_active, created_at) VALUES (?, ?, ?, ?, 1, 0)")
            .bind(id)
            .bind(name)
            .bind(nx)
            .bind(ny)
            .execute(&store.pool)
            .await
            .unwrap();
    }

    async fn seed_user(store: &SqliteStore, id: i64, token: Option<&str>) {
        sqlx::query(
            "INSERT INTO users (id, name, is_active, push_enabled, push_token, created_at) VALUES (?, ?, 1, 1, ?, 0)",
        )
        .bind(id)
        .bind(format!("user {id}"))
        .bind(token)
        .execute(&store.pool)
        .await
        .unwrap();
    }

    async fn seed_interest(store: &SqliteStore, user_id: i64, market_id: i64, enabled: bool) {
        sqlx::query(
            "INSERT INTO user_market_interests (user_id, market_id, is_active, notification_enabled, created_at) VALUES (?, ?, 1, ?, 0)",
        )
        .bind(user_id)
        .bind(market_id)
        .bind(enabled as i64)
        .execute(&store.pool)
        .await
        .unwrap();
    }

    fn log(market_id: i64, category: AlertCategory) -> NewAlarmLog {
        NewAlarmLog {
            market_id,
            category,
            title: "t".into(),
            body: "b".into(),
            total_users: 3,
            success_count: 2,
            failure_count: 1,
            measured_value: 34.0,
            description: "high of 34.0°C".into(),
            forecast_at: Utc.with_ymd_and_hms(2026, 8, 25, 15, 0, 0).unwrap(),
            lookahead_hours: 24,
        }
    }

    #[tokio::test]
    async fn only_markets_with_enabled_interests_qualify() {
        let s = store().await;
        seed_market(&s, 1, "Central Market", 60, 127).await;
        seed_market(&s, 2, "Quiet Market", 61, 128).await;
        seed_market(&s, 3, "Muted Market", 62, 129).await;
        seed_user(&s, 10, Some("tok")).await;
        seed_interest(&s, 10, 1, true).await;
        seed_interest(&s, 10, 3, false).await;

        let markets = s.active_markets().await.unwrap();
        assert_eq!(markets.len(), 1);
        assert_eq!(markets[0].id, 1);
        assert_eq!(markets[0].coord.nx, 60);
    }

    #[tokio::test]
    async fn threshold_overrides_round_trip_as_options() {
        let s = store().await;
        seed_market(&s, 1, "Central Market", 60, 127).await;
        sqlx::query("UPDATE markets SET high_temp_c = 35.0, rain_alerts = 0 WHERE id = 1")
            .execute(&s.pool)
            .await
            .unwrap();
        seed_user(&s, 10, Some("tok")).await;
        seed_interest(&s, 10, 1, true).await;

        let market = s.active_markets().await.unwrap().remove(0);
        assert_eq!(market.overrides.high_temp_c, Some(35.0));
        assert_eq!(market.overrides.rain_alerts, Some(false));
        assert_eq!(market.overrides.low_temp_c, None);
        assert_eq!(market.overrides.enabled, None);
    }

    #[tokio::test]
    async fn recipient_dnd_mapping() {
        let s = store().await;
        seed_user(&s, 10, Some("tok")).await;
        sqlx::query(
            "UPDATE users SET dnd_enabled = 1, dnd_start_min = 1320, dnd_end_min = 480, dnd_days = '5,6' WHERE id = 10",
        )
        .execute(&s.pool)
        .await
        .unwrap();

        let profile = s.recipient(10).await.unwrap().unwrap();
        let dnd = profile.dnd.unwrap();
        assert!(!dnd.all_day);
        assert_eq!(dnd.start_min, 1320);
        assert_eq!(dnd.end_min, 480);
        assert_eq!(dnd.days, Some(vec![5, 6]));

        assert!(s.recipient(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dedup_ledger_round_trip() {
        let s = store().await;
        seed_market(&s, 1, "Central Market", 60, 127).await;

        let entry = log(1, AlertCategory::HighTemp);
        assert!(!s
            .already_notified(1, AlertCategory::HighTemp, entry.forecast_at)
            .await
            .unwrap());

        assert!(s.record(&entry).await.unwrap());
        assert!(s
            .already_notified(1, AlertCategory::HighTemp, entry.forecast_at)
            .await
            .unwrap());

        // same key again — the unique constraint swallows the duplicate
        assert!(!s.record(&entry).await.unwrap());

        // a different category or forecast slot is a fresh event
        assert!(s.record(&log(1, AlertCategory::Rain)).await.unwrap());
        let mut later = log(1, AlertCategory::HighTemp);
        later.forecast_at = later.forecast_at + chrono::Duration::hours(3);
        assert!(s.record(&later).await.unwrap());
    }

    #[tokio::test]
    async fn recent_returns_accounting_columns() {
        let s = store().await;
        seed_market(&s, 1, "Central Market", 60, 127).await;
        s.record(&log(1, AlertCategory::HighTemp)).await.unwrap();

        let rows = s.recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.category, "high_temp");
        assert_eq!(row.total_users, row.success_count + row.failure_count);
        assert_eq!(row.lookahead_hours, 24);
    }

    #[tokio::test]
    async fn interested_user_ids_respect_flags() {
        let s = store().await;
        seed_market(&s, 1, "Central Market", 60, 127).await;
        seed_user(&s, 10, Some("tok")).await;
        seed_user(&s, 11, Some("tok2")).await;
        seed_interest(&s, 10, 1, true).await;
        seed_interest(&s, 11, 1, false).await;

        let ids = s.interested_user_ids(1).await.unwrap();
        assert_eq!(ids, vec![10]);
    }
}
