//! Persistence boundary for alarm trigger rows.
//!
//! [`TriggerStore`] holds every statement the locking protocol needs; the
//! protocol itself lives in [`super::storage`]. [`RdbTriggerStore`] is the
//! `SQLite` implementation.

use std::{str::FromStr, time::Instant};

use async_trait::async_trait;
use itertools::Itertools;
use sqlx::{sqlite::SqliteArguments, SqlitePool};
use uuid::Uuid;

use super::types::{AlarmAction, AlarmKey, AlarmTrigger, ContextAndAccountId, TriggersByAccount};
use crate::{config::AlarmConfig, Error, Result};

/// Statements over the `calendar_alarm_trigger` table.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// `processed` stamp of a row, `None` if the row does not exist.
    async fn read_processed(&self, key: &AlarmKey) -> Result<Option<i64>>;

    /// Claim a row if its `processed` stamp still equals `observed`.
    ///
    /// Returns `true` iff exactly this call changed the row.
    async fn compare_and_claim(
        &self,
        key: &AlarmKey,
        observed: i64,
        now: i64,
        claim: Uuid,
    ) -> Result<bool>;

    /// Set `processed = now` on every row still holding the given claim.
    async fn refresh_claims(&self, claims: &[(AlarmKey, Uuid)], now: i64) -> Result<u64>;

    /// Reset rows to unprocessed and clear their claim.
    async fn drop_processing(&self, keys: &[AlarmKey]) -> Result<u64>;

    /// Triggers due before `until` that are unprocessed or whose lease went stale.
    async fn select_due_triggers(
        &self,
        actions: &[AlarmAction],
        until: i64,
        overdue: i64,
    ) -> Result<TriggersByAccount>;

    /// Unprocessed triggers of one event.
    async fn select_message_triggers(
        &self,
        owner: ContextAndAccountId,
        event_id: &str,
        actions: &[AlarmAction],
    ) -> Result<Vec<AlarmTrigger>>;

    async fn insert_triggers(
        &self,
        owner: ContextAndAccountId,
        triggers: &[AlarmTrigger],
    ) -> Result<u64>;

    async fn delete_triggers_for_events(
        &self,
        owner: ContextAndAccountId,
        event_ids: &[String],
    ) -> Result<u64>;
}

const TRIGGER_COLUMNS: &str =
    "cid, account, alarm, action, triggerDate, eventId, userId, recurrenceId";

#[derive(sqlx::FromRow)]
struct TriggerRow {
    cid: i32,
    account: i32,
    alarm: i32,
    action: String,
    #[sqlx(rename = "triggerDate")]
    trigger_date: i64,
    #[sqlx(rename = "eventId")]
    event_id: String,
    #[sqlx(rename = "userId")]
    user_id: i32,
    #[sqlx(rename = "recurrenceId")]
    recurrence_id: Option<String>,
}

impl TriggerRow {
    fn into_trigger(self) -> Result<(ContextAndAccountId, AlarmTrigger)> {
        let action = AlarmAction::from_str(&self.action).map_err(|_| {
            Error::parse_error(format!(
                "Unknown alarm action '{}' for alarm {}",
                self.action, self.alarm
            ))
        })?;
        Ok((
            ContextAndAccountId::new(self.cid, self.account),
            AlarmTrigger {
                alarm_id: self.alarm,
                action,
                trigger_time: self.trigger_date,
                event_id: self.event_id,
                user_id: self.user_id,
                recurrence_id: self.recurrence_id,
            },
        ))
    }
}

fn placeholders(count: usize) -> String {
    std::iter::repeat("?").take(count).join(", ")
}

fn tuple_placeholders(tuples: usize, arity: usize) -> String {
    let tuple = format!("({})", placeholders(arity));
    std::iter::repeat(tuple).take(tuples).join(", ")
}

fn log_statement(sql: &str, started: Instant) {
    tracing::trace!(
        sql,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Executed statement"
    );
}

/// `SQLite` backed [`TriggerStore`].
#[derive(Debug, Clone)]
pub struct RdbTriggerStore {
    db: SqlitePool,
    insert_chunk_size: usize,
    delete_chunk_size: usize,
}

impl RdbTriggerStore {
    #[must_use]
    pub fn new(db: SqlitePool, config: &AlarmConfig) -> Self {
        Self {
            db,
            insert_chunk_size: config.insert_chunk_size.max(1),
            delete_chunk_size: config.delete_chunk_size.max(1),
        }
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Create the trigger table if it does not exist.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS calendar_alarm_trigger (
                cid INTEGER NOT NULL,
                account INTEGER NOT NULL,
                alarm INTEGER NOT NULL,
                action TEXT NOT NULL,
                triggerDate INTEGER NOT NULL,
                eventId TEXT NOT NULL,
                userId INTEGER NOT NULL,
                recurrenceId TEXT,
                processed INTEGER NOT NULL DEFAULT 0,
                claim BLOB,
                PRIMARY KEY (cid, account, alarm)
            )",
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS calendar_alarm_trigger_due
             ON calendar_alarm_trigger (triggerDate, processed)",
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn execute<'q>(
        &self,
        sql: &str,
        query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
    ) -> Result<u64> {
        let started = Instant::now();
        let result = query.execute(&self.db).await?;
        log_statement(sql, started);
        Ok(result.rows_affected())
    }

    async fn fetch_triggers<'q>(
        &self,
        sql: &str,
        query: sqlx::query::QueryAs<'q, sqlx::Sqlite, TriggerRow, SqliteArguments<'q>>,
    ) -> Result<Vec<(ContextAndAccountId, AlarmTrigger)>> {
        let started = Instant::now();
        let rows = query.fetch_all(&self.db).await?;
        log_statement(sql, started);
        rows.into_iter().map(TriggerRow::into_trigger).collect()
    }
}

#[async_trait]
impl TriggerStore for RdbTriggerStore {
    async fn read_processed(&self, key: &AlarmKey) -> Result<Option<i64>> {
        let sql = "SELECT processed FROM calendar_alarm_trigger
                   WHERE cid = ? AND account = ? AND alarm = ?";
        let started = Instant::now();
        let processed: Option<(i64,)> = sqlx::query_as(sql)
            .bind(key.context_id)
            .bind(key.account_id)
            .bind(key.alarm_id)
            .fetch_optional(&self.db)
            .await?;
        log_statement(sql, started);
        Ok(processed.map(|(p,)| p))
    }

    async fn compare_and_claim(
        &self,
        key: &AlarmKey,
        observed: i64,
        now: i64,
        claim: Uuid,
    ) -> Result<bool> {
        let sql = "UPDATE calendar_alarm_trigger SET processed = ?, claim = ?
                   WHERE cid = ? AND account = ? AND alarm = ? AND processed = ?";
        let query = sqlx::query(sql)
            .bind(now)
            .bind(claim.as_bytes().to_vec())
            .bind(key.context_id)
            .bind(key.account_id)
            .bind(key.alarm_id)
            .bind(observed);
        Ok(self.execute(sql, query).await? == 1)
    }

    async fn refresh_claims(&self, claims: &[(AlarmKey, Uuid)], now: i64) -> Result<u64> {
        if claims.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE calendar_alarm_trigger SET processed = ?
             WHERE (cid, account, alarm, claim) IN (VALUES {})",
            tuple_placeholders(claims.len(), 4)
        );
        let query = claims.iter().fold(sqlx::query(&sql).bind(now), |q, (key, claim)| {
            q.bind(key.context_id)
                .bind(key.account_id)
                .bind(key.alarm_id)
                .bind(claim.as_bytes().to_vec())
        });
        self.execute(&sql, query).await
    }

    async fn drop_processing(&self, keys: &[AlarmKey]) -> Result<u64> {
        match keys {
            [] => Ok(0),
            [key] => {
                let sql = "UPDATE calendar_alarm_trigger SET processed = 0, claim = NULL
                           WHERE cid = ? AND account = ? AND alarm = ?";
                let query = sqlx::query(sql)
                    .bind(key.context_id)
                    .bind(key.account_id)
                    .bind(key.alarm_id);
                self.execute(sql, query).await
            }
            _ => {
                let sql = format!(
                    "UPDATE calendar_alarm_trigger SET processed = 0, claim = NULL
                     WHERE (cid, account, alarm) IN (VALUES {})",
                    tuple_placeholders(keys.len(), 3)
                );
                let query = keys.iter().fold(sqlx::query(&sql), |q, key| {
                    q.bind(key.context_id)
                        .bind(key.account_id)
                        .bind(key.alarm_id)
                });
                self.execute(&sql, query).await
            }
        }
    }

    async fn select_due_triggers(
        &self,
        actions: &[AlarmAction],
        until: i64,
        overdue: i64,
    ) -> Result<TriggersByAccount> {
        if actions.is_empty() {
            return Ok(TriggersByAccount::new());
        }
        let sql = format!(
            "SELECT {TRIGGER_COLUMNS} FROM calendar_alarm_trigger
             WHERE action IN ({}) AND triggerDate < ?
             AND (processed = 0 OR (triggerDate < ? AND processed < ?))
             ORDER BY cid, account, triggerDate, alarm",
            placeholders(actions.len())
        );
        let query = actions
            .iter()
            .fold(sqlx::query_as(&sql), |q, action| q.bind(action.to_string()))
            .bind(until)
            .bind(overdue)
            .bind(overdue);
        let rows = self.fetch_triggers(&sql, query).await?;
        Ok(rows
            .into_iter()
            .into_group_map_by(|(owner, _)| *owner)
            .into_iter()
            .map(|(owner, rows)| (owner, rows.into_iter().map(|(_, t)| t).collect()))
            .collect())
    }

    async fn select_message_triggers(
        &self,
        owner: ContextAndAccountId,
        event_id: &str,
        actions: &[AlarmAction],
    ) -> Result<Vec<AlarmTrigger>> {
        if actions.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {TRIGGER_COLUMNS} FROM calendar_alarm_trigger
             WHERE cid = ? AND account = ? AND action IN ({}) AND eventId = ? AND processed = 0
             ORDER BY triggerDate, alarm",
            placeholders(actions.len())
        );
        let query = actions
            .iter()
            .fold(
                sqlx::query_as(&sql).bind(owner.context_id).bind(owner.account_id),
                |q, action| q.bind(action.to_string()),
            )
            .bind(event_id);
        let rows = self.fetch_triggers(&sql, query).await?;
        Ok(rows.into_iter().map(|(_, trigger)| trigger).collect())
    }

    async fn insert_triggers(
        &self,
        owner: ContextAndAccountId,
        triggers: &[AlarmTrigger],
    ) -> Result<u64> {
        let mut inserted = 0;
        for chunk in triggers.chunks(self.insert_chunk_size) {
            let sql = format!(
                "INSERT INTO calendar_alarm_trigger ({TRIGGER_COLUMNS}) VALUES {}",
                tuple_placeholders(chunk.len(), 8)
            );
            let query = chunk.iter().fold(sqlx::query(&sql), |q, trigger| {
                q.bind(owner.context_id)
                    .bind(owner.account_id)
                    .bind(trigger.alarm_id)
                    .bind(trigger.action.to_string())
                    .bind(trigger.trigger_time)
                    .bind(trigger.event_id.as_str())
                    .bind(trigger.user_id)
                    .bind(trigger.recurrence_id.as_deref())
            });
            inserted += self.execute(&sql, query).await?;
        }
        Ok(inserted)
    }

    async fn delete_triggers_for_events(
        &self,
        owner: ContextAndAccountId,
        event_ids: &[String],
    ) -> Result<u64> {
        let mut deleted = 0;
        for chunk in event_ids.chunks(self.delete_chunk_size) {
            let sql = format!(
                "DELETE FROM calendar_alarm_trigger WHERE cid = ? AND account = ? AND eventId IN ({})",
                placeholders(chunk.len())
            );
            let query = chunk.iter().fold(
                sqlx::query(&sql).bind(owner.context_id).bind(owner.account_id),
                |q, event_id| q.bind(event_id.as_str()),
            );
            deleted += self.execute(&sql, query).await?;
        }
        Ok(deleted)
    }
}
