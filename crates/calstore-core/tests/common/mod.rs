//! Shared fixtures for calstore-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use calstore_core::{
    alarm::{AlarmAction, AlarmTrigger, AlarmTriggerStorage, RdbTriggerStore},
    config::AlarmConfig,
    ManualClock, Result,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tempfile::TempDir;

/// In-memory database; a single connection so every query sees the same data.
pub async fn memory_pool() -> Result<SqlitePool> {
    Ok(SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?)
}

/// File-backed database shared by several connections.
///
/// The returned directory must outlive the pool.
pub async fn file_pool(connections: u32) -> Result<(TempDir, SqlitePool)> {
    let dir = tempfile::tempdir()?;
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("calstore.db"))
        .create_if_missing(true)
        .busy_timeout(std::time::Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(connections)
        .connect_with(options)
        .await?;
    Ok((dir, pool))
}

pub async fn trigger_store(pool: SqlitePool, config: &AlarmConfig) -> Result<Arc<RdbTriggerStore>> {
    let store = RdbTriggerStore::new(pool, config);
    store.init_schema().await?;
    Ok(Arc::new(store))
}

/// Storage driven by a manual clock starting at `now`.
pub fn storage_at(
    store: &Arc<RdbTriggerStore>,
    config: AlarmConfig,
    now: i64,
) -> (AlarmTriggerStorage<RdbTriggerStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now));
    let storage = AlarmTriggerStorage::with_clock(Arc::clone(store), config, clock.clone());
    (storage, clock)
}

pub fn trigger(alarm_id: i32, trigger_time: i64, event_id: &str) -> AlarmTrigger {
    AlarmTrigger {
        alarm_id,
        action: AlarmAction::Display,
        trigger_time,
        event_id: event_id.to_string(),
        user_id: 3,
        recurrence_id: None,
    }
}

pub async fn processed(pool: &SqlitePool, cid: i32, account: i32, alarm: i32) -> Result<i64> {
    let (processed,): (i64,) = sqlx::query_as(
        "SELECT processed FROM calendar_alarm_trigger WHERE cid=? AND account=? AND alarm=?",
    )
    .bind(cid)
    .bind(account)
    .bind(alarm)
    .fetch_one(pool)
    .await?;
    Ok(processed)
}

/// Event, attendee and attachment tables the search statements run against.
pub async fn create_event_schema(pool: &SqlitePool) -> Result<()> {
    for ddl in [
        "CREATE TABLE calendar_event (
            cid INTEGER NOT NULL, account INTEGER NOT NULL, id INTEGER NOT NULL,
            uid TEXT, summary TEXT, location TEXT, description TEXT, categories TEXT,
            organizer TEXT, transp INTEGER, status TEXT, class TEXT,
            startDate INTEGER, endDate INTEGER, created INTEGER, timestamp INTEGER,
            createdBy INTEGER, folder INTEGER, series INTEGER, url TEXT, color TEXT,
            relatedTo TEXT, rangeFrom INTEGER, rangeUntil INTEGER,
            PRIMARY KEY (cid, account, id))",
        "CREATE TABLE calendar_attendee (
            cid INTEGER NOT NULL, account INTEGER NOT NULL, event INTEGER NOT NULL,
            entity INTEGER, uri TEXT, cn TEXT, folder INTEGER, partStat TEXT,
            cuType TEXT, role TEXT, hidden INTEGER)",
        "CREATE TABLE prg_attachment (
            cid INTEGER NOT NULL, attached INTEGER NOT NULL, filename TEXT)",
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct EventRow<'a> {
    pub id: i64,
    pub summary: &'a str,
    pub organizer: &'a str,
    pub transp: i64,
    pub folder: Option<i64>,
    pub start: i64,
}

pub async fn insert_event(pool: &SqlitePool, cid: i32, account: i32, row: EventRow<'_>) -> Result<()> {
    sqlx::query(
        "INSERT INTO calendar_event
         (cid, account, id, uid, summary, organizer, transp, folder, startDate, endDate,
          rangeFrom, rangeUntil)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(cid)
    .bind(account)
    .bind(row.id)
    .bind(format!("uid-{}", row.id))
    .bind(row.summary)
    .bind(row.organizer)
    .bind(row.transp)
    .bind(row.folder)
    .bind(row.start)
    .bind(row.start + 3_600_000)
    .bind(row.start)
    .bind(row.start + 3_600_000)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_attendee(
    pool: &SqlitePool,
    cid: i32,
    account: i32,
    event: i64,
    entity: Option<i64>,
    uri: &str,
    cn: &str,
    folder: Option<i64>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO calendar_attendee (cid, account, event, entity, uri, cn, folder)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(cid)
    .bind(account)
    .bind(event)
    .bind(entity)
    .bind(uri)
    .bind(cn)
    .bind(folder)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_attachment(pool: &SqlitePool, cid: i32, event: i64, filename: &str) -> Result<()> {
    sqlx::query("INSERT INTO prg_attachment (cid, attached, filename) VALUES (?, ?, ?)")
        .bind(cid)
        .bind(event)
        .bind(filename)
        .execute(pool)
        .await?;
    Ok(())
}
