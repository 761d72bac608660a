//! Command handlers.
//!
//! Every handler prints JSON to stdout; diagnostics go through `tracing`.

use std::{io::Read, str::FromStr, sync::Arc};

use anyhow::{Context, Result};
use calstore_core::{
    alarm::{
        AlarmAction, AlarmKey, AlarmTriggerStorage, ContextAndAccountId, LockedTriggersByAccount,
        RdbTriggerStore,
    },
    config::{load_config, load_config_from},
    search::{SearchCompiler, SearchTerm},
    Config,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::cli::{Cli, Command};

/// One listed trigger with its owner and claim.
#[derive(Debug, Serialize)]
struct TriggerOutput {
    context_id: i32,
    account_id: i32,
    #[serde(flatten)]
    trigger: calstore_core::alarm::AlarmTrigger,
    #[serde(skip_serializing_if = "Option::is_none")]
    claim: Option<String>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    tracing::debug!(database_url = %config.database_url, "Loaded configuration");

    match cli.command {
        Command::Init => handle_init(&config).await,
        Command::Due {
            until,
            overdue,
            actions,
            lock,
        } => handle_due(&config, &until, overdue.as_deref(), &actions, lock).await,
        Command::Release {
            context,
            account,
            alarms,
        } => handle_release(&config, ContextAndAccountId::new(context, account), &alarms).await,
        Command::Compile { context, term } => handle_compile(&config, context, &term),
    }
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(match &cli.database_url {
        Some(url) => Config {
            database_url: url.clone(),
            ..config
        },
        None => config,
    })
}

async fn connect(config: &Config) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .with_context(|| format!("Invalid database URL '{}'", config.database_url))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .map_err(calstore_core::Error::from)?;
    Ok(pool)
}

async fn open_store(config: &Config) -> Result<Arc<RdbTriggerStore>> {
    let pool = connect(config).await?;
    Ok(Arc::new(RdbTriggerStore::new(pool, &config.alarm)))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    #[allow(clippy::print_stdout)]
    {
        println!("{json}");
    }
    Ok(())
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    if value.eq_ignore_ascii_case("now") {
        return Ok(Utc::now());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| calstore_core::Error::parse_error(format!("Invalid timestamp '{value}': {e}")).into())
}

// ═══════════════════════════════════════════════════════════════════════════
// ALARM COMMANDS
// ═══════════════════════════════════════════════════════════════════════════

async fn handle_init(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    store.init_schema().await?;
    tracing::info!(database_url = %config.database_url, "Alarm trigger table ready");
    print_json(&serde_json::json!({ "initialized": true }))
}

async fn handle_due(
    config: &Config,
    until: &str,
    overdue: Option<&str>,
    actions: &[AlarmAction],
    lock: bool,
) -> Result<()> {
    let until = parse_instant(until)?;
    let overdue = overdue.map(parse_instant).transpose()?;
    let storage = AlarmTriggerStorage::new(open_store(config).await?, config.alarm.clone());

    let locked = storage
        .get_and_lock_triggers(Some(until), overdue, lock, actions)
        .await?;
    let output = flatten(&locked);
    tracing::info!(count = output.len(), lock, "Selected due alarm triggers");

    // The process exits right away, so nobody would refresh the leases.
    // Claimed rows stay claimed until released or expired.
    let stopped = storage.shutdown().await;
    tracing::debug!(stopped, "Stopped lease refreshers");
    print_json(&output)
}

fn flatten(locked: &LockedTriggersByAccount) -> Vec<TriggerOutput> {
    locked
        .iter()
        .flat_map(|(owner, triggers)| {
            triggers.iter().map(move |locked| TriggerOutput {
                context_id: owner.context_id,
                account_id: owner.account_id,
                trigger: locked.trigger.clone(),
                claim: locked.claim.map(|claim| claim.to_string()),
            })
        })
        .collect()
}

async fn handle_release(config: &Config, owner: ContextAndAccountId, alarms: &[i32]) -> Result<()> {
    let storage = AlarmTriggerStorage::new(open_store(config).await?, config.alarm.clone());
    let keys: Vec<AlarmKey> = alarms.iter().map(|alarm| owner.alarm(*alarm)).collect();
    let dropped = storage.drop_processing_status(&keys).await?;
    tracing::info!(
        context_id = owner.context_id,
        account_id = owner.account_id,
        requested = keys.len(),
        dropped,
        "Released alarm triggers"
    );
    print_json(&serde_json::json!({ "requested": keys.len(), "dropped": dropped }))
}

// ═══════════════════════════════════════════════════════════════════════════
// SEARCH COMMANDS
// ═══════════════════════════════════════════════════════════════════════════

fn read_term(source: &str) -> Result<String> {
    if source != "-" {
        return Ok(source.to_string());
    }
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .map_err(calstore_core::Error::from)?;
    Ok(buffer)
}

fn handle_compile(config: &Config, context: i32, source: &str) -> Result<()> {
    let json = read_term(source)?;
    let term: SearchTerm = serde_json::from_str(&json).map_err(calstore_core::Error::from)?;
    let compiled = SearchCompiler::from_config(context, &config.search).compile(Some(&term))?;
    print_json(&compiled)
}

#[cfg(test)]
mod tests {
    use calstore_core::alarm::AlarmTrigger;

    use super::*;

    #[test]
    fn parses_now_and_rfc3339() -> Result<()> {
        let before = Utc::now();
        assert!(parse_instant("NOW")? >= before);
        let at = parse_instant("2024-05-01T10:00:00+02:00")?;
        assert_eq!(at.timestamp_millis(), 1_714_550_400_000);
        Ok(())
    }

    #[test]
    fn invalid_instant_maps_to_parse_error() {
        let err = parse_instant("yesterday").err();
        let is_parse = err
            .as_ref()
            .and_then(|e| e.downcast_ref::<calstore_core::Error>())
            .is_some_and(|e| matches!(e, calstore_core::Error::Parse(_)));
        assert!(is_parse);
    }

    #[test]
    fn trigger_output_is_flat() -> Result<()> {
        let output = TriggerOutput {
            context_id: 1,
            account_id: 2,
            trigger: AlarmTrigger {
                alarm_id: 3,
                action: AlarmAction::Display,
                trigger_time: 4,
                event_id: "5".to_string(),
                user_id: 6,
                recurrence_id: None,
            },
            claim: None,
        };
        let value = serde_json::to_value(&output)?;
        assert_eq!(value["alarm_id"], 3);
        assert_eq!(value["action"], "DISPLAY");
        assert!(value.get("claim").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn init_due_and_release_against_file_database() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = Config {
            database_url: format!("sqlite://{}", dir.path().join("cli.db").display()),
            ..Config::default()
        };
        handle_init(&config).await?;

        let store = open_store(&config).await?;
        let owner = ContextAndAccountId::new(1, 0);
        calstore_core::alarm::TriggerStore::insert_triggers(
            store.as_ref(),
            owner,
            &[AlarmTrigger {
                alarm_id: 9,
                action: AlarmAction::Display,
                trigger_time: 1,
                event_id: "e".to_string(),
                user_id: 1,
                recurrence_id: None,
            }],
        )
        .await?;

        handle_due(&config, "now", None, &[AlarmAction::Display], true).await?;
        let claimed = calstore_core::alarm::TriggerStore::read_processed(store.as_ref(), &owner.alarm(9)).await?;
        assert!(claimed.is_some_and(|processed| processed > 0));

        handle_release(&config, owner, &[9]).await?;
        let released = calstore_core::alarm::TriggerStore::read_processed(store.as_ref(), &owner.alarm(9)).await?;
        assert_eq!(released, Some(0));
        Ok(())
    }
}
