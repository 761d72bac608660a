//! Claim-based processing locks on alarm triggers.
//!
//! Several scheduler processes may poll the same trigger table. A trigger is
//! processed by whoever manages to claim it:
//!
//! 1. read the row's `processed` stamp,
//! 2. give up if the stamp is set and younger than the lock expiry threshold,
//! 3. otherwise `UPDATE` the row guarded by the stamp read in step 1.
//!
//! The guarded update is the only mutual exclusion; there is no in-process
//! mutex. Claims are kept alive by a lease refresher until released, and a
//! claim whose refresher died is taken over once its lease expires.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;
use uuid::Uuid;

use super::{
    refresher::{spawn_refresher, RefreshSettings},
    registry::{AcquiredLock, RefreshRegistry},
    store::TriggerStore,
    types::{
        AlarmAction, AlarmKey, ContextAndAccountId, LockedAlarmTrigger, LockedTriggersByAccount,
        TriggersByAccount,
    },
};
use crate::{
    clock::{Clock, SystemClock},
    config::AlarmConfig,
    taskregistry::TaskRegistry,
    Result,
};

/// Alarm trigger storage with claim locking.
#[derive(Debug)]
pub struct AlarmTriggerStorage<S: ?Sized> {
    store: Arc<S>,
    config: AlarmConfig,
    clock: Arc<dyn Clock>,
    refreshers: TaskRegistry,
}

impl<S> AlarmTriggerStorage<S>
where
    S: TriggerStore + ?Sized + 'static,
{
    #[must_use]
    pub fn new(store: Arc<S>, config: AlarmConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(store: Arc<S>, config: AlarmConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
            refreshers: TaskRegistry::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Try to claim one trigger.
    ///
    /// Returns the new claim token, or `None` when the row is gone, still
    /// leased by someone else, or changed between read and update. A lock is
    /// considered expired when its `processed` stamp is older than
    /// `lock_expired_time`, which defaults to `now - overdue_wait_ms`.
    pub async fn acquire_processing_lock(
        &self,
        owner: ContextAndAccountId,
        alarm_id: i32,
        lock_expired_time: Option<i64>,
    ) -> Result<Option<Uuid>> {
        let key = owner.alarm(alarm_id);
        let Some(processed) = self.store.read_processed(&key).await? else {
            tracing::debug!(
                context_id = key.context_id,
                account_id = key.account_id,
                alarm_id,
                "Alarm trigger vanished before it could be claimed"
            );
            return Ok(None);
        };

        let now = self.clock.now_millis();
        let threshold =
            lock_expired_time.unwrap_or_else(|| now - self.config.overdue_wait_millis());
        if processed != 0 && processed >= threshold {
            tracing::debug!(
                context_id = key.context_id,
                account_id = key.account_id,
                alarm_id,
                processed,
                threshold,
                "Alarm trigger is claimed by someone else"
            );
            return Ok(None);
        }

        let claim = Uuid::new_v4();
        let acquired = self
            .store
            .compare_and_claim(&key, processed, now, claim)
            .await?;
        tracing::debug!(
            context_id = key.context_id,
            account_id = key.account_id,
            alarm_id,
            acquired,
            "Attempted to claim alarm trigger"
        );
        Ok(acquired.then_some(claim))
    }

    /// Claim a batch of triggers.
    ///
    /// With `lock == false` nothing is written and every trigger comes back
    /// unclaimed. Otherwise only the triggers that could be claimed are
    /// returned, and one lease refresher is started for the batch on its
    /// first successful claim.
    ///
    /// If a claim attempt fails, every claim already taken by this call is
    /// released and the refresher is cancelled before the error is returned.
    /// Rows written so far keep their claim until the lease expires.
    pub async fn yield_locked_triggers_for(
        &self,
        triggers: TriggersByAccount,
        lock: bool,
        lock_expired_time: Option<i64>,
    ) -> Result<LockedTriggersByAccount> {
        if !lock {
            return Ok(triggers
                .into_iter()
                .map(|(owner, list)| {
                    (owner, list.into_iter().map(LockedAlarmTrigger::unlocked).collect())
                })
                .collect());
        }
        self.lock_batch(triggers, lock_expired_time, RefreshRegistry::new())
            .await
    }

    pub(crate) async fn lock_batch(
        &self,
        triggers: TriggersByAccount,
        lock_expired_time: Option<i64>,
        registry: RefreshRegistry,
    ) -> Result<LockedTriggersByAccount> {
        let Some(representative) = triggers.keys().next().map(|owner| owner.context_id) else {
            return Ok(LockedTriggersByAccount::new());
        };

        let mut locked = LockedTriggersByAccount::new();
        let mut refresher: Option<AbortHandle> = None;

        for (owner, list) in triggers {
            for trigger in list {
                let outcome = self
                    .acquire_processing_lock(owner, trigger.alarm_id, lock_expired_time)
                    .await;
                let claim = match outcome {
                    Ok(Some(claim)) => claim,
                    Ok(None) => continue,
                    Err(e) => {
                        release_batch(&mut locked, refresher.as_ref());
                        tracing::warn!(
                            context_id = owner.context_id,
                            account_id = owner.account_id,
                            alarm_id = trigger.alarm_id,
                            error = %e,
                            "Claiming alarm triggers failed, released batch"
                        );
                        return Err(e);
                    }
                };

                let key = owner.alarm(trigger.alarm_id);
                registry.insert(key, claim);
                if refresher.is_none() {
                    refresher = Some(self.start_refresher(representative, &registry).await);
                }
                locked.entry(owner).or_default().push(LockedAlarmTrigger::new(
                    trigger,
                    Some(claim),
                    AcquiredLock::registered(registry.clone(), key),
                ));
            }
        }

        tracing::debug!(
            context_id = representative,
            acquired = registry.len(),
            "Claimed alarm trigger batch"
        );
        Ok(locked)
    }

    async fn start_refresher(&self, context_id: i32, registry: &RefreshRegistry) -> AbortHandle {
        let handle = spawn_refresher(
            Arc::clone(&self.store),
            registry.clone(),
            Arc::clone(&self.clock),
            RefreshSettings {
                context_id,
                interval: self.config.refresh_interval(),
                chunk_size: self.config.refresh_chunk_size,
            },
        );
        let abort = handle.abort_handle();
        self.refreshers.register(abort.clone()).await;
        tracing::debug!(context_id, "Started lease refresher");
        abort
    }

    /// Select due triggers and claim them.
    ///
    /// Triggers are due when their time lies before `until` and they are
    /// either unprocessed or their lease is older than `overdue` (default
    /// `now - overdue_wait_ms`). Nothing is selected without `until` or
    /// without actions.
    pub async fn get_and_lock_triggers(
        &self,
        until: Option<DateTime<Utc>>,
        overdue: Option<DateTime<Utc>>,
        lock: bool,
        actions: &[AlarmAction],
    ) -> Result<LockedTriggersByAccount> {
        let Some(until) = until else {
            return Ok(LockedTriggersByAccount::new());
        };
        if actions.is_empty() {
            return Ok(LockedTriggersByAccount::new());
        }

        let overdue = overdue.map_or_else(
            || self.clock.now_millis() - self.config.overdue_wait_millis(),
            |at| at.timestamp_millis(),
        );
        let due = self
            .store
            .select_due_triggers(actions, until.timestamp_millis(), overdue)
            .await?;
        if due.is_empty() {
            return Ok(LockedTriggersByAccount::new());
        }
        self.yield_locked_triggers_for(due, lock, Some(overdue))
            .await
    }

    /// Unprocessed triggers of one event, claimed with the default lease window.
    pub async fn get_message_alarm_triggers(
        &self,
        owner: ContextAndAccountId,
        event_id: &str,
        lock: bool,
        actions: &[AlarmAction],
    ) -> Result<LockedTriggersByAccount> {
        let triggers = self
            .store
            .select_message_triggers(owner, event_id, actions)
            .await?;
        if triggers.is_empty() {
            return Ok(LockedTriggersByAccount::new());
        }
        let batch = TriggersByAccount::from([(owner, triggers)]);
        self.yield_locked_triggers_for(batch, lock, None).await
    }

    /// Hand processed triggers back: `processed = 0`, no claim.
    ///
    /// Returns the number of rows reset.
    pub async fn drop_processing_status(&self, keys: &[AlarmKey]) -> Result<u64> {
        let mut dropped = 0;
        for chunk in keys.chunks(self.config.drop_chunk_size.max(1)) {
            dropped += self.store.drop_processing(chunk).await?;
        }
        tracing::debug!(
            requested = keys.len(),
            dropped,
            "Dropped alarm trigger processing status"
        );
        Ok(dropped)
    }

    /// Number of lease refreshers still running.
    pub async fn active_refreshers(&self) -> usize {
        self.refreshers.active_count().await
    }

    /// Abort all lease refreshers. Claims stay in the table until they expire.
    pub async fn shutdown(&self) -> usize {
        let aborted = self.refreshers.shutdown_all().await;
        if aborted > 0 {
            tracing::info!(aborted, "Stopped lease refreshers");
        }
        aborted
    }
}

fn release_batch(locked: &mut LockedTriggersByAccount, refresher: Option<&AbortHandle>) {
    if let Some(refresher) = refresher {
        refresher.abort();
    }
    locked.values_mut().flatten().for_each(LockedAlarmTrigger::unlock);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::{
        alarm::{store::RdbTriggerStore, types::AlarmTrigger},
        clock::ManualClock,
        Error,
    };

    /// Real store whose `read_processed` fails on the n-th call (1-based).
    struct FailingStore {
        inner: RdbTriggerStore,
        fail_on: usize,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl TriggerStore for FailingStore {
        async fn read_processed(&self, key: &AlarmKey) -> Result<Option<i64>> {
            if self.reads.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(Error::database_error("injected failure"));
            }
            self.inner.read_processed(key).await
        }

        async fn compare_and_claim(
            &self,
            key: &AlarmKey,
            observed: i64,
            now: i64,
            claim: Uuid,
        ) -> Result<bool> {
            self.inner.compare_and_claim(key, observed, now, claim).await
        }

        async fn refresh_claims(&self, claims: &[(AlarmKey, Uuid)], now: i64) -> Result<u64> {
            self.inner.refresh_claims(claims, now).await
        }

        async fn drop_processing(&self, keys: &[AlarmKey]) -> Result<u64> {
            self.inner.drop_processing(keys).await
        }

        async fn select_due_triggers(
            &self,
            actions: &[AlarmAction],
            until: i64,
            overdue: i64,
        ) -> Result<TriggersByAccount> {
            self.inner.select_due_triggers(actions, until, overdue).await
        }

        async fn select_message_triggers(
            &self,
            owner: ContextAndAccountId,
            event_id: &str,
            actions: &[AlarmAction],
        ) -> Result<Vec<AlarmTrigger>> {
            self.inner
                .select_message_triggers(owner, event_id, actions)
                .await
        }

        async fn insert_triggers(
            &self,
            owner: ContextAndAccountId,
            triggers: &[AlarmTrigger],
        ) -> Result<u64> {
            self.inner.insert_triggers(owner, triggers).await
        }

        async fn delete_triggers_for_events(
            &self,
            owner: ContextAndAccountId,
            event_ids: &[String],
        ) -> Result<u64> {
            self.inner.delete_triggers_for_events(owner, event_ids).await
        }
    }

    fn trigger(alarm_id: i32) -> AlarmTrigger {
        AlarmTrigger {
            alarm_id,
            action: AlarmAction::Display,
            trigger_time: 100,
            event_id: "7".to_string(),
            user_id: 3,
            recurrence_id: None,
        }
    }

    async fn failing_storage(
        fail_on: usize,
        triggers: &[AlarmTrigger],
    ) -> Result<AlarmTriggerStorage<FailingStore>> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let inner = RdbTriggerStore::new(pool, &AlarmConfig::default());
        inner.init_schema().await?;
        inner
            .insert_triggers(ContextAndAccountId::new(1, 0), triggers)
            .await?;
        let store = FailingStore {
            inner,
            fail_on,
            reads: AtomicUsize::new(0),
        };
        Ok(AlarmTriggerStorage::with_clock(
            Arc::new(store),
            AlarmConfig::default(),
            Arc::new(ManualClock::new(1_000_000)),
        ))
    }

    #[tokio::test]
    async fn failed_batch_releases_every_claim_and_cancels_refresher() -> Result<()> {
        let triggers: Vec<_> = (1..=4).map(trigger).collect();
        let storage = failing_storage(3, &triggers).await?;
        let registry = RefreshRegistry::new();
        let batch = TriggersByAccount::from([(ContextAndAccountId::new(1, 0), triggers)]);

        let result = storage.lock_batch(batch, None, registry.clone()).await;

        assert!(matches!(result, Err(Error::Database(_))));
        assert!(registry.is_empty());
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(storage.active_refreshers().await, 0);

        // Rows claimed before the failure stay claimed in the table.
        let owner = ContextAndAccountId::new(1, 0);
        assert_eq!(
            storage.store().inner.read_processed(&owner.alarm(1)).await?,
            Some(1_000_000)
        );
        assert_eq!(storage.store().inner.read_processed(&owner.alarm(3)).await?, Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn failure_on_first_claim_starts_no_refresher() -> Result<()> {
        let storage = failing_storage(1, &[trigger(1)]).await?;
        let batch = TriggersByAccount::from([(ContextAndAccountId::new(1, 0), vec![trigger(1)])]);

        let result = storage.yield_locked_triggers_for(batch, true, None).await;

        assert!(result.is_err());
        assert_eq!(storage.active_refreshers().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn successful_batch_keeps_one_refresher_until_released() -> Result<()> {
        let triggers: Vec<_> = (1..=3).map(trigger).collect();
        let storage = failing_storage(usize::MAX, &triggers).await?;
        let registry = RefreshRegistry::new();
        let batch = TriggersByAccount::from([(ContextAndAccountId::new(1, 0), triggers)]);

        let mut locked = storage.lock_batch(batch, None, registry.clone()).await?;

        assert_eq!(registry.len(), 3);
        assert_eq!(storage.active_refreshers().await, 1);
        for trigger in locked.values_mut().flatten() {
            assert!(trigger.is_locked());
            trigger.unlock();
        }
        assert!(registry.is_empty());

        assert_eq!(storage.shutdown().await, 1);
        assert_eq!(storage.active_refreshers().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn empty_real_batch_is_empty() -> Result<()> {
        let storage = failing_storage(usize::MAX, &[]).await?;
        let locked = storage
            .yield_locked_triggers_for(TriggersByAccount::new(), true, None)
            .await?;
        assert!(locked.is_empty());
        assert_eq!(storage.active_refreshers().await, 0);
        Ok(())
    }
}
