//! Alarm trigger value types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::registry::AcquiredLock;

/// What happens when an alarm fires.
///
/// Stored in the trigger table as its upper-case code.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum AlarmAction {
    Display,
    Audio,
    Email,
    Sms,
    Procedure,
}

/// Context and calendar account owning a set of triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextAndAccountId {
    pub context_id: i32,
    pub account_id: i32,
}

impl ContextAndAccountId {
    #[must_use]
    pub const fn new(context_id: i32, account_id: i32) -> Self {
        Self {
            context_id,
            account_id,
        }
    }

    #[must_use]
    pub const fn alarm(self, alarm_id: i32) -> AlarmKey {
        AlarmKey {
            context_id: self.context_id,
            account_id: self.account_id,
            alarm_id,
        }
    }
}

/// Primary key of a trigger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlarmKey {
    pub context_id: i32,
    pub account_id: i32,
    pub alarm_id: i32,
}

impl AlarmKey {
    #[must_use]
    pub const fn owner(self) -> ContextAndAccountId {
        ContextAndAccountId::new(self.context_id, self.account_id)
    }
}

/// A persisted alarm trigger, without its locking columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmTrigger {
    pub alarm_id: i32,
    pub action: AlarmAction,
    /// Epoch milliseconds at which the alarm is due.
    pub trigger_time: i64,
    pub event_id: String,
    pub user_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_id: Option<String>,
}

/// A trigger handed out by batch acquisition, together with its lock.
///
/// Triggers from a dry run carry no claim and a no-op lock. Dropping the value
/// releases the lock.
#[derive(Debug)]
pub struct LockedAlarmTrigger {
    pub trigger: AlarmTrigger,
    pub claim: Option<uuid::Uuid>,
    lock: AcquiredLock,
}

impl LockedAlarmTrigger {
    pub(crate) fn new(trigger: AlarmTrigger, claim: Option<uuid::Uuid>, lock: AcquiredLock) -> Self {
        Self {
            trigger,
            claim,
            lock,
        }
    }

    /// Wrap a trigger without claiming it.
    #[must_use]
    pub fn unlocked(trigger: AlarmTrigger) -> Self {
        Self::new(trigger, None, AcquiredLock::noop())
    }

    /// Whether this trigger holds a live claim.
    pub fn is_locked(&self) -> bool {
        self.claim.is_some() && self.lock.is_held()
    }

    /// Stop refreshing the claim. Idempotent.
    ///
    /// The row itself keeps its claim until the lease expires or
    /// processing status is dropped.
    pub fn unlock(&mut self) {
        self.lock.release();
    }
}

/// Triggers grouped by owner, ordered by context then account.
pub type TriggersByAccount = BTreeMap<ContextAndAccountId, Vec<AlarmTrigger>>;

/// Locked triggers grouped by owner.
pub type LockedTriggersByAccount = BTreeMap<ContextAndAccountId, Vec<LockedAlarmTrigger>>;
