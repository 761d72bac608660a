//! Alarm trigger claims with lease refresh.
//!
//! - `types`: trigger rows, keys and locked-trigger handles
//! - `registry`: claims awaiting refresh and their release handles
//! - `store`: SQL boundary ([`TriggerStore`], [`RdbTriggerStore`])
//! - `refresher`: background lease refresh task
//! - `storage`: the claim protocol ([`AlarmTriggerStorage`])

mod refresher;
mod registry;
mod storage;
mod store;
mod types;

pub use refresher::{spawn_refresher, RefreshSettings};
pub use registry::{AcquiredLock, RefreshRegistry};
pub use storage::AlarmTriggerStorage;
pub use store::{RdbTriggerStore, TriggerStore};
pub use types::{
    AlarmAction, AlarmKey, AlarmTrigger, ContextAndAccountId, LockedAlarmTrigger,
    LockedTriggersByAccount, TriggersByAccount,
};
