//! Configuration type definitions
//!
//! Pure data holders; defaults live in `defaults`, behavior in `load` and `validate`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// MAIN CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

/// Root configuration structure
///
/// Loaded from defaults → global → project → env vars → CLI flags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub alarm: AlarmConfig,
    pub search: SearchConfig,
}

// ═══════════════════════════════════════════════════════════════════════════
// NESTED CONFIGURATION STRUCTURES
// ═══════════════════════════════════════════════════════════════════════════

/// Alarm trigger locking and lease refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AlarmConfig {
    /// Lease window used when the caller supplies no expiry threshold.
    pub overdue_wait_ms: u64,
    /// Fixed delay between two lease refresh ticks.
    pub refresh_interval_ms: u64,
    pub refresh_chunk_size: usize,
    pub drop_chunk_size: usize,
    pub insert_chunk_size: usize,
    pub delete_chunk_size: usize,
}

impl AlarmConfig {
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Overdue window as signed milliseconds, saturating at `i64::MAX`.
    #[must_use]
    pub fn overdue_wait_millis(&self) -> i64 {
        i64::try_from(self.overdue_wait_ms).unwrap_or(i64::MAX)
    }
}

/// Search compiler settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub events_prefix: String,
    pub attendees_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
}
