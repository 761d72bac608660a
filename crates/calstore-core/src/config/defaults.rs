//! Default configuration values

use super::types::{AlarmConfig, Config, SearchConfig};

pub(super) const DEFAULT_DATABASE_URL: &str = "sqlite://calstore.db";
pub(super) const DEFAULT_OVERDUE_WAIT_MS: u64 = 5 * 60 * 1000;
pub(super) const DEFAULT_REFRESH_INTERVAL_MS: u64 = 60 * 1000;
pub(super) const DEFAULT_REFRESH_CHUNK_SIZE: usize = 100;
pub(super) const DEFAULT_DROP_CHUNK_SIZE: usize = 100;
pub(super) const DEFAULT_INSERT_CHUNK_SIZE: usize = 100;
pub(super) const DEFAULT_DELETE_CHUNK_SIZE: usize = 200;
pub(super) const DEFAULT_EVENTS_PREFIX: &str = "e.";
pub(super) const DEFAULT_ATTENDEES_PREFIX: &str = "a.";

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            alarm: AlarmConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            overdue_wait_ms: DEFAULT_OVERDUE_WAIT_MS,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            refresh_chunk_size: DEFAULT_REFRESH_CHUNK_SIZE,
            drop_chunk_size: DEFAULT_DROP_CHUNK_SIZE,
            insert_chunk_size: DEFAULT_INSERT_CHUNK_SIZE,
            delete_chunk_size: DEFAULT_DELETE_CHUNK_SIZE,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            events_prefix: DEFAULT_EVENTS_PREFIX.to_string(),
            attendees_prefix: DEFAULT_ATTENDEES_PREFIX.to_string(),
            collation: None,
        }
    }
}
