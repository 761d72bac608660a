//! Configuration merging logic (Immutable functional pattern)
//!
//! Later configs override earlier ones (defaults → global → project → env → CLI).
//! A value in `other` only wins when it differs from the built-in default, so a
//! file that leaves a key out does not reset what an earlier layer set.

use super::{
    defaults::{
        DEFAULT_ATTENDEES_PREFIX, DEFAULT_DATABASE_URL, DEFAULT_DELETE_CHUNK_SIZE,
        DEFAULT_DROP_CHUNK_SIZE, DEFAULT_EVENTS_PREFIX, DEFAULT_INSERT_CHUNK_SIZE,
        DEFAULT_OVERDUE_WAIT_MS, DEFAULT_REFRESH_CHUNK_SIZE, DEFAULT_REFRESH_INTERVAL_MS,
    },
    types::{AlarmConfig, Config, SearchConfig},
};

fn pick<T: PartialEq>(current: T, other: T, default: &T) -> T {
    if other == *default {
        current
    } else {
        other
    }
}

impl Config {
    /// Merge another config into this one (other takes precedence) - immutable pattern
    pub fn merge(self, other: Self) -> Self {
        Self {
            database_url: pick(
                self.database_url,
                other.database_url,
                &DEFAULT_DATABASE_URL.to_string(),
            ),
            alarm: self.alarm.merge(other.alarm),
            search: self.search.merge(other.search),
        }
    }
}

impl AlarmConfig {
    fn merge(self, other: Self) -> Self {
        Self {
            overdue_wait_ms: pick(
                self.overdue_wait_ms,
                other.overdue_wait_ms,
                &DEFAULT_OVERDUE_WAIT_MS,
            ),
            refresh_interval_ms: pick(
                self.refresh_interval_ms,
                other.refresh_interval_ms,
                &DEFAULT_REFRESH_INTERVAL_MS,
            ),
            refresh_chunk_size: pick(
                self.refresh_chunk_size,
                other.refresh_chunk_size,
                &DEFAULT_REFRESH_CHUNK_SIZE,
            ),
            drop_chunk_size: pick(
                self.drop_chunk_size,
                other.drop_chunk_size,
                &DEFAULT_DROP_CHUNK_SIZE,
            ),
            insert_chunk_size: pick(
                self.insert_chunk_size,
                other.insert_chunk_size,
                &DEFAULT_INSERT_CHUNK_SIZE,
            ),
            delete_chunk_size: pick(
                self.delete_chunk_size,
                other.delete_chunk_size,
                &DEFAULT_DELETE_CHUNK_SIZE,
            ),
        }
    }
}

impl SearchConfig {
    fn merge(self, other: Self) -> Self {
        Self {
            events_prefix: pick(
                self.events_prefix,
                other.events_prefix,
                &DEFAULT_EVENTS_PREFIX.to_string(),
            ),
            attendees_prefix: pick(
                self.attendees_prefix,
                other.attendees_prefix,
                &DEFAULT_ATTENDEES_PREFIX.to_string(),
            ),
            collation: other.collation.or(self.collation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_earlier_value_when_later_is_default() {
        let global = Config {
            database_url: "sqlite://global.db".to_string(),
            ..Config::default()
        };
        let merged = global.merge(Config::default());
        assert_eq!(merged.database_url, "sqlite://global.db");
    }

    #[test]
    fn test_merge_later_value_wins() {
        let global = Config {
            database_url: "sqlite://global.db".to_string(),
            ..Config::default()
        };
        let mut project = Config::default();
        project.database_url = "sqlite://project.db".to_string();
        project.alarm.refresh_chunk_size = 10;
        project.search.collation = Some("NOCASE".to_string());

        let merged = global.merge(project);
        assert_eq!(merged.database_url, "sqlite://project.db");
        assert_eq!(merged.alarm.refresh_chunk_size, 10);
        assert_eq!(merged.alarm.drop_chunk_size, DEFAULT_DROP_CHUNK_SIZE);
        assert_eq!(merged.search.collation.as_deref(), Some("NOCASE"));
    }
}
