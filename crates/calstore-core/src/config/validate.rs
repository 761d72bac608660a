//! Configuration validation

use super::types::Config;
use crate::{Error, Result};

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A table prefix is either empty or `identifier.`.
fn is_valid_prefix(prefix: &str) -> bool {
    prefix.is_empty()
        || prefix
            .strip_suffix('.')
            .is_some_and(is_identifier)
}

impl Config {
    /// Validate configuration values.
    ///
    /// Prefixes and collation names end up verbatim in generated SQL, so they
    /// are restricted to plain identifiers.
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Error::invalid_config("database_url cannot be empty"));
        }

        let alarm = &self.alarm;
        if alarm.refresh_interval_ms == 0 {
            return Err(Error::invalid_config(
                "alarm.refresh_interval_ms must be greater than 0",
            ));
        }
        [
            ("alarm.refresh_chunk_size", alarm.refresh_chunk_size),
            ("alarm.drop_chunk_size", alarm.drop_chunk_size),
            ("alarm.insert_chunk_size", alarm.insert_chunk_size),
            ("alarm.delete_chunk_size", alarm.delete_chunk_size),
        ]
        .iter()
        .find(|(_, size)| *size == 0)
        .map_or(Ok(()), |(name, _)| {
            Err(Error::invalid_config(format!("{name} must be greater than 0")))
        })?;

        let search = &self.search;
        // Attendee and attachment subqueries correlate on the event prefix.
        if search.events_prefix.is_empty() {
            return Err(Error::invalid_config("search.events_prefix cannot be empty"));
        }
        for (name, prefix) in [
            ("search.events_prefix", &search.events_prefix),
            ("search.attendees_prefix", &search.attendees_prefix),
        ] {
            if !is_valid_prefix(prefix) {
                return Err(Error::invalid_config(format!(
                    "{name} must be empty or an identifier followed by '.', got '{prefix}'"
                )));
            }
        }
        if let Some(collation) = &search.collation {
            if !is_identifier(collation) {
                return Err(Error::invalid_config(format!(
                    "search.collation must be a plain identifier, got '{collation}'"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = Config::default();
        config.alarm.drop_chunk_size = 0;
        let err = config.validate().err();
        assert!(matches!(err, Some(Error::InvalidConfig(msg)) if msg.contains("drop_chunk_size")));
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let mut config = Config::default();
        config.alarm.refresh_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prefix_validation() {
        assert!(is_valid_prefix(""));
        assert!(is_valid_prefix("e."));
        assert!(is_valid_prefix("calendar_event."));
        assert!(!is_valid_prefix("e"));
        assert!(!is_valid_prefix("e.; DROP TABLE x;."));
        assert!(!is_valid_prefix("."));
    }

    #[test]
    fn test_empty_events_prefix_rejected() {
        let mut config = Config::default();
        config.search.events_prefix = String::new();
        let err = config.validate().err();
        assert!(matches!(err, Some(Error::InvalidConfig(msg)) if msg.contains("events_prefix")));

        let mut config = Config::default();
        config.search.attendees_prefix = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_collation_must_be_identifier() {
        let mut config = Config::default();
        config.search.collation = Some("NOCASE".to_string());
        assert!(config.validate().is_ok());
        config.search.collation = Some("NOCASE) OR (1=1".to_string());
        assert!(config.validate().is_err());
    }
}
