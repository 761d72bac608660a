//! Loading-focused tests for configuration
//!
//! File parsing, explicit config paths and environment overrides.

#[cfg(test)]
mod loading_tests {
    use std::io::Write;

    use serial_test::serial;

    use crate::config::{
        load_config, load_config_from, load_toml_file, project_config_path, Config,
    };
    use crate::{Error, Result};

    const ENV_VARS: [&str; 4] = [
        "CALSTORE_DATABASE_URL",
        "CALSTORE_OVERDUE_WAIT_MS",
        "CALSTORE_REFRESH_INTERVAL_MS",
        "CALSTORE_SEARCH_COLLATION",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    fn write_config(dir: &tempfile::TempDir, body: &str) -> Result<std::path::PathBuf> {
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path)?;
        file.write_all(body.as_bytes())?;
        Ok(path)
    }

    #[test]
    #[serial]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        clear_env();
        let dir = tempfile::tempdir()?;
        let path = write_config(
            &dir,
            "database_url = \"sqlite://test.db\"\n[alarm]\nrefresh_chunk_size = 25\n",
        )?;

        let config = load_config_from(&path)?;
        assert_eq!(config.database_url, "sqlite://test.db");
        assert_eq!(config.alarm.refresh_chunk_size, 25);
        assert_eq!(config.alarm.delete_chunk_size, 200);
        assert_eq!(config.search.events_prefix, "e.");
        Ok(())
    }

    #[test]
    fn test_malformed_toml_returns_parse_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_config(&dir, "database_url = \n invalid toml [[[")?;

        let result = load_toml_file(&path);
        assert!(matches!(result, Err(Error::Parse(_))));
        Ok(())
    }

    #[test]
    fn test_directory_path_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let result = load_toml_file(dir.path());
        assert!(matches!(result, Err(Error::Io(msg)) if msg.contains("directory")));
        Ok(())
    }

    #[test]
    fn test_missing_explicit_file_is_not_found() {
        let result = load_config_from(std::path::Path::new("/nonexistent/calstore.toml"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    #[serial]
    fn test_invalid_file_values_fail_validation() -> Result<()> {
        clear_env();
        let dir = tempfile::tempdir()?;
        let path = write_config(&dir, "[search]\nevents_prefix = \"events\"\n")?;

        let result = load_config_from(&path);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        Ok(())
    }

    #[test]
    #[serial]
    fn test_empty_events_prefix_in_file_rejected() -> Result<()> {
        clear_env();
        let dir = tempfile::tempdir()?;
        let path = write_config(&dir, "[search]\nevents_prefix = \"\"\n")?;

        let result = load_config_from(&path);
        assert!(matches!(result, Err(Error::InvalidConfig(msg)) if msg.contains("events_prefix")));
        Ok(())
    }

    #[test]
    #[serial]
    fn test_env_overrides_apply() -> Result<()> {
        clear_env();
        std::env::set_var("CALSTORE_DATABASE_URL", "sqlite::memory:");
        std::env::set_var("CALSTORE_OVERDUE_WAIT_MS", "1000");
        std::env::set_var("CALSTORE_SEARCH_COLLATION", "NOCASE");

        let config = Config::default().apply_env_vars();
        clear_env();

        let config = config?;
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.alarm.overdue_wait_ms, 1000);
        assert_eq!(config.search.collation.as_deref(), Some("NOCASE"));
        Ok(())
    }

    #[test]
    #[serial]
    fn test_env_override_rejects_garbage() {
        clear_env();
        std::env::set_var("CALSTORE_REFRESH_INTERVAL_MS", "soon");
        let result = Config::default().apply_env_vars();
        clear_env();
        assert!(matches!(result, Err(Error::InvalidConfig(msg)) if msg.contains("REFRESH_INTERVAL")));
    }

    #[test]
    #[serial]
    fn test_load_config_layers_end_with_env() -> Result<()> {
        clear_env();
        std::env::set_var("CALSTORE_DATABASE_URL", "sqlite://layered.db");
        std::env::set_var("CALSTORE_REFRESH_INTERVAL_MS", "750");

        let config = load_config();
        clear_env();

        let config = config?;
        assert_eq!(config.database_url, "sqlite://layered.db");
        assert_eq!(config.alarm.refresh_interval_ms, 750);
        Ok(())
    }

    #[test]
    fn test_project_config_path() -> Result<()> {
        let path = project_config_path()?;
        assert!(path.ends_with(".calstore/config.toml"));
        Ok(())
    }
}
