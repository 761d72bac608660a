//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: ~/.config/calstore/config.toml
//! 3. Project config: .calstore/config.toml
//! 4. Environment variables: CALSTORE_*
//! 5. CLI flags (command-specific)
//!
//! # Example Config
//!
//! ```toml
//! database_url = "sqlite://calstore.db"
//!
//! [alarm]
//! overdue_wait_ms = 300000
//! refresh_interval_ms = 60000
//!
//! [search]
//! collation = "NOCASE"
//! ```

mod defaults;
mod load;
mod merge;
mod types;
mod validate;

#[cfg(test)]
mod tests_loading;

pub use load::{
    global_config_path, load_config, load_config_from, load_toml_file, project_config_path,
};
pub use types::{AlarmConfig, Config, SearchConfig};
