//! # Calstore Core
//!
//! Relational building blocks of a calendar store:
//!
//! - [`alarm`]: claim-based locking of alarm trigger rows with a background
//!   lease refresher, for schedulers running in several processes at once.
//! - [`search`]: compilation of search-term trees into parameterized SQL
//!   `WHERE` fragments for the event tables.
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only
//!
//! ## Error Handling
//!
//! All fallible operations return `Result<T, Error>`. Use:
//! - `?` operator for propagation
//! - `map`, `and_then` combinators for transformation
//! - `match` / `map_or` / `unwrap_or_else` for defaults

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod alarm;
pub mod clock;
pub mod config;
mod error;
pub mod search;
pub mod taskregistry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
