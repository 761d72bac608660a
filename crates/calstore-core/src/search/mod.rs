//! Search-term compilation.
//!
//! A [`SearchTerm`] tree is rewritten for encoded fields, resolved to columns
//! and folded into a parameterized `WHERE` fragment:
//!
//! ```text
//! OR(summary = "a", summary = "b")      ->  e.summary IN (?,?)   ["a", "b"]
//! attendees = 7                         ->  EXISTS (SELECT 1 FROM calendar_attendee ...)
//! summary = "meet*"                     ->  (e.summary LIKE ? ESCAPE '\')   ["meet%"]
//! ```
//!
//! [`EventQuery`] wraps a compiled clause into complete select and count
//! statements.

mod adjust;
mod compiler;
mod mapping;
mod params;
mod query;
mod term;
mod wildcard;

pub use adjust::{adjust, user_resource_id};
pub use compiler::{CompiledClause, SearchCompiler};
pub use mapping::{CalendarColumns, ColumnMapping, ColumnResolver, SqlType, Table};
pub use params::{bind_params_as, SqlParam};
pub use query::{EventQuery, Statement, TimeRange};
pub use term::{
    AttendeeField, ColumnFormat, CompositeOperation, Constant, EventField, Field, Operand,
    OperationPosition, ParticipationStatus, SearchTerm, SingleOperation, Transparency,
};
pub use wildcard::{contains_wildcards, prepare_for_search, LIKE_ESCAPE};
