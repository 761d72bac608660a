//! Positional SQL parameters produced by the compiler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{query::QueryAs, sqlite::SqliteArguments, Sqlite};

/// A bound value, aligned with one `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlParam {
    Bool(bool),
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl SqlParam {
    fn bind_as<'q, O>(
        &'q self,
        query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
        match self {
            Self::Bool(value) => query.bind(*value),
            Self::Int(value) => query.bind(*value),
            Self::Text(value) => query.bind(value.as_str()),
            Self::Timestamp(value) => query.bind(value.to_rfc3339()),
        }
    }
}

/// Bind `params` onto a typed query in order.
pub fn bind_params_as<'q, O>(
    query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    params: &'q [SqlParam],
) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    params.iter().fold(query, |query, param| param.bind_as(query))
}
