//! Event search statements built around a compiled clause.
//!
//! The statements alias the event table as `e` and the attendee table as `a`,
//! so the clause must be compiled with the default column prefixes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use super::{
    compiler::{CompiledClause, SearchCompiler},
    mapping::{CalendarColumns, ColumnResolver, Table},
    params::{bind_params_as, SqlParam},
    term::{EventField, Field, SearchTerm},
};
use crate::Result;

/// A statement with its parameters in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Optional time window an event's range must overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

const fn event_table(deleted: bool) -> &'static str {
    if deleted {
        "calendar_event_tombstone"
    } else {
        "calendar_event"
    }
}

const fn attendee_table(deleted: bool) -> &'static str {
    if deleted {
        "calendar_attendee_tombstone"
    } else {
        "calendar_attendee"
    }
}

/// Search over the events of one account.
#[derive(Debug, Clone)]
pub struct EventQuery {
    context_id: i32,
    account_id: i32,
    clause: CompiledClause,
}

impl EventQuery {
    pub const fn new(context_id: i32, account_id: i32, clause: CompiledClause) -> Self {
        Self {
            context_id,
            account_id,
            clause,
        }
    }

    /// Compile `term` with the default calendar columns.
    pub fn compile(context_id: i32, account_id: i32, term: Option<&SearchTerm>) -> Result<Self> {
        let clause = SearchCompiler::new(context_id).compile(term)?;
        Ok(Self::new(context_id, account_id, clause))
    }

    pub const fn clause(&self) -> &CompiledClause {
        &self.clause
    }

    fn leading_params(&self) -> Vec<SqlParam> {
        vec![
            SqlParam::Int(i64::from(self.context_id)),
            SqlParam::Int(i64::from(self.account_id)),
        ]
    }

    fn with_clause_params(&self, mut params: Vec<SqlParam>) -> Vec<SqlParam> {
        params.extend(self.clause.params.iter().cloned());
        params
    }

    /// `SELECT` of the event columns of `fields`.
    ///
    /// Fields without an event column (attendees, attachments) are skipped.
    /// The attendee table is joined only when the clause needs it.
    pub fn select_sql(&self, fields: &[EventField], deleted: bool, range: &TimeRange) -> Statement {
        let columns = CalendarColumns::default();
        let labels: Vec<String> = fields
            .iter()
            .filter_map(|field| columns.resolve(Field::Event(*field)))
            .filter_map(|mappings| {
                mappings
                    .into_iter()
                    .find(|mapping| mapping.table == Table::Events)
            })
            .map(|mapping| mapping.label())
            .collect();
        let labels = if labels.is_empty() {
            "e.id".to_string()
        } else {
            labels.join(",")
        };

        let mut sql = format!("SELECT {labels} FROM {} AS e", event_table(deleted));
        if self.clause.uses_attendees {
            sql.push_str(&format!(
                " LEFT JOIN {} AS a ON e.cid=a.cid AND e.account=a.account AND e.id=a.event",
                attendee_table(deleted)
            ));
        }
        sql.push_str(" WHERE e.cid=? AND e.account=?");

        let mut params = self.leading_params();
        if let Some(from) = range.from {
            sql.push_str(" AND e.rangeUntil>?");
            params.push(SqlParam::Int(from.timestamp_millis()));
        }
        if let Some(until) = range.until {
            sql.push_str(" AND e.rangeFrom<?");
            params.push(SqlParam::Int(until.timestamp_millis()));
        }
        sql.push_str(&format!(" AND {}", self.clause.clause));

        Statement {
            sql,
            params: self.with_clause_params(params),
        }
    }

    /// `COUNT` statement, touching only the tables the clause uses.
    pub fn count_sql(&self, deleted: bool) -> Statement {
        let events = event_table(deleted);
        let attendees = attendee_table(deleted);
        let clause = &self.clause.clause;

        let sql = match (self.clause.uses_events, self.clause.uses_attendees) {
            // No term at all: count the whole account.
            (false, false) if clause == "TRUE" => {
                return Statement {
                    sql: format!("SELECT COUNT(*) FROM {events} WHERE cid=? AND account=?"),
                    params: self.leading_params(),
                }
            }
            // Table-free clauses such as `FALSE` still filter.
            (false, false) => format!(
                "SELECT COUNT(*) FROM {events} WHERE cid=? AND account=? AND {clause}"
            ),
            (false, true) => format!(
                "SELECT COUNT(DISTINCT a.event) FROM {attendees} AS a \
                 WHERE a.cid=? AND a.account=? AND {clause}"
            ),
            (true, false) => format!(
                "SELECT COUNT(*) FROM {events} AS e WHERE e.cid=? AND e.account=? AND {clause}"
            ),
            (true, true) => format!(
                "SELECT COUNT(DISTINCT e.id) FROM {events} AS e \
                 LEFT JOIN {attendees} AS a ON e.cid=a.cid AND e.account=a.account AND e.id=a.event \
                 WHERE e.cid=? AND e.account=? AND {clause}"
            ),
        };
        Statement {
            sql,
            params: self.with_clause_params(self.leading_params()),
        }
    }

    /// Run [`Self::count_sql`] against `pool`.
    pub async fn count(&self, pool: &SqlitePool, deleted: bool) -> Result<i64> {
        let statement = self.count_sql(deleted);
        tracing::debug!(sql = %statement.sql, params = statement.params.len(), "Counting events");
        let (count,): (i64,) = bind_params_as(sqlx::query_as(&statement.sql), &statement.params)
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Ids of the matching events, deduplicated and in ascending order.
    pub async fn select_ids(
        &self,
        pool: &SqlitePool,
        deleted: bool,
        range: &TimeRange,
    ) -> Result<Vec<i64>> {
        let statement = self.select_sql(&[EventField::Id], deleted, range);
        tracing::debug!(sql = %statement.sql, params = statement.params.len(), "Selecting events");
        let rows: Vec<(i64,)> = bind_params_as(sqlx::query_as(&statement.sql), &statement.params)
            .fetch_all(pool)
            .await?;
        let mut ids: Vec<i64> = rows.into_iter().map(|(id,)| id).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::search::term::AttendeeField;

    fn query(term: Option<&SearchTerm>) -> Result<EventQuery> {
        EventQuery::compile(1, 5, term)
    }

    #[test]
    fn count_without_term_counts_account() -> Result<()> {
        let statement = query(None)?.count_sql(false);
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) FROM calendar_event WHERE cid=? AND account=?"
        );
        assert_eq!(statement.params, vec![SqlParam::Int(1), SqlParam::Int(5)]);
        Ok(())
    }

    #[test]
    fn count_keeps_table_free_clause() -> Result<()> {
        let statement = query(Some(&SearchTerm::or(vec![])))?.count_sql(false);
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) FROM calendar_event WHERE cid=? AND account=? AND FALSE"
        );

        let negated = SearchTerm::not(SearchTerm::and(vec![]));
        let statement = query(Some(&negated))?.count_sql(false);
        assert!(statement.sql.ends_with("AND (NOT TRUE)"), "{}", statement.sql);
        Ok(())
    }

    #[test]
    fn count_attendee_only_goes_through_attendee_table() -> Result<()> {
        let term = SearchTerm::equals(AttendeeField::Entity, 3_i64);
        let statement = query(Some(&term))?.count_sql(true);
        assert_eq!(
            statement.sql,
            "SELECT COUNT(DISTINCT a.event) FROM calendar_attendee_tombstone AS a \
             WHERE a.cid=? AND a.account=? AND (a.entity = ?)"
        );
        assert_eq!(
            statement.params,
            vec![SqlParam::Int(1), SqlParam::Int(5), SqlParam::Int(3)]
        );
        Ok(())
    }

    #[test]
    fn count_event_only_and_joined() -> Result<()> {
        let events_only = query(Some(&SearchTerm::equals(EventField::Summary, "x")))?;
        assert!(events_only
            .count_sql(false)
            .sql
            .starts_with("SELECT COUNT(*) FROM calendar_event AS e WHERE"));

        let joined = query(Some(&SearchTerm::equals(EventField::Folder, 4_i64)))?;
        let statement = joined.count_sql(false);
        assert!(statement.sql.starts_with("SELECT COUNT(DISTINCT e.id)"));
        assert!(statement.sql.contains("LEFT JOIN calendar_attendee AS a"));
        assert_eq!(statement.params.len(), 4);
        Ok(())
    }

    #[test]
    fn select_orders_leading_params_before_clause() -> Result<()> {
        let from = Utc.timestamp_millis_opt(1_000).single();
        let until = Utc.timestamp_millis_opt(2_000).single();
        let range = TimeRange { from, until };
        let term = SearchTerm::equals(EventField::Summary, "x");
        let statement = query(Some(&term))?.select_sql(
            &[EventField::Id, EventField::Summary, EventField::Attendees],
            false,
            &range,
        );
        assert_eq!(
            statement.sql,
            "SELECT e.id,e.summary FROM calendar_event AS e WHERE e.cid=? AND e.account=? \
             AND e.rangeUntil>? AND e.rangeFrom<? AND (e.summary = ?)"
        );
        assert_eq!(
            statement.params,
            vec![
                SqlParam::Int(1),
                SqlParam::Int(5),
                SqlParam::Int(1_000),
                SqlParam::Int(2_000),
                SqlParam::Text("x".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn select_joins_attendees_when_needed() -> Result<()> {
        let term = SearchTerm::equals(AttendeeField::Cn, "Bob");
        let statement = query(Some(&term))?.select_sql(&[], true, &TimeRange::default());
        assert_eq!(
            statement.sql,
            "SELECT e.id FROM calendar_event_tombstone AS e LEFT JOIN calendar_attendee_tombstone AS a \
             ON e.cid=a.cid AND e.account=a.account AND e.id=a.event \
             WHERE e.cid=? AND e.account=? AND (a.cn = ?)"
        );
        Ok(())
    }
}
