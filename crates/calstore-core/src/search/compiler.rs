//! Search term to SQL `WHERE` fragment compiler.
//!
//! Compilation is a fold over the (rewritten) term tree: every node yields a
//! [`Fragment`] holding its SQL text, its parameters in placeholder order,
//! and which tables it touched. Parents concatenate their children.

use chrono::DateTime;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::{
    adjust::adjust,
    mapping::{CalendarColumns, ColumnMapping, ColumnResolver, SqlType, Table},
    params::SqlParam,
    term::{
        CompositeOperation, Constant, EventField, Field, Operand, OperationPosition, SearchTerm,
        SingleOperation,
    },
    wildcard::{contains_wildcards, prepare_for_search},
};
use crate::{config::SearchConfig, Error, Result};

const ESCAPE_CLAUSE: &str = " ESCAPE '\\'";

const ATTENDEE_URI_ADDRESS: &str = "CASE WHEN LOWER(calendar_attendee.uri) LIKE 'mailto:%' \
     THEN SUBSTR(LOWER(calendar_attendee.uri), 8) ELSE LOWER(calendar_attendee.uri) END";

/// Result of compiling a search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledClause {
    /// SQL fragment for a `WHERE` clause; `TRUE` when there was no term.
    pub clause: String,
    /// Parameters aligned with the `?` placeholders of `clause`.
    pub params: Vec<SqlParam>,
    /// Whether the clause references the event table.
    pub uses_events: bool,
    /// Whether the clause references the joined attendee table.
    pub uses_attendees: bool,
}

impl CompiledClause {
    fn match_all() -> Self {
        Self {
            clause: "TRUE".to_string(),
            params: Vec::new(),
            uses_events: false,
            uses_attendees: false,
        }
    }
}

#[derive(Debug, Default)]
struct Fragment {
    sql: String,
    params: Vec<SqlParam>,
    uses_events: bool,
    uses_attendees: bool,
}

impl Fragment {
    fn literal(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            ..Self::default()
        }
    }

    /// Take over params and table flags of `child`, returning its SQL.
    fn absorb(&mut self, child: Self) -> String {
        self.params.extend(child.params);
        self.uses_events |= child.uses_events;
        self.uses_attendees |= child.uses_attendees;
        child.sql
    }

    fn touch(&mut self, table: Table) {
        match table {
            Table::Events => self.uses_events = true,
            Table::Attendees => self.uses_attendees = true,
        }
    }
}

/// How a comparison is emitted, decided before any SQL is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Plain,
    Like,
    NotLike,
}

impl Comparison {
    /// `=` / `<>` against a text column with a wildcard constant become
    /// `LIKE` / `NOT LIKE`.
    fn decide(operation: SingleOperation, sql_type: SqlType, operands: &[Operand]) -> Self {
        let has_wildcards = operands
            .iter()
            .any(|operand| matches!(operand, Operand::Constant(Constant::Text(t)) if contains_wildcards(t)));
        match operation {
            SingleOperation::Equals if has_wildcards && sql_type == SqlType::Varchar => Self::Like,
            SingleOperation::NotEquals if has_wildcards && sql_type == SqlType::Varchar => {
                Self::NotLike
            }
            _ => Self::Plain,
        }
    }

    const fn is_like(self) -> bool {
        !matches!(self, Self::Plain)
    }

    const fn token(self, operation: SingleOperation) -> &'static str {
        match self {
            Self::Plain => operation.sql(),
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
        }
    }
}

/// Place an operator token relative to already compiled operands.
fn place(token: &str, position: OperationPosition, parts: &[String]) -> String {
    match position {
        OperationPosition::Before => format!("{token} {}", parts.join(" ")),
        OperationPosition::Between => parts.join(&format!(" {token} ")),
        OperationPosition::After => parts.iter().map(|part| format!("{part} {token}")).join(" "),
    }
}

/// Text bound against an integer column: `true`/`false` or an integer literal.
fn integer_from_text(text: &str) -> Result<i64> {
    if text.eq_ignore_ascii_case("true") {
        Ok(1)
    } else if text.eq_ignore_ascii_case("false") {
        Ok(0)
    } else {
        text.trim().parse().map_err(|_| {
            Error::invalid_search_term(format!("'{text}' is not a valid integer value"))
        })
    }
}

/// Bound representation of `constant` for a column of `sql_type`.
fn bind_constant(constant: &Constant, sql_type: SqlType, like: bool) -> Result<SqlParam> {
    let param = match constant {
        Constant::Text(text) if like => SqlParam::Text(prepare_for_search(text)),
        Constant::Text(text) if sql_type == SqlType::Integer => {
            SqlParam::Int(integer_from_text(text)?)
        }
        Constant::Text(text) => SqlParam::Text(text.clone()),
        Constant::Bool(value) if sql_type == SqlType::Integer => SqlParam::Int(i64::from(*value)),
        Constant::Bool(value) => SqlParam::Bool(*value),
        Constant::Int(millis) if sql_type == SqlType::Timestamp => DateTime::from_timestamp_millis(*millis)
            .map(SqlParam::Timestamp)
            .ok_or_else(|| {
                Error::invalid_search_term(format!("{millis} is out of range for a timestamp"))
            })?,
        Constant::Int(value) => SqlParam::Int(*value),
        Constant::Date(date) => match sql_type {
            SqlType::BigInt | SqlType::Integer => SqlParam::Int(date.timestamp_millis()),
            SqlType::Timestamp | SqlType::Varchar => SqlParam::Timestamp(*date),
        },
        Constant::Transparency(transp) if sql_type == SqlType::Integer => {
            SqlParam::Int(transp.code())
        }
        Constant::Transparency(transp) => SqlParam::Text(transp.to_string()),
        Constant::ParticipationStatus(status) => SqlParam::Text(status.to_string()),
        Constant::RelatedTo { rel_type, value } => SqlParam::Text(
            rel_type
                .as_ref()
                .map_or_else(String::new, |rel_type| format!("{rel_type}:{value}")),
        ),
    };
    Ok(param)
}

/// Compiles [`SearchTerm`]s against a [`ColumnResolver`].
///
/// A compiler holds no per-compilation state and can be shared.
#[derive(Debug, Clone)]
pub struct SearchCompiler<R = CalendarColumns> {
    resolver: R,
    context_id: i32,
    collation: Option<String>,
    optimize_in_clauses: bool,
}

impl SearchCompiler<CalendarColumns> {
    /// Compiler for the calendar tables with the default `e.` / `a.` prefixes.
    pub fn new(context_id: i32) -> Self {
        Self::with_resolver(context_id, CalendarColumns::default())
    }

    pub fn from_config(context_id: i32, config: &SearchConfig) -> Self {
        Self::with_resolver(context_id, CalendarColumns::from_config(config))
            .with_collation(config.collation.clone())
    }
}

impl<R: ColumnResolver> SearchCompiler<R> {
    pub const fn with_resolver(context_id: i32, resolver: R) -> Self {
        Self {
            resolver,
            context_id,
            collation: None,
            optimize_in_clauses: true,
        }
    }

    /// Emit text columns as `col COLLATE <name>`.
    pub fn with_collation(mut self, collation: Option<String>) -> Self {
        self.collation = collation;
        self
    }

    /// Toggle rewriting `f = a OR f = b` into `f IN (a, b)` (on by default).
    pub const fn with_in_clause_optimization(mut self, enabled: bool) -> Self {
        self.optimize_in_clauses = enabled;
        self
    }

    /// Compile `term` into a `WHERE` fragment; no term matches everything.
    pub fn compile(&self, term: Option<&SearchTerm>) -> Result<CompiledClause> {
        let Some(term) = term else {
            return Ok(CompiledClause::match_all());
        };
        let adjusted = adjust(term, self.context_id)?;
        let fragment = self.compile_term(&adjusted)?;
        tracing::trace!(
            clause = %fragment.sql,
            params = fragment.params.len(),
            "Compiled search term"
        );
        Ok(CompiledClause {
            clause: fragment.sql,
            params: fragment.params,
            uses_events: fragment.uses_events,
            uses_attendees: fragment.uses_attendees,
        })
    }

    fn compile_term(&self, term: &SearchTerm) -> Result<Fragment> {
        match term {
            SearchTerm::Single {
                operation,
                operands,
            } => self.compile_single(*operation, operands),
            SearchTerm::Composite { operation, terms } => {
                self.compile_composite(*operation, terms)
            }
        }
    }

    fn mappings(&self, field: Field) -> Result<Vec<ColumnMapping>> {
        self.resolver
            .resolve(field)
            .filter(|mappings| !mappings.is_empty())
            .ok_or_else(|| Error::unmappable_field(field))
    }

    // ─────────────────────────────────────────────────────────────────────
    // SINGLE TERMS
    // ─────────────────────────────────────────────────────────────────────

    fn compile_single(&self, operation: SingleOperation, operands: &[Operand]) -> Result<Fragment> {
        let field = operands.iter().find_map(Operand::field).ok_or_else(|| {
            Error::invalid_search_term(format!("No column operand found in '{operation}' term"))
        })?;
        if operands.len() != operation.arity() {
            return Err(Error::invalid_search_term(format!(
                "'{operation}' takes {} operand(s), got {}",
                operation.arity(),
                operands.len()
            )));
        }

        match field {
            Field::Event(EventField::Attendees) => self.compile_attendees(operation, operands),
            Field::Event(EventField::Attachments) => self.compile_attachments(operation, operands),
            _ => {
                let mut fragment = Fragment::default();
                let mut parts = Vec::new();
                for mapping in self.mappings(field)? {
                    parts.push(self.compile_operation(
                        operation,
                        operands,
                        field,
                        &mapping,
                        &mut fragment,
                    )?);
                }
                fragment.sql = match parts.as_slice() {
                    [single] => single.clone(),
                    _ => format!("({})", parts.join(" OR ")),
                };
                Ok(fragment)
            }
        }
    }

    /// One single term against one mapping of its driving field.
    fn compile_operation(
        &self,
        operation: SingleOperation,
        operands: &[Operand],
        field: Field,
        mapping: &ColumnMapping,
        fragment: &mut Fragment,
    ) -> Result<String> {
        let comparison = Comparison::decide(operation, mapping.sql_type, operands);
        // LIKE is not symmetric: the column goes left, the pattern right.
        let ordered: Vec<&Operand> = if comparison.is_like() {
            operands
                .iter()
                .sorted_by_key(|operand| operand.constant().is_some())
                .collect()
        } else {
            operands.iter().collect()
        };

        let mut parts = Vec::with_capacity(ordered.len());
        for operand in ordered {
            let part = match operand {
                Operand::Constant(constant) => {
                    fragment.params.push(bind_constant(
                        constant,
                        mapping.sql_type,
                        comparison.is_like(),
                    )?);
                    "?".to_string()
                }
                column => self.column_expr(column, field, mapping, fragment)?,
            };
            parts.push(part);
        }

        let body = place(comparison.token(operation), operation.position(), &parts);
        Ok(if comparison.is_like() {
            format!("({body}{ESCAPE_CLAUSE})")
        } else {
            format!("({body})")
        })
    }

    /// Column label of `operand`, formatted and collated.
    ///
    /// The driving field uses `mapping`; any other column operand must map to
    /// exactly one column.
    fn column_expr(
        &self,
        operand: &Operand,
        driving_field: Field,
        mapping: &ColumnMapping,
        fragment: &mut Fragment,
    ) -> Result<String> {
        let field = operand
            .field()
            .ok_or_else(|| Error::invalid_search_term("Expected a column operand"))?;
        let own_mapping;
        let mapping = if field == driving_field {
            mapping
        } else {
            let mut mappings = self.mappings(field)?;
            if mappings.len() > 1 {
                return Err(Error::invalid_search_term(format!(
                    "Found multiple mappings for: {field}"
                )));
            }
            own_mapping = mappings.remove(0);
            &own_mapping
        };
        fragment.touch(mapping.table);

        let label = mapping.label();
        let label = operand
            .format()
            .map_or(label.clone(), |format| format.apply(&label));
        Ok(match (&self.collation, mapping.sql_type) {
            (Some(collation), SqlType::Varchar) => format!("{label} COLLATE {collation}"),
            _ => label,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // ONE-TO-MANY FIELDS
    // ─────────────────────────────────────────────────────────────────────

    fn special_constant<'t>(
        field: EventField,
        operation: SingleOperation,
        operands: &'t [Operand],
    ) -> Result<&'t Constant> {
        if operation != SingleOperation::Equals {
            return Err(Error::unsupported_operation(field, operation));
        }
        operands.iter().find_map(Operand::constant).ok_or_else(|| {
            Error::invalid_search_term(format!("Unsupported operand for {field}: missing constant"))
        })
    }

    fn compile_attendees(&self, operation: SingleOperation, operands: &[Operand]) -> Result<Fragment> {
        let constant = Self::special_constant(EventField::Attendees, operation, operands)?;
        let e = self.resolver.events_prefix();
        let correlation = format!(
            "calendar_attendee.cid={e}cid AND calendar_attendee.account={e}account \
             AND calendar_attendee.event={e}id"
        );

        let entity = match constant {
            Constant::Int(entity) => Some(*entity),
            Constant::Text(text) => text.parse::<u32>().ok().map(i64::from),
            _ => None,
        };
        let mut fragment = Fragment {
            uses_events: true,
            ..Fragment::default()
        };

        if let Some(entity) = entity {
            fragment.sql = format!(
                "EXISTS (SELECT 1 FROM calendar_attendee WHERE {correlation} \
                 AND calendar_attendee.entity = ?)"
            );
            fragment.params.push(SqlParam::Int(entity));
            return Ok(fragment);
        }

        let Constant::Text(text) = constant else {
            return Err(Error::invalid_search_term(format!(
                "Unsupported operand for {}: {constant:?}",
                EventField::Attendees
            )));
        };
        let (token, escape, address, name) = if contains_wildcards(text) {
            (
                "LIKE",
                ESCAPE_CLAUSE,
                prepare_for_search(&text.to_lowercase()),
                prepare_for_search(text),
            )
        } else {
            ("=", "", text.to_lowercase(), text.clone())
        };
        fragment.sql = format!(
            "EXISTS (SELECT 1 FROM calendar_attendee WHERE {correlation} \
             AND ({ATTENDEE_URI_ADDRESS} {token} ?{escape} OR calendar_attendee.cn {token} ?{escape}))"
        );
        fragment.params.push(SqlParam::Text(address));
        fragment.params.push(SqlParam::Text(name));
        Ok(fragment)
    }

    fn compile_attachments(
        &self,
        operation: SingleOperation,
        operands: &[Operand],
    ) -> Result<Fragment> {
        let constant = Self::special_constant(EventField::Attachments, operation, operands)?;
        let e = self.resolver.events_prefix();
        let like = matches!(constant, Constant::Text(text) if contains_wildcards(text));
        let (token, escape) = if like { ("LIKE", ESCAPE_CLAUSE) } else { ("=", "") };
        Ok(Fragment {
            sql: format!(
                "EXISTS (SELECT 1 FROM prg_attachment WHERE prg_attachment.cid={e}cid \
                 AND prg_attachment.attached={e}id AND prg_attachment.filename {token} ?{escape})"
            ),
            params: vec![bind_constant(constant, SqlType::Varchar, like)?],
            uses_events: true,
            uses_attendees: false,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // COMPOSITE TERMS
    // ─────────────────────────────────────────────────────────────────────

    fn compile_composite(
        &self,
        operation: CompositeOperation,
        terms: &[SearchTerm],
    ) -> Result<Fragment> {
        if let Some(fragment) = self.compile_as_in_clause(operation, terms)? {
            return Ok(fragment);
        }
        match (operation, terms.len()) {
            (CompositeOperation::Not, count) if count != 1 => Err(Error::invalid_search_term(
                format!("NOT takes exactly one term, got {count}"),
            )),
            (CompositeOperation::And, 0) => Ok(Fragment::literal("TRUE")),
            (CompositeOperation::Or, 0) => Ok(Fragment::literal("FALSE")),
            _ => {
                let mut fragment = Fragment::default();
                let mut parts = Vec::with_capacity(terms.len());
                for term in terms {
                    let child = self.compile_term(term)?;
                    parts.push(fragment.absorb(child));
                }
                fragment.sql = format!("({})", place(operation.sql(), operation.position(), &parts));
                Ok(fragment)
            }
        }
    }

    /// `f = a OR f = b OR ...` as `f IN (?,?,...)`.
    ///
    /// Applies only to ORs of at least two `column = constant` terms on the
    /// same plain column without wildcard constants; returns `None` otherwise.
    fn compile_as_in_clause(
        &self,
        operation: CompositeOperation,
        terms: &[SearchTerm],
    ) -> Result<Option<Fragment>> {
        if !self.optimize_in_clauses || operation != CompositeOperation::Or || terms.len() < 2 {
            return Ok(None);
        }

        let mut common: Option<&Operand> = None;
        let mut values = Vec::with_capacity(terms.len());
        for term in terms {
            let SearchTerm::Single {
                operation: SingleOperation::Equals,
                operands,
            } = term
            else {
                return Ok(None);
            };
            let (column, value) = match operands.as_slice() {
                [column, Operand::Constant(value)] | [Operand::Constant(value), column]
                    if column.field().is_some() =>
                {
                    (column, value)
                }
                _ => return Ok(None),
            };
            if column.field().is_some_and(Field::is_special) {
                return Ok(None);
            }
            if matches!(value, Constant::Text(text) if contains_wildcards(text)) {
                return Ok(None);
            }
            match common {
                Some(existing) if existing != column => return Ok(None),
                _ => common = Some(column),
            }
            values.push(value);
        }
        let Some(column) = common else {
            return Ok(None);
        };
        let Some(field) = column.field() else {
            return Ok(None);
        };

        let mut fragment = Fragment::default();
        let mut parts = Vec::new();
        for mapping in self.mappings(field)? {
            let label = self.column_expr(column, field, &mapping, &mut fragment)?;
            for value in &values {
                fragment
                    .params
                    .push(bind_constant(value, mapping.sql_type, false)?);
            }
            parts.push(format!(
                "{label} IN ({})",
                std::iter::repeat("?").take(values.len()).join(",")
            ));
        }
        fragment.sql = match parts.as_slice() {
            [single] => single.clone(),
            _ => format!("({})", parts.join(" OR ")),
        };
        Ok(Some(fragment))
    }
}
