//! Search term trees.
//!
//! A [`SearchTerm`] is either a single predicate over operands or a boolean
//! composite of child terms. Trees are immutable values; the compiler only
//! ever builds new ones.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::Error;

/// Fields of the event table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum EventField {
    Id,
    Uid,
    Summary,
    Location,
    Description,
    Categories,
    Organizer,
    Transp,
    Status,
    Class,
    StartDate,
    EndDate,
    Created,
    LastModified,
    CreatedBy,
    Folder,
    SeriesId,
    Url,
    Color,
    RelatedTo,
    /// One-to-many: matched through an `EXISTS` subquery.
    Attendees,
    /// One-to-many: matched through an `EXISTS` subquery.
    Attachments,
}

/// Fields of the attendee table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum AttendeeField {
    Entity,
    Uri,
    Cn,
    Folder,
    PartStat,
    CuType,
    Role,
    Hidden,
}

/// A searchable field.
///
/// Textual form is the snake-case field name, with an `attendee.` prefix
/// for attendee fields (`summary`, `attendee.part_stat`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Field {
    Event(EventField),
    Attendee(AttendeeField),
}

const ATTENDEE_PREFIX: &str = "attendee.";

impl Field {
    /// Fields that compile to correlated subqueries instead of columns.
    pub const fn is_special(self) -> bool {
        matches!(
            self,
            Self::Event(EventField::Attendees | EventField::Attachments)
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(field) => write!(f, "{field}"),
            Self::Attendee(field) => write!(f, "{ATTENDEE_PREFIX}{field}"),
        }
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.strip_prefix(ATTENDEE_PREFIX) {
            Some(name) => AttendeeField::from_str(name).map(Self::Attendee),
            None => EventField::from_str(s).map(Self::Event),
        };
        parsed.map_err(|_| Error::unmappable_field(s))
    }
}

impl TryFrom<String> for Field {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Field> for String {
    fn from(field: Field) -> Self {
        field.to_string()
    }
}

impl From<EventField> for Field {
    fn from(field: EventField) -> Self {
        Self::Event(field)
    }
}

impl From<AttendeeField> for Field {
    fn from(field: AttendeeField) -> Self {
        Self::Attendee(field)
    }
}

/// Time transparency of an event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Transparency {
    Opaque,
    Transparent,
}

impl Transparency {
    /// Integer code stored in the `transp` column.
    pub const fn code(self) -> i64 {
        match self {
            Self::Transparent => 0,
            Self::Opaque => 1,
        }
    }
}

/// Participation status of an attendee.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE", ascii_case_insensitive)]
pub enum ParticipationStatus {
    NeedsAction,
    Accepted,
    Declined,
    Tentative,
    Delegated,
}

/// Typed literal of a search term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    Bool(bool),
    Int(i64),
    Text(String),
    Date(DateTime<Utc>),
    Transparency(Transparency),
    ParticipationStatus(ParticipationStatus),
    RelatedTo {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rel_type: Option<String>,
        value: String,
    },
}

impl From<&str> for Constant {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Constant {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Constant {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Constant {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for Constant {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

/// SQL expression wrapped around a column label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnFormat {
    /// Lower-cased address following `mailto:`, or the lower-cased value.
    MailtoAddress,
}

impl ColumnFormat {
    pub fn apply(self, label: &str) -> String {
        match self {
            Self::MailtoAddress => format!(
                "CASE WHEN INSTR(LOWER({label}), 'mailto:') > 0 \
                 THEN SUBSTR(LOWER({label}), INSTR(LOWER({label}), 'mailto:') + 7) \
                 ELSE LOWER({label}) END"
            ),
        }
    }
}

/// Operand of a single predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Column(Field),
    FormattedColumn { field: Field, format: ColumnFormat },
    Constant(Constant),
}

impl Operand {
    pub const fn field(&self) -> Option<Field> {
        match self {
            Self::Column(field) | Self::FormattedColumn { field, .. } => Some(*field),
            Self::Constant(_) => None,
        }
    }

    pub const fn constant(&self) -> Option<&Constant> {
        match self {
            Self::Constant(constant) => Some(constant),
            _ => None,
        }
    }

    pub const fn format(&self) -> Option<ColumnFormat> {
        match self {
            Self::FormattedColumn { format, .. } => Some(*format),
            _ => None,
        }
    }
}

/// Where an operator token goes relative to its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPosition {
    Before,
    Between,
    After,
}

/// Comparison operators of single predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SingleOperation {
    #[serde(rename = "=")]
    Equals,
    #[serde(rename = "<>")]
    NotEquals,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "IS NULL")]
    IsNull,
}

impl SingleOperation {
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "<>",
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterOrEqual => ">=",
            Self::IsNull => "IS NULL",
        }
    }

    pub const fn position(self) -> OperationPosition {
        match self {
            Self::IsNull => OperationPosition::After,
            _ => OperationPosition::Between,
        }
    }

    /// Number of operands the operator takes.
    pub const fn arity(self) -> usize {
        match self {
            Self::IsNull => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for SingleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

/// Boolean operators of composite terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompositeOperation {
    And,
    Or,
    Not,
}

impl CompositeOperation {
    pub const fn sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
        }
    }

    pub const fn position(self) -> OperationPosition {
        match self {
            Self::Not => OperationPosition::Before,
            Self::And | Self::Or => OperationPosition::Between,
        }
    }
}

impl fmt::Display for CompositeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

/// A search predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchTerm {
    Single {
        operation: SingleOperation,
        operands: Vec<Operand>,
    },
    Composite {
        operation: CompositeOperation,
        terms: Vec<SearchTerm>,
    },
}

impl SearchTerm {
    pub fn single(operation: SingleOperation, operands: Vec<Operand>) -> Self {
        Self::Single {
            operation,
            operands,
        }
    }

    /// `field = value`
    pub fn equals(field: impl Into<Field>, value: impl Into<Constant>) -> Self {
        Self::compare(field, SingleOperation::Equals, value)
    }

    /// `field <op> value`
    pub fn compare(
        field: impl Into<Field>,
        operation: SingleOperation,
        value: impl Into<Constant>,
    ) -> Self {
        Self::single(
            operation,
            vec![
                Operand::Column(field.into()),
                Operand::Constant(value.into()),
            ],
        )
    }

    /// `field IS NULL`
    pub fn is_null(field: impl Into<Field>) -> Self {
        Self::single(SingleOperation::IsNull, vec![Operand::Column(field.into())])
    }

    pub fn composite(operation: CompositeOperation, terms: Vec<Self>) -> Self {
        Self::Composite { operation, terms }
    }

    pub fn and(terms: Vec<Self>) -> Self {
        Self::composite(CompositeOperation::And, terms)
    }

    pub fn or(terms: Vec<Self>) -> Self {
        Self::composite(CompositeOperation::Or, terms)
    }

    pub fn not(term: Self) -> Self {
        Self::composite(CompositeOperation::Not, vec![term])
    }

    /// First column operand of a single predicate.
    pub fn column_field(&self) -> Option<Field> {
        match self {
            Self::Single { operands, .. } => operands.iter().find_map(Operand::field),
            Self::Composite { .. } => None,
        }
    }
}
