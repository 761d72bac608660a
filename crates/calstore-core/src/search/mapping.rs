//! Field to column mappings.

use super::term::{AttendeeField, EventField, Field};
use crate::config::SearchConfig;

/// SQL type of a mapped column; drives how constants are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Integer,
    BigInt,
    Varchar,
    Timestamp,
}

/// Table a mapped column lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Events,
    Attendees,
}

/// One column a field is stored in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub table: Table,
    pub prefix: String,
    pub column: &'static str,
    pub sql_type: SqlType,
}

impl ColumnMapping {
    /// Prefixed column label, e.g. `e.summary`.
    pub fn label(&self) -> String {
        format!("{}{}", self.prefix, self.column)
    }
}

/// Resolves search fields to the columns they are stored in.
pub trait ColumnResolver {
    /// All columns `field` is stored in, `None` if it has no column.
    fn resolve(&self, field: Field) -> Option<Vec<ColumnMapping>>;

    /// Prefix of the event table, used to correlate subqueries.
    fn events_prefix(&self) -> &str;
}

/// Column layout of `calendar_event` and `calendar_attendee`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarColumns {
    events_prefix: String,
    attendees_prefix: String,
}

impl Default for CalendarColumns {
    fn default() -> Self {
        Self::new("e.", "a.")
    }
}

impl CalendarColumns {
    pub fn new(events_prefix: impl Into<String>, attendees_prefix: impl Into<String>) -> Self {
        Self {
            events_prefix: events_prefix.into(),
            attendees_prefix: attendees_prefix.into(),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(&config.events_prefix, &config.attendees_prefix)
    }

    fn event(&self, column: &'static str, sql_type: SqlType) -> ColumnMapping {
        ColumnMapping {
            table: Table::Events,
            prefix: self.events_prefix.clone(),
            column,
            sql_type,
        }
    }

    fn attendee(&self, column: &'static str, sql_type: SqlType) -> ColumnMapping {
        ColumnMapping {
            table: Table::Attendees,
            prefix: self.attendees_prefix.clone(),
            column,
            sql_type,
        }
    }

    fn event_column(field: EventField) -> Option<(&'static str, SqlType)> {
        use SqlType::{BigInt, Integer, Varchar};
        let column = match field {
            EventField::Id => ("id", Integer),
            EventField::Uid => ("uid", Varchar),
            EventField::Summary => ("summary", Varchar),
            EventField::Location => ("location", Varchar),
            EventField::Description => ("description", Varchar),
            EventField::Categories => ("categories", Varchar),
            EventField::Organizer => ("organizer", Varchar),
            EventField::Transp => ("transp", Integer),
            EventField::Status => ("status", Varchar),
            EventField::Class => ("class", Varchar),
            EventField::StartDate => ("startDate", BigInt),
            EventField::EndDate => ("endDate", BigInt),
            EventField::Created => ("created", BigInt),
            EventField::LastModified => ("timestamp", BigInt),
            EventField::CreatedBy => ("createdBy", Integer),
            EventField::Folder => ("folder", Integer),
            EventField::SeriesId => ("series", Integer),
            EventField::Url => ("url", Varchar),
            EventField::Color => ("color", Varchar),
            EventField::RelatedTo => ("relatedTo", Varchar),
            EventField::Attendees | EventField::Attachments => return None,
        };
        Some(column)
    }

    const fn attendee_column(field: AttendeeField) -> (&'static str, SqlType) {
        use SqlType::{Integer, Varchar};
        match field {
            AttendeeField::Entity => ("entity", Integer),
            AttendeeField::Uri => ("uri", Varchar),
            AttendeeField::Cn => ("cn", Varchar),
            AttendeeField::Folder => ("folder", Integer),
            AttendeeField::PartStat => ("partStat", Varchar),
            AttendeeField::CuType => ("cuType", Varchar),
            AttendeeField::Role => ("role", Varchar),
            AttendeeField::Hidden => ("hidden", Integer),
        }
    }
}

impl ColumnResolver for CalendarColumns {
    fn resolve(&self, field: Field) -> Option<Vec<ColumnMapping>> {
        match field {
            // Public events carry their folder, personal copies carry it per attendee.
            Field::Event(EventField::Folder) => Some(vec![
                self.event("folder", SqlType::Integer),
                self.attendee("folder", SqlType::Integer),
            ]),
            Field::Event(event_field) => Self::event_column(event_field)
                .map(|(column, sql_type)| vec![self.event(column, sql_type)]),
            Field::Attendee(attendee_field) => {
                let (column, sql_type) = Self::attendee_column(attendee_field);
                Some(vec![self.attendee(column, sql_type)])
            }
        }
    }

    fn events_prefix(&self) -> &str {
        &self.events_prefix
    }
}
