//! Rewrites for fields stored in an encoded form.
//!
//! - `organizer` is stored as a URI (`mailto:...` or an internal resource id).
//!   Text constants are matched against the lower-cased address part, numeric
//!   constants are turned into the internal resource id of that user.
//! - `transp` is stored as an integer code.
//!
//! The pass walks the whole tree and never touches the database.

use std::str::FromStr;

use super::term::{
    ColumnFormat, Constant, EventField, Field, Operand, SearchTerm, Transparency,
};
use crate::{Error, Result};

/// Internal resource id of a user, as stored in `organizer`.
pub fn user_resource_id(context_id: i32, user_id: i64) -> String {
    format!("urn:calstore:ctx:{context_id}:user:{user_id}")
}

/// Rewrite every term of `term` that references an encoded field.
pub fn adjust(term: &SearchTerm, context_id: i32) -> Result<SearchTerm> {
    match term {
        SearchTerm::Composite { operation, terms } => Ok(SearchTerm::Composite {
            operation: *operation,
            terms: terms
                .iter()
                .map(|child| adjust(child, context_id))
                .collect::<Result<_>>()?,
        }),
        SearchTerm::Single {
            operation,
            operands,
        } => {
            let operands = match term.column_field() {
                Some(Field::Event(EventField::Organizer)) => adjust_organizer(operands, context_id),
                Some(Field::Event(EventField::Transp)) => adjust_transparency(operands)?,
                _ => operands.clone(),
            };
            Ok(SearchTerm::Single {
                operation: *operation,
                operands,
            })
        }
    }
}

fn adjust_organizer(operands: &[Operand], context_id: i32) -> Vec<Operand> {
    let matches_address = operands
        .iter()
        .find_map(Operand::constant)
        .is_some_and(|constant| matches!(constant, Constant::Text(_)));

    operands
        .iter()
        .map(|operand| match operand {
            Operand::Column(field @ Field::Event(EventField::Organizer)) if matches_address => {
                Operand::FormattedColumn {
                    field: *field,
                    format: ColumnFormat::MailtoAddress,
                }
            }
            Operand::Constant(Constant::Text(address)) => {
                Operand::Constant(Constant::Text(address.to_lowercase()))
            }
            Operand::Constant(Constant::Int(user_id)) => {
                Operand::Constant(Constant::Text(user_resource_id(context_id, *user_id)))
            }
            other => other.clone(),
        })
        .collect()
}

fn adjust_transparency(operands: &[Operand]) -> Result<Vec<Operand>> {
    operands
        .iter()
        .map(|operand| match operand {
            Operand::Constant(Constant::Transparency(transp)) => {
                Ok(Operand::Constant(Constant::Int(transp.code())))
            }
            Operand::Constant(Constant::Text(name)) => Transparency::from_str(name)
                .map(|transp| Operand::Constant(Constant::Int(transp.code())))
                .map_err(|_| {
                    Error::invalid_search_term(format!(
                        "Unknown transparency '{name}' for field transp"
                    ))
                }),
            other => Ok(other.clone()),
        })
        .collect()
}
