//! Source field types to Postgres column types.

use crate::{ColumnType, FieldDescriptor, FieldType};

/// Map a source field to the type of its inline column.
///
/// A two-valued enumeration is stored as a BOOLEAN. Everything without a
/// dedicated mapping (larger enumerations, unknown source types) falls back
/// to TEXT; enumerations with lookup tables never reach an inline column, see
/// [`crate::build`].
pub fn map_type(field: &FieldDescriptor) -> ColumnType {
    if field.field_type == FieldType::Enumeration && field.enumerated_values.len() == 2 {
        return ColumnType::Boolean;
    }

    match field.field_type {
        FieldType::Text
        | FieldType::TextArea
        | FieldType::Email
        | FieldType::Phone
        | FieldType::Url => ColumnType::Text,
        FieldType::Boolean => ColumnType::Boolean,
        FieldType::Double | FieldType::Currency => ColumnType::Numeric,
        FieldType::Date => ColumnType::Date,
        FieldType::DateTime => ColumnType::Timestamp,
        FieldType::Reference => ColumnType::Uuid,
        FieldType::Enumeration | FieldType::MultiEnumeration | FieldType::Other(_) => {
            ColumnType::Text
        }
    }
}
