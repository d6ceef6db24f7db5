//! Schema derivation from an object description.
//!
//! Every object becomes a main table keyed by a UUID `id`. Fields become
//! inline columns, except enumerations with more than two values, which get
//! an auxiliary lookup table:
//!
//! ```text
//! Custom_Deal__c.Stage__c  (picklist: Open, Won, Lost)
//!
//!   custom_deal        id UUID PK, stage_id INTEGER -> custom_deal_stage(id)
//!   custom_deal_stage  id SERIAL PK, value TEXT NOT NULL UNIQUE
//!                      (1, 'Open'), (2, 'Won'), (3, 'Lost')
//! ```
//!
//! Multi-valued enumerations get no column on the main table; rows are linked
//! through a `<lookup>_junction` table instead.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::typemap::map_type;
use crate::{
    Column, ColumnType, FieldDescriptor, FieldType, ObjectDescriptor, Schema, Table, ValueLedger,
    derive_name, id_column_name, junction_table_name, lookup_table_name,
};

/// Derive the full schema for `object`.
///
/// `known_objects` holds the source names of every object that will get a
/// table; references to anything else are kept as plain columns without a
/// foreign key. Never fails: an object without fields yields a table with
/// only its primary key.
pub fn build(object: &ObjectDescriptor, known_objects: &HashSet<String>) -> Schema {
    let table_name = object.table_name();
    let mut schema = Schema::new(&table_name);

    let mut main = Table::new(&table_name).with_column(Column::primary_key("id", ColumnType::Uuid));
    let mut auxiliary = Vec::new();

    for field in &object.fields {
        let column_name = field.column_name();

        match field.field_type {
            FieldType::Enumeration if field.has_lookup_table() => {
                let lookup = lookup_table_name(&table_name, &column_name);
                let column =
                    Column::new(id_column_name(&column_name), ColumnType::Integer).references(&lookup);
                push_column(&mut main, column);
                auxiliary.push(lookup_table(&lookup));
                schema.values.insert(&lookup, initial_ledger(field));
            }
            FieldType::MultiEnumeration if field.has_lookup_table() => {
                let lookup = lookup_table_name(&table_name, &column_name);
                auxiliary.push(lookup_table(&lookup));
                auxiliary.push(junction_table(&table_name, &column_name, &lookup));
                schema.values.insert(&lookup, initial_ledger(field));
            }
            FieldType::MultiEnumeration => {
                debug!(
                    table = %table_name,
                    field = %field.name,
                    values = field.enumerated_values.len(),
                    "multi-valued enumeration with two or fewer values gets no column"
                );
            }
            _ => {
                let mut column = Column::new(column_name, map_type(field));
                if let Some(target) = reference_target(field, known_objects, &table_name) {
                    column = column.references(target);
                }
                push_column(&mut main, column);
            }
        }
    }

    schema.add_table(main);
    for table in auxiliary {
        schema.add_table(table);
    }

    schema
}

/// The table a reference field points at, if it gets a foreign key.
fn reference_target(
    field: &FieldDescriptor,
    known_objects: &HashSet<String>,
    table_name: &str,
) -> Option<String> {
    if field.field_type != FieldType::Reference {
        return None;
    }
    let target = field.reference_target()?;
    if known_objects.contains(target) {
        Some(derive_name(target))
    } else {
        debug!(
            table = %table_name,
            field = %field.name,
            target,
            "reference target is not a known object, no foreign key"
        );
        None
    }
}

/// Append `column` unless a column with the same name is already there.
fn push_column(table: &mut Table, column: Column) {
    if table.column(&column.name).is_some() {
        warn!(
            table = %table.name,
            column = %column.name,
            "derived column name collides with an existing column, skipping"
        );
        return;
    }
    table.columns.push(column);
}

fn lookup_table(name: &str) -> Table {
    Table::new(name)
        .with_column(Column::primary_key("id", ColumnType::Serial))
        .with_column(Column::new("value", ColumnType::Text).not_null().unique())
}

fn junction_table(table_name: &str, field_column: &str, lookup: &str) -> Table {
    Table::new(junction_table_name(table_name, field_column))
        .with_column(
            Column::primary_key(id_column_name(table_name), ColumnType::Uuid).references(table_name),
        )
        .with_column(
            Column::primary_key(id_column_name(field_column), ColumnType::Integer).references(lookup),
        )
}

fn initial_ledger(field: &FieldDescriptor) -> ValueLedger {
    ValueLedger::from_positional(field.enumerated_values.iter().map(|v| v.value.as_str()))
}
