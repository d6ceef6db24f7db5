//! Markdown page describing one object and its tables.

use std::collections::HashSet;

use crate::typemap::map_type;
use crate::{
    CUSTOM_SUFFIX, EnumeratedValueSet, FieldDescriptor, FieldType, ObjectDescriptor, derive_name,
    lookup_table_name,
};

/// Render the documentation page for `object`.
///
/// The attribute table lists every field with its column type; references to
/// known objects link to that object's page. Each enumeration with a lookup
/// table gets a value table, using the ids from `values` where the ledger has
/// them.
pub fn object_markdown(
    object: &ObjectDescriptor,
    known_objects: &HashSet<String>,
    values: &EnumeratedValueSet,
) -> String {
    let table_name = object.table_name();
    let mut md = String::new();

    md.push_str(&format!("# {}\n\n", object.name));
    md.push_str("## Attributes\n\n");
    md.push_str("| Field Name | Type | Description | Reference |\n");
    md.push_str("|------------|------|-------------|-----------|\n");

    for field in &object.fields {
        md.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            cell(display_name(field)),
            cell(&type_label(field)),
            cell(&field.label),
            reference_link(field, known_objects),
        ));
    }

    let enumerations: Vec<_> = object.fields.iter().filter(|f| f.has_lookup_table()).collect();
    if enumerations.is_empty() {
        return md;
    }

    md.push_str("\n## Picklists\n");
    for field in enumerations {
        let ledger = values.get(&lookup_table_name(&table_name, &field.column_name()));

        md.push_str(&format!("\n### {}\n\n", cell(display_name(field))));
        md.push_str("| Id | Value | Label |\n");
        md.push_str("|----|-------|-------|\n");
        for (position, entry) in field.enumerated_values.iter().enumerate() {
            let id = match ledger {
                Some(ledger) => ledger.id_of(&entry.value).map(|id| id.to_string()),
                None => Some((position + 1).to_string()),
            };
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                id.unwrap_or_default(),
                cell(&entry.value),
                cell(&entry.label)
            ));
        }
    }

    md
}

fn display_name(field: &FieldDescriptor) -> &str {
    field.name.strip_suffix(CUSTOM_SUFFIX).unwrap_or(&field.name)
}

fn type_label(field: &FieldDescriptor) -> String {
    match field.field_type {
        FieldType::Enumeration if field.has_lookup_table() => "Picklist (see below)".to_string(),
        FieldType::MultiEnumeration if field.has_lookup_table() => {
            "Multipicklist (see below)".to_string()
        }
        _ => map_type(field).to_string(),
    }
}

fn reference_link(field: &FieldDescriptor, known_objects: &HashSet<String>) -> String {
    if field.field_type != FieldType::Reference {
        return String::new();
    }
    match field.reference_target() {
        Some(target) if known_objects.contains(target) => {
            let page = derive_name(target);
            format!("[{}](../{}/{}.md)", cell(target), page, page)
        }
        _ => String::new(),
    }
}

/// Escape a value for a table cell.
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
