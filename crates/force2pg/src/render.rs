//! SQL text for the create and values artifacts.
//!
//! The output is what [`crate::parse_create_table`] and
//! [`crate::parse_value_set`] read back on the next run, so a rendered schema
//! always recovers the same main table and ledgers.

use force2pg_sql::{Ident, Lit, foreign_key_name};

use crate::{Column, EnumeratedValueSet, MigrationStatement, Schema, Table};

/// Generate CREATE TABLE SQL with every foreign key inline.
pub fn create_table_sql(table: &Table) -> String {
    create_table_sql_with(table, |_| true, false)
}

/// Generate CREATE TABLE SQL, rendering only the foreign keys `inline`
/// accepts as `REFERENCES` clauses.
fn create_table_sql_with(
    table: &Table,
    inline: impl Fn(&Column) -> bool,
    if_not_exists: bool,
) -> String {
    let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };
    let mut sql = format!("CREATE TABLE {}{} (\n", guard, Ident(&table.name));

    let pk_columns = table.primary_key_columns();
    // more than one PK column needs a table constraint
    let use_table_pk_constraint = pk_columns.len() > 1;

    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            let mut def = format!("    {} {}", Ident(&col.name), col.column_type);

            if col.primary_key && !use_table_pk_constraint {
                def.push_str(" PRIMARY KEY");
            }
            if col.not_null {
                def.push_str(" NOT NULL");
            }
            if col.unique && !col.primary_key {
                def.push_str(" UNIQUE");
            }
            if let Some(target) = col.references.as_ref().filter(|_| inline(col)) {
                def.push_str(&format!(" REFERENCES {}(id)", Ident(target)));
            }

            def
        })
        .collect();

    if use_table_pk_constraint {
        let quoted: Vec<_> = pk_columns.iter().map(|c| Ident(c).to_string()).collect();
        parts.push(format!("    PRIMARY KEY ({})", quoted.join(", ")));
    }

    sql.push_str(&parts.join(",\n"));
    sql.push_str("\n);");
    sql
}

/// A foreign key that can't be inline because its target is created later.
struct DeferredForeignKey<'a> {
    table: &'a str,
    column: &'a str,
    target: &'a str,
}

/// CREATE TABLE statements for `tables` in order, plus the foreign keys that
/// point at a table further down the list.
fn tables_sql<'a>(
    tables: &[&'a Table],
    if_not_exists: bool,
) -> (Vec<String>, Vec<DeferredForeignKey<'a>>) {
    let mut creates = Vec::new();
    let mut deferred = Vec::new();

    for (position, &table) in tables.iter().enumerate() {
        let created_later = |target: &str| {
            tables[position + 1..].iter().any(|t| t.name == target)
        };
        let inline = |col: &Column| !col.references.as_deref().is_some_and(|t| created_later(t));

        creates.push(create_table_sql_with(table, &inline, if_not_exists));
        for col in table.columns.iter().filter(|&c| !inline(c)) {
            if let Some(target) = &col.references {
                deferred.push(DeferredForeignKey {
                    table: &table.name,
                    column: &col.name,
                    target,
                });
            }
        }
    }

    (creates, deferred)
}

/// Generate the create artifact for a whole schema.
///
/// Tables come in schema order, main table first. A foreign key pointing at
/// a table of this schema that is created later (the main table's lookup
/// columns) can't be inline, so it is added by an `ALTER TABLE` after all
/// tables exist.
pub fn schema_to_sql(schema: &Schema) -> String {
    let tables: Vec<&Table> = schema.tables.values().collect();
    let (creates, deferred) = tables_sql(&tables, false);

    let mut sql = creates.join("\n\n");
    if !deferred.is_empty() {
        let alters: Vec<String> = deferred
            .iter()
            .map(|fk| {
                format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}(id);",
                    Ident(fk.table),
                    Ident(foreign_key_name(fk.table, fk.column)),
                    Ident(fk.column),
                    Ident(fk.target)
                )
            })
            .collect();
        sql.push_str("\n\n");
        sql.push_str(&alters.join("\n"));
    }
    sql.push('\n');
    sql
}

/// Statements that create `tables` unless they already exist, for the head
/// of a migration script. Deferred foreign keys get the same existence guard
/// as [`MigrationStatement::AddForeignKeyConstraint`].
pub(crate) fn create_missing_tables_sql(tables: &[Table]) -> Vec<String> {
    let tables: Vec<&Table> = tables.iter().collect();
    let (mut statements, deferred) = tables_sql(&tables, true);
    statements.extend(deferred.into_iter().map(|fk| {
        MigrationStatement::AddForeignKeyConstraint {
            table: fk.table.to_string(),
            column: fk.column.to_string(),
            references: fk.target.to_string(),
        }
        .to_sql()
    }));
    statements
}

/// Generate the values artifact: one INSERT per ledger entry, with its id,
/// then a `setval` that moves the table's sequence to the ledger's
/// high-water mark. The `setval` line is what keeps the ids of deleted
/// values from being handed out again on the next run.
pub fn values_sql(values: &EnumeratedValueSet) -> String {
    let blocks: Vec<String> = values
        .iter()
        .filter(|(_, ledger)| !ledger.is_empty())
        .map(|(table, ledger)| {
            let mut lines: Vec<String> = ledger
                .iter()
                .map(|(id, value)| {
                    format!(
                        "INSERT INTO {} (id, value) VALUES ({}, {});",
                        Ident(table),
                        id,
                        Lit(value)
                    )
                })
                .collect();
            lines.push(format!(
                "SELECT setval(pg_get_serial_sequence({}, 'id'), {});",
                Lit(Ident(table).to_string()),
                ledger.high_water()
            ));
            lines.join("\n")
        })
        .collect();

    if blocks.is_empty() {
        return String::new();
    }
    let mut sql = blocks.join("\n\n");
    sql.push('\n');
    sql
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{ColumnType, FieldDescriptor, FieldType, ObjectDescriptor, ValueLedger, build};

    fn deal() -> ObjectDescriptor {
        ObjectDescriptor::new("Custom_Deal__c")
            .with_field(FieldDescriptor::new("Name", FieldType::Text))
            .with_field(
                FieldDescriptor::new("Account__c", FieldType::Reference).with_reference_to("Account"),
            )
            .with_field(
                FieldDescriptor::new("Stage__c", FieldType::Enumeration)
                    .with_values(["Open", "Won", "Lost"]),
            )
            .with_field(
                FieldDescriptor::new("Regions__c", FieldType::MultiEnumeration)
                    .with_values(["EMEA", "APAC", "AMER"]),
            )
    }

    #[test]
    fn test_create_table_sql() {
        let table = Table::new("account")
            .with_column(Column::primary_key("id", ColumnType::Uuid))
            .with_column(Column::new("name", ColumnType::Text))
            .with_column(Column::new("order", ColumnType::Numeric))
            .with_column(Column::new("parentid", ColumnType::Uuid).references("account"));
        insta::assert_snapshot!(create_table_sql(&table), @r#"
        CREATE TABLE account (
            id UUID PRIMARY KEY,
            name TEXT,
            "order" NUMERIC,
            parentid UUID REFERENCES account(id)
        );
        "#);
    }

    #[test]
    fn test_create_table_sql_composite_key() {
        let table = Table::new("deal_tags_junction")
            .with_column(Column::primary_key("deal_id", ColumnType::Uuid).references("deal"))
            .with_column(Column::primary_key("tags_id", ColumnType::Integer).references("deal_tags"));
        insta::assert_snapshot!(create_table_sql(&table), @r"
        CREATE TABLE deal_tags_junction (
            deal_id UUID REFERENCES deal(id),
            tags_id INTEGER REFERENCES deal_tags(id),
            PRIMARY KEY (deal_id, tags_id)
        );
        ");
    }

    #[test]
    fn test_schema_to_sql() {
        let known: HashSet<String> = ["Account".to_string()].into();
        let schema = build(&deal(), &known);
        insta::assert_snapshot!(schema_to_sql(&schema), @r"
        CREATE TABLE custom_deal (
            id UUID PRIMARY KEY,
            name TEXT,
            account UUID REFERENCES account(id),
            stage_id INTEGER
        );

        CREATE TABLE custom_deal_stage (
            id SERIAL PRIMARY KEY,
            value TEXT NOT NULL UNIQUE
        );

        CREATE TABLE custom_deal_regions (
            id SERIAL PRIMARY KEY,
            value TEXT NOT NULL UNIQUE
        );

        CREATE TABLE custom_deal_regions_junction (
            custom_deal_id UUID REFERENCES custom_deal(id),
            regions_id INTEGER REFERENCES custom_deal_regions(id),
            PRIMARY KEY (custom_deal_id, regions_id)
        );

        ALTER TABLE custom_deal ADD CONSTRAINT fk_custom_deal_stage_id FOREIGN KEY (stage_id) REFERENCES custom_deal_stage(id);
        ");
    }

    #[test]
    fn test_values_sql() {
        let schema = build(&deal(), &HashSet::new());
        insta::assert_snapshot!(values_sql(&schema.values), @r"
        INSERT INTO custom_deal_stage (id, value) VALUES (1, 'Open');
        INSERT INTO custom_deal_stage (id, value) VALUES (2, 'Won');
        INSERT INTO custom_deal_stage (id, value) VALUES (3, 'Lost');
        SELECT setval(pg_get_serial_sequence('custom_deal_stage', 'id'), 3);

        INSERT INTO custom_deal_regions (id, value) VALUES (1, 'EMEA');
        INSERT INTO custom_deal_regions (id, value) VALUES (2, 'APAC');
        INSERT INTO custom_deal_regions (id, value) VALUES (3, 'AMER');
        SELECT setval(pg_get_serial_sequence('custom_deal_regions', 'id'), 3);
        ");
    }

    #[test]
    fn test_values_sql_escapes_and_skips_empty() {
        let mut values = EnumeratedValueSet::new();
        values.insert("deal_empty", ValueLedger::new());
        let mut ledger = ValueLedger::new();
        ledger.insert("Didn't close", 5);
        values.insert("deal_reason", ledger);
        assert_eq!(
            values_sql(&values),
            "INSERT INTO deal_reason (id, value) VALUES (5, 'Didn''t close');\n\
             SELECT setval(pg_get_serial_sequence('deal_reason', 'id'), 5);\n"
        );
        assert_eq!(values_sql(&EnumeratedValueSet::new()), "");
    }

    #[test]
    fn test_values_sql_records_high_water_of_deleted_ids() {
        let first = ValueLedger::from_positional(["A", "B", "C", "D"]);
        let mut values = EnumeratedValueSet::new();
        values.insert(
            "deal_stage",
            ValueLedger::from_positional(["A", "B", "C"]).reconcile(Some(&first)),
        );
        insta::assert_snapshot!(values_sql(&values), @r"
        INSERT INTO deal_stage (id, value) VALUES (1, 'A');
        INSERT INTO deal_stage (id, value) VALUES (2, 'B');
        INSERT INTO deal_stage (id, value) VALUES (3, 'C');
        SELECT setval(pg_get_serial_sequence('deal_stage', 'id'), 4);
        ");
    }

    #[test]
    fn test_values_sql_quotes_table_inside_literal() {
        let mut values = EnumeratedValueSet::new();
        values.insert("order_user", ValueLedger::from_positional(["x"]));
        values.insert("Odd", ValueLedger::from_positional(["y"]));
        let sql = values_sql(&values);
        assert!(sql.contains("pg_get_serial_sequence('order_user', 'id')"));
        assert!(sql.contains("pg_get_serial_sequence('\"Odd\"', 'id')"));
    }

    #[test]
    fn test_create_missing_tables_sql() {
        let known: HashSet<String> = ["Account".to_string()].into();
        let schema = build(&deal(), &known);
        let tables: Vec<Table> = schema.tables.values().cloned().collect();
        insta::assert_snapshot!(create_missing_tables_sql(&tables).join("\n"), @r"
        CREATE TABLE IF NOT EXISTS custom_deal (
            id UUID PRIMARY KEY,
            name TEXT,
            account UUID REFERENCES account(id),
            stage_id INTEGER
        );
        CREATE TABLE IF NOT EXISTS custom_deal_stage (
            id SERIAL PRIMARY KEY,
            value TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS custom_deal_regions (
            id SERIAL PRIMARY KEY,
            value TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS custom_deal_regions_junction (
            custom_deal_id UUID REFERENCES custom_deal(id),
            regions_id INTEGER REFERENCES custom_deal_regions(id),
            PRIMARY KEY (custom_deal_id, regions_id)
        );
        DO $$ BEGIN IF NOT EXISTS (SELECT 1 FROM pg_constraint WHERE conname = 'fk_custom_deal_stage_id') THEN ALTER TABLE custom_deal ADD CONSTRAINT fk_custom_deal_stage_id FOREIGN KEY (stage_id) REFERENCES custom_deal_stage(id); END IF; END $$;
        ");
    }
}
