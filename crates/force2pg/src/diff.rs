//! Migration planning: compare a freshly derived schema against the baseline
//! recovered from the previous run.
//!
//! Only the main table is compared column by column. Auxiliary tables are
//! reconciled through their value ledgers; the ones the baseline doesn't know
//! about yet travel with the plan so its script can create them first.

use std::collections::HashSet;

use force2pg_sql::{Ident, Lit, foreign_key_name};
use tracing::debug;

use crate::render::create_missing_tables_sql;
use crate::{Column, ColumnType, EnumeratedValueSet, Schema, Table};

/// A single schema-mutation statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStatement {
    /// Add a column unless it exists, with its foreign key inline when it
    /// has one.
    AddColumn { table: String, column: Column },
    /// Change the type of an existing column.
    AlterColumnType {
        table: String,
        column: String,
        from: ColumnType,
        to: ColumnType,
    },
    /// Add a foreign key to an existing column, unless a constraint with the
    /// same name already exists.
    AddForeignKeyConstraint {
        table: String,
        column: String,
        references: String,
    },
    DropColumn { table: String, column: String },
    /// Insert a lookup value under its ledger id, unless the value exists.
    InsertEnumeratedValue { table: String, id: u32, value: String },
    DeleteEnumeratedValue { table: String, value: String },
}

impl MigrationStatement {
    /// The table this statement applies to.
    pub fn table(&self) -> &str {
        match self {
            MigrationStatement::AddColumn { table, .. }
            | MigrationStatement::AlterColumnType { table, .. }
            | MigrationStatement::AddForeignKeyConstraint { table, .. }
            | MigrationStatement::DropColumn { table, .. }
            | MigrationStatement::InsertEnumeratedValue { table, .. }
            | MigrationStatement::DeleteEnumeratedValue { table, .. } => table,
        }
    }

    /// Whether applying this statement can lose data.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            MigrationStatement::DropColumn { .. } | MigrationStatement::DeleteEnumeratedValue { .. }
        )
    }

    /// Generate the SQL for this statement.
    pub fn to_sql(&self) -> String {
        match self {
            MigrationStatement::AddColumn { table, column } => {
                let mut def = format!("{} {}", Ident(&column.name), column.column_type);
                if column.primary_key {
                    def.push_str(" PRIMARY KEY");
                }
                if column.not_null {
                    def.push_str(" NOT NULL");
                }
                if column.unique && !column.primary_key {
                    def.push_str(" UNIQUE");
                }
                if let Some(target) = &column.references {
                    def.push_str(&format!(" REFERENCES {}(id)", Ident(target)));
                }
                format!("ALTER TABLE {} ADD COLUMN IF NOT EXISTS {};", Ident(table), def)
            }
            MigrationStatement::AlterColumnType { table, column, to, .. } => {
                format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{};",
                    Ident(table),
                    Ident(column),
                    to,
                    Ident(column),
                    to
                )
            }
            MigrationStatement::AddForeignKeyConstraint {
                table,
                column,
                references,
            } => {
                let name = foreign_key_name(table, column);
                format!(
                    "DO $$ BEGIN IF NOT EXISTS (SELECT 1 FROM pg_constraint WHERE conname = {}) THEN \
                     ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}(id); \
                     END IF; END $$;",
                    Lit(&name),
                    Ident(table),
                    Ident(&name),
                    Ident(column),
                    Ident(references)
                )
            }
            MigrationStatement::DropColumn { table, column } => {
                format!("ALTER TABLE {} DROP COLUMN {};", Ident(table), Ident(column))
            }
            MigrationStatement::InsertEnumeratedValue { table, id, value } => {
                format!(
                    "INSERT INTO {} (id, value) VALUES ({}, {}) ON CONFLICT (value) DO NOTHING;",
                    Ident(table),
                    id,
                    Lit(value)
                )
            }
            MigrationStatement::DeleteEnumeratedValue { table, value } => {
                format!("DELETE FROM {} WHERE value = {};", Ident(table), Lit(value))
            }
        }
    }
}

impl std::fmt::Display for MigrationStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationStatement::AddColumn { table, column } => {
                write!(f, "+ {}.{}: {}", table, column.name, column.column_type)?;
                if let Some(target) = &column.references {
                    write!(f, " -> {}", target)?;
                }
                Ok(())
            }
            MigrationStatement::AlterColumnType {
                table,
                column,
                from,
                to,
            } => write!(f, "~ {}.{}: {} -> {}", table, column, from, to),
            MigrationStatement::AddForeignKeyConstraint {
                table,
                column,
                references,
            } => write!(f, "+ FOREIGN KEY {}.{} -> {}", table, column, references),
            MigrationStatement::DropColumn { table, column } => write!(f, "- {}.{}", table, column),
            MigrationStatement::InsertEnumeratedValue { table, id, value } => {
                write!(f, "+ {}[{}] = {}", table, id, Lit(value))
            }
            MigrationStatement::DeleteEnumeratedValue { table, value } => {
                write!(f, "- {}[{}]", table, Lit(value))
            }
        }
    }
}

/// The ordered statements that bring one object's tables up to date.
///
/// Statements come in category order: column adds, type changes, foreign
/// keys, column drops, value inserts, value deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Main table of the object this plan is for
    pub table: String,
    pub statements: Vec<MigrationStatement>,
    /// Tables the baseline doesn't show, created (if missing) ahead of the
    /// statements: every table on a first run, new lookup and junction
    /// tables afterwards
    pub new_tables: Vec<Table>,
}

impl MigrationPlan {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            statements: Vec::new(),
            new_tables: Vec::new(),
        }
    }

    /// Returns true if there are no statements.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationStatement> {
        self.statements.iter()
    }

    /// Whether any statement can lose data.
    pub fn has_destructive(&self) -> bool {
        self.statements.iter().any(MigrationStatement::is_destructive)
    }

    /// Generate SQL for the whole plan: the guarded creates of
    /// [`MigrationPlan::new_tables`], then one statement per line.
    ///
    /// Every statement is guarded, so the script also runs on a database the
    /// create artifact has already been applied to.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        if self.is_empty() {
            return sql;
        }
        sql.push_str(&format!("-- Table: {}\n", self.table));
        for create in create_missing_tables_sql(&self.new_tables) {
            sql.push_str(&create);
            sql.push('\n');
        }
        for statement in &self.statements {
            sql.push_str(&statement.to_sql());
            sql.push('\n');
        }
        sql
    }
}

impl std::fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            writeln!(f, "{}: no changes", self.table)
        } else {
            writeln!(f, "{}:", self.table)?;
            for statement in &self.statements {
                writeln!(f, "  {}", statement)?;
            }
            Ok(())
        }
    }
}

/// Compare `current` against the baseline of the previous run.
///
/// `baseline` is the main table recovered from the previous create artifact,
/// `None` on the first run, in which case every column is added.
/// `baseline_values` holds the previously written lookup values; value ids
/// come from reconciling the current ledgers against it, so an existing value
/// never changes id.
pub fn diff(
    current: &Schema,
    baseline: Option<&Table>,
    baseline_values: &EnumeratedValueSet,
) -> MigrationPlan {
    let mut plan = MigrationPlan::new(&current.main);
    plan.new_tables = new_tables(current, baseline, baseline_values);

    if let Some(main) = current.main_table() {
        plan.statements.extend(diff_columns(main, baseline));
    }

    let values = current.values.reconcile(baseline_values);
    let mut inserts = Vec::new();
    let mut deletes = Vec::new();

    for (table, ledger) in values.iter() {
        let previous = baseline_values.get(table);

        for (id, value) in ledger.iter() {
            if !previous.is_some_and(|p| p.contains(value)) {
                inserts.push(MigrationStatement::InsertEnumeratedValue {
                    table: table.to_string(),
                    id,
                    value: value.to_string(),
                });
            }
        }

        for value in previous.into_iter().flat_map(|p| p.values()) {
            if !ledger.contains(value) {
                deletes.push(MigrationStatement::DeleteEnumeratedValue {
                    table: table.to_string(),
                    value: value.to_string(),
                });
            }
        }
    }

    plan.statements.extend(inserts);
    plan.statements.extend(deletes);

    debug!(
        table = %plan.table,
        baseline = baseline.is_some(),
        statements = plan.len(),
        "planned migration"
    );
    plan
}

/// Tables of `current` that the baseline doesn't show. Without a baseline
/// that is all of them; otherwise the auxiliary tables of lookups the
/// previous values artifact has no rows for.
fn new_tables(
    current: &Schema,
    baseline: Option<&Table>,
    baseline_values: &EnumeratedValueSet,
) -> Vec<Table> {
    if baseline.is_none() {
        return current.tables.values().cloned().collect();
    }
    current
        .auxiliary_tables()
        .filter(|table| {
            // a junction belongs to the lookup it references
            let lookup = table
                .columns
                .iter()
                .filter_map(|c| c.references.as_deref())
                .find(|target| current.values.get(target).is_some())
                .unwrap_or(table.name.as_str());
            baseline_values.get(lookup).is_none()
        })
        .cloned()
        .collect()
}

fn diff_columns(current: &Table, baseline: Option<&Table>) -> Vec<MigrationStatement> {
    let Some(baseline) = baseline else {
        return current
            .columns
            .iter()
            .map(|column| MigrationStatement::AddColumn {
                table: current.name.clone(),
                column: column.clone(),
            })
            .collect();
    };

    let table = &current.name;
    let current_names: HashSet<&str> = current.columns.iter().map(|c| c.name.as_str()).collect();

    let mut adds = Vec::new();
    let mut alters = Vec::new();
    let mut foreign_keys = Vec::new();

    for column in &current.columns {
        let Some(previous) = baseline.column(&column.name) else {
            adds.push(MigrationStatement::AddColumn {
                table: table.clone(),
                column: column.clone(),
            });
            continue;
        };

        if previous.column_type != column.column_type {
            alters.push(MigrationStatement::AlterColumnType {
                table: table.clone(),
                column: column.name.clone(),
                from: previous.column_type.clone(),
                to: column.column_type.clone(),
            });
        }

        if let Some(target) = &column.references {
            let already_there = previous.foreign_key && previous.references.as_ref() == Some(target);
            if let Some(old) = previous.references.as_ref().filter(|old| *old != target) {
                // same constraint name, so the guard keeps the old target
                debug!(
                    table = %table,
                    column = %column.name,
                    from = %old,
                    to = %target,
                    "foreign key target changed, existing constraint is not retargeted"
                );
            }
            if !already_there {
                foreign_keys.push(MigrationStatement::AddForeignKeyConstraint {
                    table: table.clone(),
                    column: column.name.clone(),
                    references: target.clone(),
                });
            }
        }
    }

    let drops = baseline
        .columns
        .iter()
        .filter(|c| !current_names.contains(c.name.as_str()))
        .map(|c| MigrationStatement::DropColumn {
            table: table.clone(),
            column: c.name.clone(),
        });

    let mut statements = adds;
    statements.extend(alters);
    statements.extend(foreign_keys);
    statements.extend(drops);
    statements
}
