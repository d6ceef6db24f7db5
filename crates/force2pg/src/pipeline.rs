//! One run over a set of objects: recover baselines, derive, diff, persist.

use std::collections::HashSet;

use camino::Utf8PathBuf;
use tracing::{debug, info, info_span};

use crate::store::{ArtifactKind, ArtifactStore};
use crate::{
    EnumeratedValueSet, MigrationPlan, ObjectDescriptor, Result, Schema, Table, build, diff,
    object_markdown, parse_create_table, parse_value_set, schema_to_sql, values_sql,
};

/// What processing one object produced.
#[derive(Debug, Clone)]
pub struct ObjectReport {
    /// Main table name
    pub table: String,
    /// The schema derived on this run
    pub schema: Schema,
    /// Statements that bring the previous tables up to date
    pub plan: MigrationPlan,
    /// Lookup values with their stable ids, as persisted for the next run
    pub values: EnumeratedValueSet,
}

/// What a whole run produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub objects: Vec<ObjectReport>,
    /// The migration script, if any object changed
    pub updates: Option<Utf8PathBuf>,
}

impl RunReport {
    /// Number of objects whose plan is not empty.
    pub fn changed(&self) -> usize {
        self.objects.iter().filter(|o| !o.plan.is_empty()).count()
    }
}

/// Drives objects through an [`ArtifactStore`].
pub struct Pipeline<S> {
    store: S,
}

impl<S: ArtifactStore> Pipeline<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Process one object: read the previous artifacts, derive the schema,
    /// plan the migration and replace the artifacts.
    ///
    /// `known_objects` holds the source names of every object that has (or
    /// will have) a table. Missing artifacts mean this is the first run for
    /// the object.
    pub fn process_object(
        &mut self,
        object: &ObjectDescriptor,
        known_objects: &HashSet<String>,
    ) -> Result<ObjectReport> {
        let table = object.table_name();
        let span = info_span!("object", name = %object.name, %table);
        let _enter = span.enter();

        let baseline = self.baseline_table(&table)?;
        let baseline_values = self
            .store
            .read(&table, ArtifactKind::Values)?
            .as_deref()
            .map(parse_value_set)
            .unwrap_or_default();
        debug!(
            baseline = baseline.is_some(),
            lookups = baseline_values.len(),
            "recovered baseline"
        );

        let schema = build(object, known_objects);
        let plan = diff(&schema, baseline.as_ref(), &baseline_values);
        let values = schema.values.reconcile(&baseline_values);

        self.store
            .write(&table, ArtifactKind::Create, &schema_to_sql(&schema))?;
        self.store
            .write(&table, ArtifactKind::Values, &values_sql(&values))?;
        self.store.write(
            &table,
            ArtifactKind::Docs,
            &object_markdown(object, known_objects, &values),
        )?;

        info!(
            tables = schema.tables.len(),
            statements = plan.len(),
            "processed object"
        );

        Ok(ObjectReport {
            table,
            schema,
            plan,
            values,
        })
    }

    /// Process `objects` in order and write a single migration script
    /// covering every object that changed.
    pub fn process_all(
        &mut self,
        objects: &[ObjectDescriptor],
        known_objects: &HashSet<String>,
    ) -> Result<RunReport> {
        let mut report = RunReport::default();
        for object in objects {
            report.objects.push(self.process_object(object, known_objects)?);
        }

        let scripts: Vec<String> = report
            .objects
            .iter()
            .filter(|o| !o.plan.is_empty())
            .map(|o| o.plan.to_sql())
            .collect();

        if scripts.is_empty() {
            info!(objects = objects.len(), "no changes");
        } else {
            let path = self.store.write_updates(&scripts.join("\n"))?;
            info!(%path, changed = scripts.len(), "wrote migration script");
            report.updates = Some(path);
        }

        Ok(report)
    }

    /// The main table of the previous create artifact, if it is there and
    /// describes `table`.
    fn baseline_table(&self, table: &str) -> Result<Option<Table>> {
        let Some(text) = self.store.read(table, ArtifactKind::Create)? else {
            return Ok(None);
        };
        match parse_create_table(&text) {
            Some(parsed) if parsed.name == table => Ok(Some(parsed)),
            Some(parsed) => {
                debug!(found = %parsed.name, "previous artifact describes another table");
                Ok(None)
            }
            None => {
                debug!("previous artifact has no table definition");
                Ok(None)
            }
        }
    }
}
