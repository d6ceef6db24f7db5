//! Postgres schemas derived from object metadata, with incremental migrations.
//!
//! Given the description of an object (its fields, their types, their
//! allowed values and what they reference), force2pg derives a main table
//! plus the lookup and junction tables its enumerations need, and compares
//! that against what the previous run wrote to produce an ordered migration
//! plan.
//!
//! ```text
//! ObjectDescriptor ──build──> Schema ──┐
//!                                      ├──diff──> MigrationPlan
//! previous artifacts ──parse──> Table ─┘
//! ```
//!
//! The engine (`build`, `parse_*`, `diff`) is pure and never fails: unknown
//! field types fall back to TEXT, references to unknown objects lose their
//! foreign key, and unreadable baseline lines are skipped. Only the
//! [`Pipeline`] touches storage.
//!
//! # Lookup value ids
//!
//! Lookup rows are referenced by integer id, so ids are handed out once and
//! then carried from run to run through the values artifact. See
//! [`ValueLedger::reconcile`].
//!
//! # Example
//!
//! ```
//! use std::collections::HashSet;
//! use force2pg::{FieldDescriptor, FieldType, ObjectDescriptor, build, diff, EnumeratedValueSet};
//!
//! let deal = ObjectDescriptor::new("Custom_Deal__c").with_field(
//!     FieldDescriptor::new("Stage__c", FieldType::Enumeration).with_values(["Open", "Won", "Lost"]),
//! );
//! let schema = build(&deal, &HashSet::new());
//! assert!(schema.get_table("custom_deal_stage").is_some());
//!
//! // first run: nothing to compare against
//! let plan = diff(&schema, None, &EnumeratedValueSet::new());
//! assert_eq!(plan.len(), 2 + 3);
//! ```

mod builder;
pub mod config;
mod diff;
mod docs;
mod error;
pub mod logging;
mod pipeline;
mod render;
mod snapshot;
pub mod store;
mod typemap;

pub use builder::build;
pub use config::{Config, ConfigError};
pub use diff::{MigrationPlan, MigrationStatement, diff};
pub use docs::object_markdown;
pub use error::Error;
pub use pipeline::{ObjectReport, Pipeline, RunReport};
pub use render::{create_table_sql, schema_to_sql, values_sql};
pub use snapshot::{parse_create_table, parse_enumerated_baseline, parse_value_set};
pub use store::{ArtifactKind, ArtifactStore, DirStore, MemoryStore};
pub use typemap::map_type;

// Re-export the data model
pub use force2pg_schema::*;

pub type Result<T> = std::result::Result<T, Error>;
