//! Object descriptors and relational schema types for force2pg.
//!
//! This crate contains the types shared between schema derivation
//! (`force2pg::build`), snapshot parsing, and diffing:
//!
//! - the *source* side: [`ObjectDescriptor`] and [`FieldDescriptor`], as
//!   handed over by whatever fetched the object metadata;
//! - the *target* side: [`ColumnType`], [`Column`], [`Table`] and [`Schema`];
//! - the enumerated-value ledger ([`ValueLedger`], [`EnumeratedValueSet`]).
//!
//! # Naming Convention
//!
//! Every table and column name is derived from a source name with
//! [`derive_name`]: lower-case it, then strip one trailing [`CUSTOM_SUFFIX`].
//! `Custom_Deal__c` becomes `custom_deal`, `Stage__c` becomes `stage`.
//!
//! Auxiliary tables hang off the main table name:
//! - lookup tables are `<table>_<field>` ([`lookup_table_name`]),
//! - junction tables are `<table>_<field>_junction` ([`junction_table_name`]).

use indexmap::IndexMap;
use std::fmt;

mod ledger;
pub use ledger::*;

/// Marker appended by the source system to custom objects and fields.
pub const CUSTOM_SUFFIX: &str = "__c";

/// Derive a table or column name from a source object or field name.
///
/// Lower-cases first, so both `Stage__c` and `STAGE__C` become `stage`.
/// Only one marker is stripped.
///
/// # Examples
///
/// ```
/// use force2pg_schema::derive_name;
/// assert_eq!(derive_name("Account"), "account");
/// assert_eq!(derive_name("Custom_Deal__c"), "custom_deal");
/// assert_eq!(derive_name("Odd__c__c"), "odd__c");
/// ```
pub fn derive_name(source: &str) -> String {
    let lower = source.to_lowercase();
    match lower.strip_suffix(CUSTOM_SUFFIX) {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

/// Name of the lookup table holding the values of an enumeration field.
pub fn lookup_table_name(table: &str, field_column: &str) -> String {
    format!("{}_{}", table, field_column)
}

/// Name of the junction table linking a main table to a lookup table.
pub fn junction_table_name(table: &str, field_column: &str) -> String {
    format!("{}_junction", lookup_table_name(table, field_column))
}

/// Name of the integer column pointing into a lookup table (or main table).
pub fn id_column_name(name: &str) -> String {
    format!("{}_id", name)
}

/// Field types reported by the source system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Single-line text (`string`)
    Text,
    /// Multi-line text (`textarea`)
    TextArea,
    Boolean,
    /// Floating point number (`double`)
    Double,
    Currency,
    Date,
    DateTime,
    Email,
    Phone,
    Url,
    /// Lookup to another object (`reference`)
    Reference,
    /// Single value from a fixed list (`picklist`)
    Enumeration,
    /// Several values from a fixed list (`multipicklist`)
    MultiEnumeration,
    /// Anything else, kept verbatim.
    Other(String),
}

impl FieldType {
    /// Decode the raw type tag the source system reports.
    pub fn from_source(tag: &str) -> Self {
        match tag {
            "string" => FieldType::Text,
            "textarea" => FieldType::TextArea,
            "boolean" => FieldType::Boolean,
            "double" | "number" => FieldType::Double,
            "currency" => FieldType::Currency,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            "email" => FieldType::Email,
            "phone" => FieldType::Phone,
            "url" => FieldType::Url,
            "reference" => FieldType::Reference,
            "picklist" => FieldType::Enumeration,
            "multipicklist" => FieldType::MultiEnumeration,
            other => FieldType::Other(other.to_string()),
        }
    }

    /// The raw tag, as [`FieldType::from_source`] accepts it.
    pub fn as_source(&self) -> &str {
        match self {
            FieldType::Text => "string",
            FieldType::TextArea => "textarea",
            FieldType::Boolean => "boolean",
            FieldType::Double => "double",
            FieldType::Currency => "currency",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Url => "url",
            FieldType::Reference => "reference",
            FieldType::Enumeration => "picklist",
            FieldType::MultiEnumeration => "multipicklist",
            FieldType::Other(tag) => tag,
        }
    }

    /// Whether this is a single- or multi-valued enumeration.
    pub fn is_enumerated(&self) -> bool {
        matches!(self, FieldType::Enumeration | FieldType::MultiEnumeration)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_source())
    }
}

/// One allowed value of an enumeration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratedValue {
    /// The stored value
    pub value: String,
    /// Display label
    pub label: String,
}

impl EnumeratedValue {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

impl From<&str> for EnumeratedValue {
    fn from(value: &str) -> Self {
        Self::new(value, value)
    }
}

/// A field of a source object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Source field name (e.g. `Stage__c`)
    pub name: String,
    /// Source field type
    pub field_type: FieldType,
    /// Display label
    pub label: String,
    /// Allowed values, in declaration order (enumerations only)
    pub enumerated_values: Vec<EnumeratedValue>,
    /// Referenced object names (references only). Only the first is used.
    pub reference_targets: Vec<String>,
}

impl FieldDescriptor {
    /// Create a field with no label, values or reference targets.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            field_type,
            enumerated_values: Vec::new(),
            reference_targets: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_values<V: Into<EnumeratedValue>>(
        mut self,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.enumerated_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_reference_to(mut self, target: impl Into<String>) -> Self {
        self.reference_targets.push(target.into());
        self
    }

    /// The derived column name for this field.
    pub fn column_name(&self) -> String {
        derive_name(&self.name)
    }

    /// The reference target that drives schema shape.
    pub fn reference_target(&self) -> Option<&str> {
        self.reference_targets.first().map(String::as_str)
    }

    /// Whether this enumeration is large enough to get a lookup table.
    pub fn has_lookup_table(&self) -> bool {
        self.field_type.is_enumerated() && self.enumerated_values.len() > 2
    }
}

/// A source object and its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    /// Source object name (e.g. `Custom_Deal__c`)
    pub name: String,
    /// Fields, in source order
    pub fields: Vec<FieldDescriptor>,
}

impl ObjectDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// The derived main table name.
    pub fn table_name(&self) -> String {
        derive_name(&self.name)
    }
}

/// Postgres column types produced (or recognized) by force2pg.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// UUID
    Uuid,
    /// TEXT
    Text,
    /// BOOLEAN
    Boolean,
    /// NUMERIC (arbitrary precision)
    Numeric,
    /// DATE
    Date,
    /// TIMESTAMP
    Timestamp,
    /// INTEGER (4 bytes)
    Integer,
    /// SERIAL (auto-incrementing INTEGER)
    Serial,
    /// A type we don't produce, kept as the upper-cased token it was read from.
    Other(String),
}

impl ColumnType {
    /// Parse a type token, case-insensitively.
    ///
    /// Accepts the common Postgres aliases (`INT`, `INT4`, `BOOL`, `DECIMAL`,
    /// ...). Unknown tokens become [`ColumnType::Other`].
    pub fn from_sql(token: &str) -> Self {
        let upper = token.trim().to_uppercase();
        match upper.as_str() {
            "UUID" => ColumnType::Uuid,
            "TEXT" => ColumnType::Text,
            "BOOLEAN" | "BOOL" => ColumnType::Boolean,
            "NUMERIC" | "DECIMAL" => ColumnType::Numeric,
            "DATE" => ColumnType::Date,
            "TIMESTAMP" => ColumnType::Timestamp,
            "INTEGER" | "INT" | "INT4" => ColumnType::Integer,
            "SERIAL" | "SERIAL4" => ColumnType::Serial,
            _ => ColumnType::Other(upper),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Uuid => write!(f, "UUID"),
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Boolean => write!(f, "BOOLEAN"),
            ColumnType::Numeric => write!(f, "NUMERIC"),
            ColumnType::Date => write!(f, "DATE"),
            ColumnType::Timestamp => write!(f, "TIMESTAMP"),
            ColumnType::Integer => write!(f, "INTEGER"),
            ColumnType::Serial => write!(f, "SERIAL"),
            ColumnType::Other(token) => write!(f, "{}", token),
        }
    }
}

/// A table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Postgres type
    pub column_type: ColumnType,
    /// Whether this is (part of) the primary key
    pub primary_key: bool,
    /// Whether the column carries a foreign key
    pub foreign_key: bool,
    /// Referenced table, when known. The referenced column is always `id`.
    pub references: Option<String>,
    /// Whether the column is NOT NULL (outside of the primary key)
    pub not_null: bool,
    /// Whether the column has a UNIQUE constraint
    pub unique: bool,
}

impl Column {
    /// A plain nullable column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            foreign_key: false,
            references: None,
            not_null: false,
            unique: false,
        }
    }

    /// A primary key column.
    pub fn primary_key(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, column_type)
        }
    }

    /// Attach a foreign key to `table(id)`.
    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.foreign_key = true;
        self.references = Some(table.into());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Columns, in declaration order
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get a column by name, mutably.
    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Names of the primary key columns, in declaration order.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// The schema derived from one object: its main table, the auxiliary tables,
/// and the values of every lookup table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    /// Name of the main table
    pub main: String,
    /// Tables in emission order (main table first), indexed by name
    pub tables: IndexMap<String, Table>,
    /// Lookup table contents, indexed by lookup table name
    pub values: EnumeratedValueSet,
}

impl Schema {
    /// Create an empty schema whose main table will be `main`.
    pub fn new(main: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            ..Self::default()
        }
    }

    /// Add a table, keeping emission order.
    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    /// The main table.
    pub fn main_table(&self) -> Option<&Table> {
        self.tables.get(&self.main)
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Iterate over the auxiliary (lookup and junction) tables.
    pub fn auxiliary_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values().filter(|t| t.name != self.main)
    }
}
