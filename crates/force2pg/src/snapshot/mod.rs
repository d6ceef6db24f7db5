//! Baseline recovery from previously written artifacts.
//!
//! Parsing is best effort and line oriented. Each line is tokenized and
//! classified on its own; lines that don't fit where they appear are skipped
//! (and traced), which at worst makes a column look absent so the differ adds
//! it again. Nothing in here fails.

mod lexer;

use indexmap::IndexMap;
use tracing::trace;

use crate::{Column, ColumnType, EnumeratedValueSet, MAX_VALUE_ID, Table, ValueLedger};
use lexer::{Token, tokenize};

/// What a single artifact line is.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// `CREATE TABLE <name> (`; `complete` when the statement ends on this line
    CreateTable { name: String, complete: bool },
    /// `<name> <TYPE> [PRIMARY KEY] [NOT NULL] [UNIQUE] [REFERENCES <t>(id)]`
    Column(Column),
    /// A table-level constraint inside a CREATE TABLE body
    TableConstraint(TableConstraint),
    /// `);`
    Close,
    /// `ALTER TABLE <t> ADD [CONSTRAINT <c>] FOREIGN KEY (<col>) REFERENCES <r>(...)`
    AlterForeignKey {
        table: String,
        column: String,
        references: String,
    },
    /// `INSERT INTO <t> [(...)] VALUES ([<id>,] '<value>')`
    Insert {
        table: String,
        id: Option<u32>,
        value: String,
    },
    /// `SELECT setval(pg_get_serial_sequence('<t>', '<col>'), <n>)`
    SetSequence { table: String, last: u32 },
    /// Nothing but whitespace or a comment
    Blank,
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TableConstraint {
    PrimaryKey(Vec<String>),
    ForeignKey { column: String, references: String },
    Other,
}

const TABLE_CONSTRAINT_KEYWORDS: &[&str] = &["CONSTRAINT", "PRIMARY", "FOREIGN", "UNIQUE", "CHECK"];

/// Walks the tokens of one line.
struct Cursor<'t, 'a> {
    tokens: &'t [Token<'a>],
    pos: usize,
}

impl<'t, 'a> Cursor<'t, 'a> {
    fn new(tokens: &'t [Token<'a>]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'t Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    /// Consume `keyword` if it is next.
    fn keyword(&mut self, keyword: &str) -> bool {
        let found = self.peek_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    /// Consume the keywords in order, or nothing.
    fn keywords(&mut self, keywords: &[&str]) -> bool {
        let matches = keywords
            .iter()
            .enumerate()
            .all(|(i, k)| self.tokens.get(self.pos + i).is_some_and(|t| t.is_keyword(k)));
        if matches {
            self.pos += keywords.len();
        }
        matches
    }

    fn punct(&mut self, c: char) -> bool {
        let found = self.peek().is_some_and(|t| t.is_punct(c));
        if found {
            self.pos += 1;
        }
        found
    }

    fn advance(&mut self) -> Option<&'t Token<'a>> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn identifier(&mut self) -> Option<String> {
        let name = self.peek()?.identifier()?;
        self.pos += 1;
        Some(name)
    }

    /// A possibly schema-qualified name; only the last part is kept.
    fn table_name(&mut self) -> Option<String> {
        let mut name = self.identifier()?;
        while self.punct('.') {
            name = self.identifier()?;
        }
        Some(name)
    }

    /// `( a, b, ... )`
    fn identifier_list(&mut self) -> Option<Vec<String>> {
        if !self.punct('(') {
            return None;
        }
        let mut names = vec![self.identifier()?];
        while self.punct(',') {
            names.push(self.identifier()?);
        }
        self.punct(')').then_some(names)
    }

    /// `REFERENCES <table>`, ignoring the referenced column list.
    fn references(&mut self) -> Option<String> {
        if !self.keyword("REFERENCES") {
            return None;
        }
        self.table_name()
    }

    fn ends_with(&self, c: char) -> bool {
        self.tokens.last().is_some_and(|t| t.is_punct(c))
    }
}

/// Where a line sits in the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    /// Between statements
    TopLevel,
    /// Inside a CREATE TABLE body
    Body,
}

/// Classify one line.
///
/// `alter`, `insert` and `select` are not reserved, so columns can be named
/// after them and are written bare. Inside a body those words start a column,
/// never a statement.
fn classify(text: &str, context: Context) -> Line {
    let tokens = tokenize(text);
    let mut cursor = Cursor::new(&tokens);

    if cursor.at_end() {
        return Line::Blank;
    }
    if cursor.punct(')') {
        return Line::Close;
    }

    let line = if cursor.peek_keyword("CREATE") {
        create_table(&mut cursor)
    } else if TABLE_CONSTRAINT_KEYWORDS.iter().any(|k| cursor.peek_keyword(k)) {
        Some(Line::TableConstraint(table_constraint(&mut cursor)))
    } else if context == Context::Body {
        column(&mut cursor).map(Line::Column)
    } else if cursor.peek_keyword("ALTER") {
        alter_foreign_key(&mut cursor)
    } else if cursor.peek_keyword("INSERT") {
        insert(&mut cursor)
    } else if cursor.peek_keyword("SELECT") {
        set_sequence(&mut cursor)
    } else {
        column(&mut cursor).map(Line::Column)
    };

    line.unwrap_or(Line::Unrecognized)
}

fn create_table(cursor: &mut Cursor<'_, '_>) -> Option<Line> {
    if !cursor.keywords(&["CREATE", "TABLE"]) {
        return None;
    }
    cursor.keywords(&["IF", "NOT", "EXISTS"]);
    let name = cursor.table_name()?;
    Some(Line::CreateTable {
        name,
        complete: cursor.ends_with(';'),
    })
}

fn alter_foreign_key(cursor: &mut Cursor<'_, '_>) -> Option<Line> {
    if !cursor.keywords(&["ALTER", "TABLE"]) {
        return None;
    }
    cursor.keyword("ONLY");
    let table = cursor.table_name()?;
    if !cursor.keyword("ADD") {
        return None;
    }
    if cursor.keyword("CONSTRAINT") {
        cursor.identifier()?;
    }
    if !cursor.keywords(&["FOREIGN", "KEY"]) {
        return None;
    }
    let mut columns = cursor.identifier_list()?;
    let references = cursor.references()?;
    if columns.len() != 1 {
        return None;
    }
    Some(Line::AlterForeignKey {
        table,
        column: columns.remove(0),
        references,
    })
}

fn insert(cursor: &mut Cursor<'_, '_>) -> Option<Line> {
    if !cursor.keywords(&["INSERT", "INTO"]) {
        return None;
    }
    let table = cursor.table_name()?;
    if cursor.peek().is_some_and(|t| t.is_punct('(')) {
        cursor.identifier_list()?;
    }
    if !cursor.keyword("VALUES") || !cursor.punct('(') {
        return None;
    }

    let (id, value) = match cursor.advance()? {
        Token::Literal(value) => (None, value.clone()),
        token => {
            let id = token.number()?;
            if !cursor.punct(',') {
                return None;
            }
            match cursor.advance()? {
                Token::Literal(value) => (Some(id), value.clone()),
                _ => return None,
            }
        }
    };

    cursor.punct(')').then_some(Line::Insert { table, id, value })
}

fn set_sequence(cursor: &mut Cursor<'_, '_>) -> Option<Line> {
    if !cursor.keywords(&["SELECT", "SETVAL"]) || !cursor.punct('(') {
        return None;
    }
    if !cursor.keyword("PG_GET_SERIAL_SEQUENCE") || !cursor.punct('(') {
        return None;
    }
    let table = match cursor.advance()? {
        Token::Literal(name) => lexer::literal_identifier(name)?,
        _ => return None,
    };
    if !cursor.punct(',') || !matches!(cursor.advance()?, Token::Literal(_)) {
        return None;
    }
    if !cursor.punct(')') || !cursor.punct(',') {
        return None;
    }
    let last = cursor.advance()?.number()?;
    cursor.punct(')').then_some(Line::SetSequence { table, last })
}

fn table_constraint(cursor: &mut Cursor<'_, '_>) -> TableConstraint {
    if cursor.keyword("CONSTRAINT") && cursor.identifier().is_none() {
        return TableConstraint::Other;
    }
    if cursor.keywords(&["PRIMARY", "KEY"]) {
        return cursor
            .identifier_list()
            .map_or(TableConstraint::Other, TableConstraint::PrimaryKey);
    }
    if cursor.keywords(&["FOREIGN", "KEY"]) {
        let parsed = cursor.identifier_list().and_then(|mut columns| {
            let references = cursor.references()?;
            (columns.len() == 1).then(|| TableConstraint::ForeignKey {
                column: columns.remove(0),
                references,
            })
        });
        return parsed.unwrap_or(TableConstraint::Other);
    }
    TableConstraint::Other
}

fn column(cursor: &mut Cursor<'_, '_>) -> Option<Column> {
    let name = cursor.identifier()?;
    let column_type = match cursor.advance()? {
        Token::Word(word) => ColumnType::from_sql(word),
        _ => return None,
    };
    let mut column = Column::new(name, column_type);

    while !cursor.at_end() {
        if cursor.keywords(&["PRIMARY", "KEY"]) {
            column.primary_key = true;
        } else if cursor.keywords(&["NOT", "NULL"]) {
            column.not_null = true;
        } else if cursor.keyword("UNIQUE") {
            column.unique = true;
        } else if let Some(target) = cursor.references() {
            column = column.references(target);
        } else {
            cursor.pos += 1;
        }
    }

    Some(column)
}

fn omitted(index: usize, text: &str, line: &Line) {
    trace!(line = index + 1, text, kind = ?line, "snapshot line omitted");
}

fn attach_foreign_key(table: &mut Table, column: &str, references: String) -> bool {
    match table.column_mut(column) {
        Some(c) => {
            c.foreign_key = true;
            c.references = Some(references);
            true
        }
        None => false,
    }
}

/// Recover the first table definition in a create artifact.
///
/// Returns `None` when the text holds no `CREATE TABLE` line at all. Foreign
/// keys added to that table by `ALTER TABLE` lines later in the artifact are
/// attached to their columns.
pub fn parse_create_table(text: &str) -> Option<Table> {
    let mut lines = text.lines().enumerate();

    let mut table = None;
    let mut in_body = false;
    for (index, raw) in lines.by_ref() {
        match classify(raw, Context::TopLevel) {
            Line::CreateTable { name, complete } => {
                table = Some(Table::new(name));
                in_body = !complete;
                break;
            }
            Line::Blank => {}
            other => omitted(index, raw, &other),
        }
    }
    let mut table = table?;

    if in_body {
        for (index, raw) in lines.by_ref() {
            match classify(raw, Context::Body) {
                Line::Column(column) if table.column(&column.name).is_none() => {
                    table.columns.push(column);
                }
                Line::TableConstraint(TableConstraint::PrimaryKey(columns)) => {
                    for name in columns {
                        if let Some(c) = table.column_mut(&name) {
                            c.primary_key = true;
                        }
                    }
                }
                Line::TableConstraint(TableConstraint::ForeignKey { column, references }) => {
                    if !attach_foreign_key(&mut table, &column, references) {
                        trace!(line = index + 1, column, "foreign key on unknown column");
                    }
                }
                Line::Close => break,
                Line::Blank => {}
                other @ Line::CreateTable { .. } => {
                    // unterminated body, the next table starts here
                    omitted(index, raw, &other);
                    break;
                }
                other => omitted(index, raw, &other),
            }
        }
    }

    for (index, raw) in lines {
        if let Line::AlterForeignKey {
            table: target,
            column,
            references,
        } = classify(raw, Context::TopLevel)
        {
            if target == table.name && !attach_foreign_key(&mut table, &column, references) {
                trace!(line = index + 1, column, "foreign key on unknown column");
            }
        }
    }

    Some(table)
}

/// Recover every lookup table ledger from a values artifact.
///
/// Rows with an explicit id keep it, unless the id is outside the SERIAL
/// range. A `setval` line restores the table's high-water mark, so ids of
/// deleted values stay used. Legacy rows that only carry a value are numbered
/// after both.
pub fn parse_value_set(text: &str) -> EnumeratedValueSet {
    #[derive(Default)]
    struct Rows {
        explicit: Vec<(u32, String)>,
        legacy: Vec<String>,
        high_water: u32,
    }
    let mut rows: IndexMap<String, Rows> = IndexMap::new();

    for (index, raw) in text.lines().enumerate() {
        match classify(raw, Context::TopLevel) {
            Line::Insert { table, id, value } => {
                let entry = rows.entry(table).or_default();
                match id {
                    Some(id) if id <= MAX_VALUE_ID => entry.explicit.push((id, value)),
                    Some(id) => {
                        trace!(line = index + 1, id, "id outside the SERIAL range, renumbered");
                        entry.legacy.push(value);
                    }
                    None => entry.legacy.push(value),
                }
            }
            Line::SetSequence { table, last } => {
                let entry = rows.entry(table).or_default();
                entry.high_water = entry.high_water.max(last);
            }
            Line::Blank => {}
            other => omitted(index, raw, &other),
        }
    }

    let mut set = EnumeratedValueSet::new();
    for (table, rows) in rows {
        let mut ledger = ValueLedger::new();
        for (id, value) in rows.explicit {
            ledger.insert(value, id);
        }
        ledger.raise_high_water(rows.high_water);
        for value in rows.legacy {
            ledger.push(value);
        }
        set.insert(table, ledger);
    }
    set
}

/// Recover the ledger of one lookup table from a values artifact.
///
/// Empty when the table has no rows in `text`.
pub fn parse_enumerated_baseline(text: &str, table: &str) -> ValueLedger {
    parse_value_set(text).get(table).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_lines() {
        assert_eq!(
            classify("CREATE TABLE IF NOT EXISTS public.account (", Context::TopLevel),
            Line::CreateTable {
                name: "account".to_string(),
                complete: false
            }
        );
        assert_eq!(classify(");", Context::TopLevel), Line::Close);
        assert_eq!(classify("   ", Context::TopLevel), Line::Blank);
        assert_eq!(classify("-- values for account", Context::TopLevel), Line::Blank);
        assert_eq!(
            classify("PRIMARY KEY (deal_id, tags_id)", Context::TopLevel),
            Line::TableConstraint(TableConstraint::PrimaryKey(vec![
                "deal_id".to_string(),
                "tags_id".to_string()
            ]))
        );
        assert_eq!(
            classify("CONSTRAINT chk CHECK (x > 0),", Context::TopLevel),
            Line::TableConstraint(TableConstraint::Other)
        );
        assert_eq!(classify("'x'", Context::TopLevel), Line::Unrecognized);
    }

    #[test]
    fn test_classify_alter_foreign_key() {
        assert_eq!(
            classify("ALTER TABLE custom_deal ADD CONSTRAINT fk_custom_deal_stage_id FOREIGN KEY (stage_id) REFERENCES custom_deal_stage(id);", Context::TopLevel),
            Line::AlterForeignKey {
                table: "custom_deal".to_string(),
                column: "stage_id".to_string(),
                references: "custom_deal_stage".to_string(),
            }
        );
        assert_eq!(
            classify("ALTER TABLE deal ADD COLUMN x TEXT;", Context::TopLevel),
            Line::Unrecognized
        );
    }

    #[test]
    fn test_classify_inserts() {
        assert_eq!(
            classify("INSERT INTO deal_stage (id, value) VALUES (2, 'Won') ON CONFLICT (value) DO NOTHING;", Context::TopLevel),
            Line::Insert {
                table: "deal_stage".to_string(),
                id: Some(2),
                value: "Won".to_string(),
            }
        );
        assert_eq!(
            classify("INSERT INTO deal_stage (value) VALUES ('Won');", Context::TopLevel),
            Line::Insert {
                table: "deal_stage".to_string(),
                id: None,
                value: "Won".to_string(),
            }
        );
        assert_eq!(
            classify("INSERT INTO deal_stage (id, value) VALUES (2, Won);", Context::TopLevel),
            Line::Unrecognized
        );
    }

    #[test]
    fn test_statement_words_inside_body_are_columns() {
        assert_eq!(
            classify("    alter TEXT,", Context::Body),
            Line::Column(Column::new("alter", ColumnType::Text))
        );
        assert_eq!(classify("    alter TEXT,", Context::TopLevel), Line::Unrecognized);
        assert_eq!(
            classify("select UUID REFERENCES account(id)", Context::Body),
            Line::Column(Column::new("select", ColumnType::Uuid).references("account"))
        );
    }

    #[test]
    fn test_columns_named_after_statement_words_round_trip() {
        let mut table = Table::new("account").with_column(Column::primary_key("id", ColumnType::Uuid));
        for name in [
            "alter", "insert", "select", "setval", "create", "primary", "foreign", "unique",
            "check", "constraint", "key", "values", "table",
        ] {
            table.columns.push(Column::new(name, ColumnType::Text));
        }
        let parsed = parse_create_table(&crate::create_table_sql(&table)).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn test_classify_set_sequence() {
        assert_eq!(
            classify(
                "SELECT setval(pg_get_serial_sequence('custom_deal_stage', 'id'), 7);",
                Context::TopLevel
            ),
            Line::SetSequence {
                table: "custom_deal_stage".to_string(),
                last: 7,
            }
        );
        assert_eq!(
            classify("SELECT setval('deal_stage_id_seq', 7);", Context::TopLevel),
            Line::Unrecognized
        );
    }

    #[test]
    fn test_parse_round_trip_columns() {
        let text = "\
CREATE TABLE deal (
    id UUID PRIMARY KEY,
    name TEXT,
    status_id INTEGER REFERENCES deal_status(id)
);
";
        let table = parse_create_table(text).unwrap();
        assert_eq!(table.name, "deal");
        assert_eq!(
            table.columns,
            vec![
                Column::primary_key("id", ColumnType::Uuid),
                Column::new("name", ColumnType::Text),
                Column::new("status_id", ColumnType::Integer).references("deal_status"),
            ]
        );
    }

    #[test]
    fn test_parse_attaches_foreign_keys_from_alter_lines() {
        let text = "\
CREATE TABLE custom_deal (
    id UUID PRIMARY KEY,
    stage_id INTEGER
);

CREATE TABLE custom_deal_stage (
    id SERIAL PRIMARY KEY,
    value TEXT NOT NULL UNIQUE
);

ALTER TABLE custom_deal ADD CONSTRAINT fk_custom_deal_stage_id FOREIGN KEY (stage_id) REFERENCES custom_deal_stage(id);
ALTER TABLE custom_deal_stage ADD CONSTRAINT fk_x FOREIGN KEY (value) REFERENCES elsewhere(id);
ALTER TABLE custom_deal ADD CONSTRAINT fk_y FOREIGN KEY (missing) REFERENCES elsewhere(id);
";
        let table = parse_create_table(text).unwrap();
        assert_eq!(table.columns.len(), 2);
        let stage = table.column("stage_id").unwrap();
        assert!(stage.foreign_key);
        assert_eq!(stage.references.as_deref(), Some("custom_deal_stage"));
    }

    #[test]
    fn test_parse_tolerates_malformed_lines() {
        let text = "\
-- generated
CREATE TABLE account (
    id UUID PRIMARY KEY,
    ???
    'garbage',
    name text,
    name INTEGER,
    score NUMERIC(10, 2),
    PRIMARY KEY (id)
);
";
        let table = parse_create_table(text).unwrap();
        assert_eq!(
            table.columns,
            vec![
                Column::primary_key("id", ColumnType::Uuid),
                Column::new("name", ColumnType::Text),
                Column::new("score", ColumnType::Numeric),
            ]
        );
    }

    #[test]
    fn test_parse_composite_primary_key() {
        let text = "\
CREATE TABLE deal_tags_junction (
    deal_id UUID REFERENCES deal(id),
    tags_id INTEGER REFERENCES deal_tags(id),
    PRIMARY KEY (deal_id, tags_id)
);";
        let table = parse_create_table(text).unwrap();
        assert_eq!(table.primary_key_columns(), vec!["deal_id", "tags_id"]);
        assert!(table.columns.iter().all(|c| c.foreign_key));
    }

    #[test]
    fn test_parse_unterminated_body_stops_at_next_table() {
        let text = "\
CREATE TABLE deal (
    id UUID PRIMARY KEY,
CREATE TABLE deal_stage (
    value TEXT
);";
        let table = parse_create_table(text).unwrap();
        assert_eq!(table.columns.len(), 1);
    }

    #[test]
    fn test_parse_single_line_table_has_no_columns() {
        let text = "CREATE TABLE deal (id UUID PRIMARY KEY);\nCREATE TABLE other (\n  x TEXT\n);";
        let table = parse_create_table(text).unwrap();
        assert_eq!(table.name, "deal");
        assert!(table.columns.is_empty());
    }

    #[test]
    fn test_parse_without_create_is_not_found() {
        assert_eq!(parse_create_table(""), None);
        assert_eq!(parse_create_table("-- nothing here\nSELECT 1;"), None);
    }

    #[test]
    fn test_parse_value_set_groups_by_table() {
        let text = "\
INSERT INTO deal_stage (id, value) VALUES (1, 'Open');
INSERT INTO deal_stage (id, value) VALUES (4, 'Won');

INSERT INTO deal_region (id, value) VALUES (1, 'EMEA');
not an insert
";
        let set = parse_value_set(text);
        assert_eq!(set.len(), 2);
        let stage: Vec<_> = set.get("deal_stage").unwrap().iter().collect();
        assert_eq!(stage, vec![(1, "Open"), (4, "Won")]);
        assert_eq!(set.get("deal_region").unwrap().id_of("EMEA"), Some(1));
    }

    #[test]
    fn test_legacy_rows_numbered_after_explicit_ids() {
        let text = "\
INSERT INTO deal_stage (value) VALUES ('Lost');
INSERT INTO deal_stage (id, value) VALUES (7, 'Open');
";
        let ledger = parse_enumerated_baseline(text, "deal_stage");
        assert_eq!(ledger.id_of("Open"), Some(7));
        assert_eq!(ledger.id_of("Lost"), Some(8));
    }

    #[test]
    fn test_set_sequence_keeps_deleted_ids_used() {
        let text = "\
INSERT INTO deal_stage (id, value) VALUES (1, 'Open');
INSERT INTO deal_stage (id, value) VALUES (2, 'Won');
SELECT setval(pg_get_serial_sequence('deal_stage', 'id'), 4);
INSERT INTO deal_stage (value) VALUES ('Lost');
";
        let ledger = parse_enumerated_baseline(text, "deal_stage");
        assert_eq!(ledger.id_of("Lost"), Some(5));
        assert_eq!(ledger.high_water(), 5);
    }

    #[test]
    fn test_ids_outside_serial_range_are_renumbered() {
        let text = "\
INSERT INTO deal_stage (id, value) VALUES (4294967295, 'A');
INSERT INTO deal_stage (id, value) VALUES (2, 'B');
SELECT setval(pg_get_serial_sequence('deal_stage', 'id'), 4294967295);
";
        let ledger = parse_enumerated_baseline(text, "deal_stage");
        assert_eq!(ledger.id_of("B"), Some(2));
        assert!(ledger.id_of("A").is_some_and(|id| id <= MAX_VALUE_ID));
        assert!(ledger.high_water() <= MAX_VALUE_ID);
    }

    #[test]
    fn test_enumerated_baseline_for_missing_table_is_empty() {
        let text = "INSERT INTO deal_stage (id, value) VALUES (1, 'Open');";
        assert!(parse_enumerated_baseline(text, "deal_region").is_empty());
        assert!(parse_enumerated_baseline("", "deal_stage").is_empty());
    }

    #[test]
    fn test_escaped_values_are_unescaped() {
        let text = "INSERT INTO deal_owner (id, value) VALUES (1, 'O''Brien');";
        let ledger = parse_enumerated_baseline(text, "deal_owner");
        assert!(ledger.contains("O'Brien"));
    }
}
