//! SQL text primitives shared by rendering and snapshot parsing.
//!
//! Derived names are lower case and usually plain, so identifiers are only
//! quoted when Postgres would otherwise misread them (reserved words like
//! `order` or `user`, digits up front, anything outside `[a-z0-9_$]`).

/// Postgres' limit on identifier length, in bytes.
pub const PG_IDENT_MAX: usize = 63;

/// A PostgreSQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use force2pg_sql::Lit;
/// assert_eq!(format!("{}", Lit("foo")), "'foo'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// A PostgreSQL identifier wrapper.
///
/// Display writes the name bare when that is unambiguous, and double-quoted
/// (with embedded quotes doubled) otherwise.
///
/// # Example
/// ```
/// use force2pg_sql::Ident;
/// assert_eq!(format!("{}", Ident("account")), "account");
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.0.as_ref();
        if !needs_quoting(name) {
            return f.write_str(name);
        }
        write!(f, "\"")?;
        for c in name.chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Reserved key words that can't be used as bare column or table names.
const RESERVED: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "binary", "both", "case", "cast", "check", "collate", "collation",
    "column", "concurrently", "constraint", "create", "cross", "current_catalog",
    "current_date", "current_role", "current_schema", "current_time", "current_timestamp",
    "current_user", "default", "deferrable", "desc", "distinct", "do", "else", "end",
    "except", "false", "fetch", "for", "foreign", "freeze", "from", "full", "grant", "group",
    "having", "ilike", "in", "initially", "inner", "intersect", "into", "is", "isnull",
    "join", "lateral", "leading", "left", "like", "limit", "localtime", "localtimestamp",
    "natural", "not", "notnull", "null", "offset", "on", "only", "or", "order", "outer",
    "overlaps", "placing", "primary", "references", "returning", "right", "select",
    "session_user", "similar", "some", "symmetric", "system_user", "table", "tablesample",
    "then", "to", "trailing", "true", "union", "unique", "user", "using", "variadic",
    "verbose", "when", "where", "window", "with",
];

fn needs_quoting(name: &str) -> bool {
    let mut chars = name.chars();
    let plain_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let plain_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$');
    !(plain_start && plain_rest) || RESERVED.contains(&name)
}

/// Read a single-quoted literal from the start of `input`.
///
/// Returns the unescaped value and the rest of the input after the closing
/// quote, or `None` if `input` doesn't start with a complete literal.
///
/// # Example
/// ```
/// use force2pg_sql::read_literal;
/// assert_eq!(read_literal("'it''s');"), Some(("it's".to_string(), ");")));
/// assert_eq!(read_literal("'open"), None);
/// ```
pub fn read_literal(input: &str) -> Option<(String, &str)> {
    read_quoted(input, '\'')
}

/// Read a double-quoted identifier from the start of `input`.
///
/// Same contract as [`read_literal`], with `""` as the escaped quote.
///
/// # Example
/// ```
/// use force2pg_sql::read_identifier;
/// assert_eq!(read_identifier("\"Deal\" TEXT"), Some(("Deal".to_string(), " TEXT")));
/// ```
pub fn read_identifier(input: &str) -> Option<(String, &str)> {
    read_quoted(input, '"')
}

fn read_quoted(input: &str, quote: char) -> Option<(String, &str)> {
    let rest = input.strip_prefix(quote)?;
    let mut out = String::new();
    let mut chars = rest.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        if ch != quote {
            out.push(ch);
            continue;
        }
        // a doubled quote is an escaped quote
        if matches!(chars.peek(), Some((_, c)) if *c == quote) {
            chars.next();
            out.push(quote);
        } else {
            return Some((out, &rest[idx + 1..]));
        }
    }
    None
}

/// Name of the foreign key constraint on `table.column`.
///
/// Uses the convention `fk_{table}_{column}`. Names that would exceed
/// [`PG_IDENT_MAX`] are shortened and suffixed with a stable hash of the full
/// name, so they stay unique and deterministic.
///
/// # Examples
///
/// ```
/// use force2pg_sql::foreign_key_name;
/// assert_eq!(foreign_key_name("contact", "account"), "fk_contact_account");
/// assert!(foreign_key_name(&"x".repeat(80), "owner").len() <= 63);
/// ```
pub fn foreign_key_name(table: &str, column: &str) -> String {
    let full = format!("fk_{}_{}", table, column);
    if full.len() <= PG_IDENT_MAX {
        return full;
    }

    let hex = blake3::hash(full.as_bytes()).to_hex().to_string();
    let suffix = &hex[..16];

    // Keep the prefix, then "_" and the hash.
    let mut len = PG_IDENT_MAX - 1 - suffix.len();
    while len > 0 && !full.is_char_boundary(len) {
        len -= 1;
    }

    format!("{}_{}", &full[..len], suffix)
}
