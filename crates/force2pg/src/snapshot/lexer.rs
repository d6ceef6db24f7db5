//! Line tokenizer for persisted SQL artifacts.

use force2pg_sql::{read_identifier, read_literal};
use tracing::trace;

/// A token of one artifact line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    /// Keyword, bare identifier, type name or number
    Word(&'a str),
    /// Double-quoted identifier, unescaped
    Quoted(String),
    /// Single-quoted string literal, unescaped
    Literal(String),
    /// Any other character
    Punct(char),
}

impl Token<'_> {
    /// Whether this is the bare word `keyword`, ignoring case.
    pub(crate) fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    pub(crate) fn is_punct(&self, c: char) -> bool {
        matches!(self, Token::Punct(p) if *p == c)
    }

    /// The identifier this token names. Bare words fold to lower case the
    /// way Postgres folds unquoted identifiers.
    pub(crate) fn identifier(&self) -> Option<String> {
        match self {
            Token::Word(w) => Some(w.to_lowercase()),
            Token::Quoted(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub(crate) fn number(&self) -> Option<u32> {
        match self {
            Token::Word(w) => w.parse().ok(),
            _ => None,
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// The table named inside a string literal, as `pg_get_serial_sequence`
/// takes it: a quoted identifier, or a bare one that folds to lower case.
/// Only the last part of a qualified name is kept.
pub(crate) fn literal_identifier(text: &str) -> Option<String> {
    let last = match text.rfind('.') {
        Some(dot) if !text.starts_with('"') => &text[dot + 1..],
        _ => text,
    };
    if last.starts_with('"') {
        return match read_identifier(last)? {
            (name, "") => Some(name),
            _ => None,
        };
    }
    (!last.is_empty() && last.chars().all(is_word_char)).then(|| last.to_lowercase())
}

/// Split one line into tokens.
///
/// Stops at a `--` comment. An unterminated quote ends the line early, so
/// the classifier sees a truncated line and treats it as unrecognized.
pub(crate) fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = line;

    loop {
        rest = rest.trim_start();
        let Some(c) = rest.chars().next() else {
            break;
        };
        if rest.starts_with("--") {
            break;
        }

        match c {
            '\'' => match read_literal(rest) {
                Some((value, after)) => {
                    tokens.push(Token::Literal(value));
                    rest = after;
                }
                None => {
                    trace!(line, "unterminated string literal");
                    break;
                }
            },
            '"' => match read_identifier(rest) {
                Some((name, after)) => {
                    tokens.push(Token::Quoted(name));
                    rest = after;
                }
                None => {
                    trace!(line, "unterminated quoted identifier");
                    break;
                }
            },
            c if is_word_char(c) => {
                let end = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
                tokens.push(Token::Word(&rest[..end]));
                rest = &rest[end..];
            }
            c => {
                tokens.push(Token::Punct(c));
                rest = &rest[c.len_utf8()..];
            }
        }
    }

    tokens
}
