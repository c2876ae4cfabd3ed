//! Named placeholders to driver placeholders.
//!
//! Statements carry `:name` placeholders; the drivers want `?` (MySQL) or
//! `$n` (PostgreSQL). Quoted strings and identifiers are copied untouched, as
//! are `::` casts and MariaDB's `:=`.

use dynar_data::{DataError, Dialect, ParamValue, Statement};
use std::collections::HashMap;

/// A statement ready for the driver: SQL plus values in bind order.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionalQuery {
    pub sql: String,
    pub values: Vec<ParamValue>,
}

/// Convert `statement` for `dialect`.
///
/// With `$n` placeholders a name used twice is bound once and referenced by
/// the same index; with `?` it is bound at every occurrence. A placeholder
/// without a binding is an error.
pub fn to_positional(statement: &Statement, dialect: Dialect) -> Result<PositionalQuery, DataError> {
    let sql = statement.sql.as_str();
    let bytes = sql.as_bytes();
    let numbered = matches!(dialect, Dialect::Postgres);
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut indices: HashMap<&str, usize> = HashMap::new();
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i = skip_quoted(bytes, i, quote);
            }
            b':' if bytes.get(i + 1) == Some(&b':') => {
                i += 2;
            }
            b':' if bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') => {
                let start = i;
                i += 1;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let name = &sql[start..i];
                let value = statement
                    .params
                    .get(name)
                    .ok_or_else(|| DataError::Other(format!("no value bound for placeholder `{name}`")))?;
                out.push_str(&sql[copied..start]);
                copied = i;
                if numbered {
                    let index = match indices.get(name) {
                        Some(index) => *index,
                        None => {
                            values.push(value.clone());
                            indices.insert(name, values.len());
                            values.len()
                        }
                    };
                    out.push_str(&dialect.placeholder(index));
                } else {
                    values.push(value.clone());
                    out.push_str(&dialect.placeholder(values.len()));
                }
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[copied..]);
    Ok(PositionalQuery { sql: out, values })
}

/// Index just past the closing quote. A doubled quote is an escaped quote,
/// and so is a backslash-escaped one inside string literals.
fn skip_quoted(bytes: &[u8], open: usize, quote: u8) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if quote != b'`' => i += 2,
            b if b == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}
