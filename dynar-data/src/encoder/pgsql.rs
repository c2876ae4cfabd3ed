use super::DynamicEncoder;
use crate::codec;
use crate::value::Verbatim;

/// PostgreSQL `jsonb` columns (`jsonb_build_object` / `->` / `->>`).
///
/// Marker types are spelled the MariaDB way and mapped onto PostgreSQL
/// types by [`PgsqlEncoder::map_type`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PgsqlEncoder;

impl PgsqlEncoder {
    /// Map a marker type spelling onto a PostgreSQL type.
    pub fn map_type(sql_type: &str) -> String {
        let upper = sql_type.trim().to_ascii_uppercase();
        let (base, modifier) = match upper.find('(') {
            Some(pos) => (upper[..pos].trim(), Some(&upper[pos..])),
            None => (upper.as_str(), None),
        };
        match (base, modifier) {
            ("CHAR", None) => "TEXT".to_string(),
            ("CHAR", Some(m)) => format!("VARCHAR{m}"),
            ("BINARY", _) => "BYTEA".to_string(),
            ("DATETIME", Some(m)) => format!("TIMESTAMP{m}"),
            ("DATETIME", None) => "TIMESTAMP".to_string(),
            ("DOUBLE", _) => "DOUBLE PRECISION".to_string(),
            ("DECIMAL", Some(m)) => format!("NUMERIC{m}"),
            ("DECIMAL", None) => "NUMERIC".to_string(),
            ("INT" | "INTEGER" | "SIGNED INT" | "SIGNED INTEGER", _) => "INTEGER".to_string(),
            ("SIGNED" | "UNSIGNED" | "UNSIGNED INT" | "UNSIGNED INTEGER", _) => {
                "BIGINT".to_string()
            }
            (_, Some(m)) => format!("{base}{m}"),
            (_, None) => base.to_string(),
        }
    }
}

impl DynamicEncoder for PgsqlEncoder {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_column(&self, column: &str) -> String {
        format!("\"{}\"", column.replace('"', "\"\""))
    }

    fn accessor_step(&self, inner: &str, key: &str, sql_type: &str, last: bool) -> String {
        if last {
            format!("CAST(({inner} ->> {key}) AS {})", Self::map_type(sql_type))
        } else {
            format!("({inner} -> {key})")
        }
    }

    fn build_call(&self, args: &[String]) -> String {
        format!("jsonb_build_object({})", args.join(", "))
    }

    fn verbatim(&self, value: &Verbatim) -> String {
        match &value.sql_type {
            Some(t) => format!("CAST({} AS {})", value.sql, Self::map_type(t)),
            None => value.sql.clone(),
        }
    }

    fn read_expression(&self, column: &str) -> String {
        format!("CAST({column} AS TEXT)")
    }

    /// `jsonb` rejects U+0000, so strings holding NUL are wrapped as well.
    fn needs_binary_safety(&self, bytes: &[u8]) -> bool {
        codec::needs_binary_safety(bytes) || bytes.contains(&0)
    }
}
