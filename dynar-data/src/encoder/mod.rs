//! Backend dialects for structured blob columns.
//!
//! Each backend that can store a nested map in one column provides an
//! encoder: how to build a blob value, how to reach into one, and how to
//! read it back as JSON text. The encoder is chosen once per model from its
//! [`Dialect`](crate::query::Dialect).

mod maria;
mod pgsql;

pub use maria::MariaEncoder;
pub use pgsql::PgsqlEncoder;

use crate::codec;
use crate::value::Verbatim;

/// SQL generation for one structured-blob backend.
pub trait DynamicEncoder: Send + Sync + 'static {
    /// Short backend name, for logs and errors.
    fn name(&self) -> &'static str;

    /// Quote a column name for use in generated SQL.
    fn quote_column(&self, column: &str) -> String;

    /// One step of a nested accessor: extract the value keyed by the
    /// `key` placeholder out of `inner`. `last` is set on the outermost step,
    /// the only one cast to `sql_type`; inner steps get the default type.
    fn accessor_step(&self, inner: &str, key: &str, sql_type: &str, last: bool) -> String;

    /// A build call over alternating key / value arguments.
    fn build_call(&self, args: &[String]) -> String;

    /// Inline SQL for a verbatim value.
    fn verbatim(&self, value: &Verbatim) -> String;

    /// Select-list expression rendering `column` (already quoted) as JSON text.
    fn read_expression(&self, column: &str) -> String;

    fn null_literal(&self) -> &'static str {
        "NULL"
    }

    /// Whether a string must go through the binary-safety prefix.
    fn needs_binary_safety(&self, bytes: &[u8]) -> bool {
        codec::needs_binary_safety(bytes)
    }
}

impl std::fmt::Debug for dyn DynamicEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DynamicEncoder({})", self.name())
    }
}
