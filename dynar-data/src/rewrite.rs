//! Query rewriting: attribute markers to accessor SQL.
//!
//! A query is rendered by [`QueryBuilder`] first, with markers still in the
//! text. [`QueryRewriter::rewrite`] then replaces every marker with a nested
//! accessor over the dynamic column, binding each path segment as a fresh
//! parameter. For `(!a.b|int!)` on MariaDB:
//!
//! ```text
//! COLUMN_GET(COLUMN_GET(`details`, :dcq1 AS CHAR), :dcq2 AS INT)
//! ```
//!
//! with `:dcq1 = "a"` and `:dcq2 = "b"`.

use crate::codec;
use crate::encoder::DynamicEncoder;
use crate::entity::ModelMeta;
use crate::error::DynamicError;
use crate::marker::{self, DEFAULT_TYPE};
use crate::params::{BoundParams, ParamValue, Placeholders, Statement};
use crate::query::{QueryBuilder, SelectItem};

/// Rewrites queries against one model's dynamic column.
#[derive(Debug, Clone)]
pub struct QueryRewriter<'m> {
    meta: &'m ModelMeta,
    column: &'m str,
    encoder: &'static dyn DynamicEncoder,
}

impl<'m> QueryRewriter<'m> {
    /// Fails if the model declares no dynamic column or its dialect has no
    /// encoder.
    pub fn new(meta: &'m ModelMeta) -> Result<Self, DynamicError> {
        let column = meta.dynamic_column_name()?;
        let encoder = meta.encoder()?;
        Ok(Self {
            meta,
            column,
            encoder,
        })
    }

    pub fn dynamic_column(&self) -> &str {
        self.column
    }

    pub fn encoder(&self) -> &'static dyn DynamicEncoder {
        self.encoder
    }

    /// The computed column that renders the blob as JSON text.
    pub fn read_expression(&self) -> String {
        self.encoder
            .read_expression(&self.encoder.quote_column(self.column))
    }

    /// Make sure the select list yields the dynamic column as decodable text.
    ///
    /// An empty or wildcard select gets the computed column appended. When
    /// the model declares its columns, the wildcard is expanded to them so
    /// the raw blob is not selected as well. A bare reference to the dynamic
    /// column in an explicit select is replaced by the computed column.
    /// Raw SQL queries are left alone. Calling this twice is a no-op.
    pub fn prepare_select(&self, query: &mut QueryBuilder) {
        if query.is_raw() || self.has_computed_column(query.select_items()) {
            return;
        }
        let items = query.select_items();
        let wildcard = items.is_empty() || items.iter().any(SelectItem::is_wildcard);
        let mut select: Vec<SelectItem> = Vec::with_capacity(items.len() + 1);
        if wildcard && !self.meta.column_names().is_empty() {
            if items.is_empty() {
                select.extend(self.declared_columns());
            }
            for item in items {
                if item.is_wildcard() {
                    select.extend(self.declared_columns());
                } else {
                    select.push(item.clone());
                }
            }
        } else if wildcard {
            if items.is_empty() {
                select.push(SelectItem::Column("*".to_string()));
            }
            select.extend(items.iter().cloned());
        } else {
            let mut replaced = false;
            for item in items {
                match item {
                    SelectItem::Column(c) if c == self.column => {
                        select.push(self.computed_column());
                        replaced = true;
                    }
                    other => select.push(other.clone()),
                }
            }
            query.set_select(select);
            if replaced {
                tracing::trace!(column = self.column, "replaced dynamic column in select list");
            }
            return;
        }
        select.push(self.computed_column());
        query.set_select(select);
    }

    /// Replace every attribute marker in `sql` with accessor SQL.
    ///
    /// Existing bindings in `params` are kept; new names are chosen so they
    /// never collide with them.
    pub fn rewrite(&self, sql: &str, params: BoundParams) -> Statement {
        let mut params = params;
        let mut placeholders = Placeholders::new(self.meta.query_param_prefix());
        let mut out = String::with_capacity(sql.len());
        let mut last = 0;
        let mut count = 0usize;
        for found in marker::markers(sql) {
            let cast = found.cast_type();
            let segments: Vec<&str> = found.segments().collect();
            let mut expr = self.encoder.quote_column(self.column);
            for (idx, segment) in segments.iter().enumerate() {
                let is_last = idx + 1 == segments.len();
                let name = placeholders.next_free(&params);
                let key = codec::encode_string(self.encoder, segment.as_bytes());
                params.insert(name.clone(), ParamValue::Text(key));
                let sql_type = if is_last { cast.as_str() } else { DEFAULT_TYPE };
                expr = self.encoder.accessor_step(&expr, &name, sql_type, is_last);
            }
            tracing::trace!(marker = found.text, path = found.path, "rewrote attribute marker");
            out.push_str(&sql[last..found.range.start]);
            out.push_str(&expr);
            last = found.range.end;
            count += 1;
        }
        out.push_str(&sql[last..]);
        if count > 0 {
            tracing::debug!(
                table = self.meta.table(),
                markers = count,
                params = params.len(),
                "rewrote dynamic attribute query"
            );
        }
        Statement::new(out, params)
    }

    /// Prepare, render and rewrite a SELECT.
    pub fn build(&self, mut query: QueryBuilder) -> Result<Statement, DynamicError> {
        self.prepare_select(&mut query);
        let rendered = query.build_select()?;
        Ok(self.rewrite(&rendered.sql, rendered.params))
    }

    /// Like [`build`](Self::build) but with the builder's identifier checks.
    pub fn build_checked(&self, mut query: QueryBuilder) -> Result<Statement, DynamicError> {
        self.prepare_select(&mut query);
        let rendered = query.build_select_checked()?;
        Ok(self.rewrite(&rendered.sql, rendered.params))
    }

    pub fn build_count(&self, query: &QueryBuilder) -> Result<Statement, DynamicError> {
        let rendered = query.build_count()?;
        Ok(self.rewrite(&rendered.sql, rendered.params))
    }

    fn computed_column(&self) -> SelectItem {
        SelectItem::Expr {
            sql: self.read_expression(),
            alias: self.column.to_string(),
        }
    }

    fn has_computed_column(&self, items: &[SelectItem]) -> bool {
        items
            .iter()
            .any(|item| matches!(item, SelectItem::Expr { alias, .. } if alias == self.column))
    }

    fn declared_columns(&self) -> impl Iterator<Item = SelectItem> + '_ {
        self.meta
            .column_names()
            .iter()
            .filter(|c| c.as_str() != self.column)
            .map(|c| SelectItem::Column(c.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Dialect;

    fn product() -> ModelMeta {
        ModelMeta::new("product")
            .columns(&["id", "name", "details"])
            .dynamic_column("details")
    }

    #[test]
    fn test_nested_marker_default_type() {
        let meta = product();
        let rw = QueryRewriter::new(&meta).unwrap();
        let stmt = rw.rewrite("SELECT (!a.b.c!) FROM product", BoundParams::new());
        assert_eq!(
            stmt.sql,
            "SELECT COLUMN_GET(COLUMN_GET(COLUMN_GET(`details`, :dcq1 AS CHAR), :dcq2 AS CHAR), :dcq3 AS CHAR) FROM product"
        );
        assert_eq!(stmt.params.get(":dcq1"), Some(&ParamValue::Text("a".into())));
        assert_eq!(stmt.params.get(":dcq2"), Some(&ParamValue::Text("b".into())));
        assert_eq!(stmt.params.get(":dcq3"), Some(&ParamValue::Text("c".into())));
    }

    #[test]
    fn test_type_applies_to_outermost_step() {
        let meta = product();
        let rw = QueryRewriter::new(&meta).unwrap();
        let stmt = rw.rewrite("(!price.retail|decimal(6,2)!) < 20", BoundParams::new());
        assert_eq!(
            stmt.sql,
            "COLUMN_GET(COLUMN_GET(`details`, :dcq1 AS CHAR), :dcq2 AS DECIMAL(6,2)) < 20"
        );
    }

    #[test]
    fn test_existing_params_are_kept() {
        let meta = product();
        let rw = QueryRewriter::new(&meta).unwrap();
        let params: BoundParams = [(":dcq1", "mine")].into_iter().collect();
        let stmt = rw.rewrite("(!x!) = :dcq1", params);
        assert_eq!(stmt.sql, "COLUMN_GET(`details`, :dcq2 AS CHAR) = :dcq1");
        assert_eq!(stmt.params.get(":dcq1"), Some(&ParamValue::Text("mine".into())));
        assert_eq!(stmt.params.get(":dcq2"), Some(&ParamValue::Text("x".into())));
    }

    #[test]
    fn test_backticked_marker_is_stripped() {
        let meta = product();
        let rw = QueryRewriter::new(&meta).unwrap();
        let stmt = rw.rewrite("ORDER BY `(!rank|int!)` DESC", BoundParams::new());
        assert_eq!(stmt.sql, "ORDER BY COLUMN_GET(`details`, :dcq1 AS INT) DESC");
        let one_sided = rw.rewrite("ORDER BY `(!rank|int!) DESC", BoundParams::new());
        assert_eq!(one_sided.sql, "ORDER BY `(!rank|int!) DESC");
    }

    #[test]
    fn test_malformed_marker_left_alone() {
        let meta = product();
        let rw = QueryRewriter::new(&meta).unwrap();
        let sql = "SELECT '(!a | int!)' FROM product";
        let stmt = rw.rewrite(sql, BoundParams::new());
        assert_eq!(stmt.sql, sql);
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_binary_segment_keys_are_wrapped() {
        let meta = product();
        let rw = QueryRewriter::new(&meta).unwrap();
        let stmt = rw.rewrite("(!data:application/octet-stream;base64,x!)", BoundParams::new());
        // The whole marker does not match: ':' and '/' are fine in children only.
        assert!(stmt.params.is_empty());
        let stmt = rw.rewrite("(!a.data:application/octet-stream;base64,x!)", BoundParams::new());
        match stmt.params.get(":dcq2") {
            Some(ParamValue::Text(key)) => assert!(key.starts_with(codec::BINARY_PREFIX)),
            other => panic!("unexpected binding: {other:?}"),
        }
    }

    #[test]
    fn test_missing_dynamic_column_fails_fast() {
        let meta = ModelMeta::new("plain").name("Plain");
        let err = QueryRewriter::new(&meta).unwrap_err();
        assert_eq!(
            err,
            DynamicError::MissingDynamicColumn {
                entity: "Plain".into()
            }
        );
    }

    #[test]
    fn test_prepare_select_expands_wildcard() {
        let meta = product();
        let rw = QueryRewriter::new(&meta).unwrap();
        let mut q = QueryBuilder::new("product");
        rw.prepare_select(&mut q);
        rw.prepare_select(&mut q);
        let stmt = q.build_select().unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT id, name, COLUMN_JSON(`details`) AS details FROM product"
        );
    }

    #[test]
    fn test_prepare_select_keeps_star_without_declared_columns() {
        let meta = ModelMeta::new("product").dynamic_column("details");
        let rw = QueryRewriter::new(&meta).unwrap();
        let mut q = QueryBuilder::new("product").select(&["*"]);
        rw.prepare_select(&mut q);
        assert_eq!(
            q.build_select().unwrap().sql,
            "SELECT *, COLUMN_JSON(`details`) AS details FROM product"
        );
    }

    #[test]
    fn test_prepare_select_replaces_bare_dynamic_column() {
        let meta = product();
        let rw = QueryRewriter::new(&meta).unwrap();
        let mut q = QueryBuilder::new("product").select(&["id", "details"]);
        rw.prepare_select(&mut q);
        assert_eq!(
            q.build_select().unwrap().sql,
            "SELECT id, COLUMN_JSON(`details`) AS details FROM product"
        );
        let mut q = QueryBuilder::new("product").select(&["id"]);
        rw.prepare_select(&mut q);
        assert_eq!(q.build_select().unwrap().sql, "SELECT id FROM product");
    }

    #[test]
    fn test_raw_query_still_rewritten() {
        let meta = product();
        let rw = QueryRewriter::new(&meta).unwrap();
        let q = QueryBuilder::from_sql(
            "product",
            "SELECT id FROM product WHERE (!color!) = :c",
            [(":c", "black")].into_iter().collect(),
        );
        let stmt = rw.build(q).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT id FROM product WHERE COLUMN_GET(`details`, :dcq1 AS CHAR) = :c"
        );
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_count_of_raw_query_is_rewritten() {
        let meta = product();
        let rw = QueryRewriter::new(&meta).unwrap();
        let q = QueryBuilder::from_sql(
            "product",
            "SELECT id FROM product WHERE (!color!) = :c",
            [(":c", "black")].into_iter().collect(),
        );
        let stmt = rw.build_count(&q).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) FROM (SELECT id FROM product WHERE COLUMN_GET(`details`, :dcq1 AS CHAR) = :c) AS counted"
        );
        assert_eq!(stmt.params.get(":c"), Some(&ParamValue::Text("black".into())));
        assert_eq!(stmt.params.get(":dcq1"), Some(&ParamValue::Text("color".into())));
    }

    #[test]
    fn test_build_postgres() {
        let meta = product().dialect(Dialect::Postgres);
        let rw = QueryRewriter::new(&meta).unwrap();
        let q = QueryBuilder::new("product")
            .dialect(Dialect::Postgres)
            .where_eq("(!price.retail|double!)", 12.5);
        let stmt = rw.build(q).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT id, name, CAST(\"details\" AS TEXT) AS details FROM product WHERE CAST(((\"details\" -> :dcq1) ->> :dcq2) AS DOUBLE PRECISION) = :qp1"
        );
        let names: Vec<_> = stmt.params.names().collect();
        assert_eq!(names, vec![":qp1", ":dcq1", ":dcq2"]);
    }
}
