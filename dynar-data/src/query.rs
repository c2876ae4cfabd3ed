use crate::encoder::{DynamicEncoder, MariaEncoder, PgsqlEncoder};
use crate::error::DynamicError;
use crate::marker;
use crate::params::{BoundParams, ParamValue, Placeholders, Statement};
use std::str::FromStr;

/// A fluent query builder for constructing SELECT queries.
///
/// Values are bound under named placeholders (`:qp1`, `:qp2`, ...). Dynamic
/// attributes can be used wherever a column can, written as markers:
///
/// ```ignore
/// let q = QueryBuilder::new("product")
///     .where_eq("category", "shirt")
///     .where_eq("(!color!)", "black")
///     .where_raw("(!price.retail|decimal(6,2)!) < 20.00", BoundParams::new())
///     .order_by("(!price.retail|decimal(6,2)!)", true)
///     .limit(10);
/// let statement = q.build_select()?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Generic SQL using `?` placeholders (default).
    Generic,
    /// SQLite-style `?` placeholders.
    Sqlite,
    /// MySQL/MariaDB-style `?` placeholders with backtick quoting.
    MySql,
    /// Postgres-style `$1, $2, ...` placeholders.
    Postgres,
}

impl Dialect {
    /// Positional placeholder for the driver, 1-based.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Generic | Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    pub fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => '"',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Generic => "generic",
            Dialect::Sqlite => "sqlite",
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
        }
    }

    /// The structured-blob encoder for this dialect.
    pub fn dynamic_encoder(self) -> Result<&'static dyn DynamicEncoder, DynamicError> {
        match self {
            Dialect::MySql => Ok(&MariaEncoder),
            Dialect::Postgres => Ok(&PgsqlEncoder),
            Dialect::Generic | Dialect::Sqlite => Err(DynamicError::UnsupportedBackend {
                dialect: self.name().to_string(),
            }),
        }
    }
}

impl FromStr for Dialect {
    type Err = DynamicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" => Ok(Dialect::Generic),
            "sqlite" => Ok(Dialect::Sqlite),
            "mysql" | "mariadb" | "maria" => Ok(Dialect::MySql),
            "postgres" | "postgresql" | "pgsql" => Ok(Dialect::Postgres),
            other => Err(DynamicError::UnsupportedBackend {
                dialect: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum IdentifierPolicy {
    /// Do not validate or quote identifiers (legacy behavior).
    Raw,
    /// Validate identifiers against a conservative pattern.
    Validate,
    /// Validate and quote identifiers using the dialect quoting style.
    Quote,
}

/// One entry of the select list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// A column, a wildcard, or any expression written as text.
    Column(String),
    /// A computed expression with an alias.
    Expr { sql: String, alias: String },
}

impl SelectItem {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, SelectItem::Column(c) if c == "*" || c.ends_with(".*"))
    }
}

pub const DEFAULT_PARAM_PREFIX: &str = ":qp";

/// Alias of the derived table wrapped by [`QueryBuilder::build_count`].
const COUNT_ALIAS: &str = "counted";

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    select: Vec<SelectItem>,
    raw: Option<Statement>,
    conditions: Vec<Condition>,
    group: Vec<String>,
    having: Vec<(String, BoundParams)>,
    order: Vec<(String, bool)>,
    limit_val: Option<u64>,
    offset_val: Option<u64>,
    dialect: Dialect,
    identifier_policy: IdentifierPolicy,
    param_prefix: String,
}

#[derive(Debug, Clone)]
enum Condition {
    Eq(String, ParamValue),
    NotEq(String, ParamValue),
    Like(String, ParamValue),
    Gt(String, ParamValue),
    Lt(String, ParamValue),
    In(String, Vec<ParamValue>),
    IsNull(String),
    IsNotNull(String),
    Raw(String, BoundParams),
}

impl QueryBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            select: Vec::new(),
            raw: None,
            conditions: Vec::new(),
            group: Vec::new(),
            having: Vec::new(),
            order: Vec::new(),
            limit_val: None,
            offset_val: None,
            dialect: Dialect::Generic,
            identifier_policy: IdentifierPolicy::Raw,
            param_prefix: DEFAULT_PARAM_PREFIX.to_string(),
        }
    }

    /// Create a new builder with an explicit SQL dialect.
    pub fn new_with_dialect(table: &str, dialect: Dialect) -> Self {
        Self::new(table).dialect(dialect)
    }

    /// A query given as complete SQL. Select-list handling is skipped, but
    /// attribute markers in `sql` are still rewritten.
    pub fn from_sql(table: &str, sql: &str, params: BoundParams) -> Self {
        let mut builder = Self::new(table);
        builder.raw = Some(Statement::new(sql, params));
        builder
    }

    /// Set the SQL dialect (affects quoting).
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Configure identifier validation/quoting behavior.
    pub fn identifier_policy(mut self, policy: IdentifierPolicy) -> Self {
        self.identifier_policy = policy;
        self
    }

    /// Prefix of the placeholders generated for condition values.
    pub fn param_prefix(mut self, prefix: &str) -> Self {
        self.param_prefix = prefix.to_string();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn select_items(&self) -> &[SelectItem] {
        &self.select
    }

    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }

    /// Replace the select list with the given columns or expressions.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.select = columns
            .iter()
            .map(|c| SelectItem::Column(c.to_string()))
            .collect();
        self
    }

    /// Add `sql AS alias` to the select list.
    pub fn select_expr(mut self, sql: &str, alias: &str) -> Self {
        self.push_select_expr(sql, alias);
        self
    }

    pub(crate) fn push_select_expr(&mut self, sql: &str, alias: &str) {
        self.select.push(SelectItem::Expr {
            sql: sql.to_string(),
            alias: alias.to_string(),
        });
    }

    pub(crate) fn set_select(&mut self, items: Vec<SelectItem>) {
        self.select = items;
    }

    pub fn where_eq(mut self, column: &str, value: impl Into<ParamValue>) -> Self {
        self.conditions
            .push(Condition::Eq(column.to_string(), value.into()));
        self
    }

    pub fn where_not_eq(mut self, column: &str, value: impl Into<ParamValue>) -> Self {
        self.conditions
            .push(Condition::NotEq(column.to_string(), value.into()));
        self
    }

    pub fn where_like(mut self, column: &str, pattern: &str) -> Self {
        self.conditions
            .push(Condition::Like(column.to_string(), pattern.into()));
        self
    }

    pub fn where_gt(mut self, column: &str, value: impl Into<ParamValue>) -> Self {
        self.conditions
            .push(Condition::Gt(column.to_string(), value.into()));
        self
    }

    pub fn where_lt(mut self, column: &str, value: impl Into<ParamValue>) -> Self {
        self.conditions
            .push(Condition::Lt(column.to_string(), value.into()));
        self
    }

    pub fn where_in<V: Into<ParamValue> + Clone>(mut self, column: &str, values: &[V]) -> Self {
        self.conditions.push(Condition::In(
            column.to_string(),
            values.iter().cloned().map(Into::into).collect(),
        ));
        self
    }

    pub fn where_null(mut self, column: &str) -> Self {
        self.conditions
            .push(Condition::IsNull(column.to_string()));
        self
    }

    pub fn where_not_null(mut self, column: &str) -> Self {
        self.conditions
            .push(Condition::IsNotNull(column.to_string()));
        self
    }

    /// A condition written as SQL with its own named bindings.
    pub fn where_raw(mut self, sql: &str, params: BoundParams) -> Self {
        self.conditions
            .push(Condition::Raw(sql.to_string(), params));
        self
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.group.push(column.to_string());
        self
    }

    pub fn having_raw(mut self, sql: &str, params: BoundParams) -> Self {
        self.having.push((sql.to_string(), params));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push((column.to_string(), ascending));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_val = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset_val = Some(offset);
        self
    }

    /// Build the SELECT query. Markers are left in place for the rewriter.
    ///
    /// Fails if two raw clauses bind the same name to different values.
    pub fn build_select(&self) -> Result<Statement, DynamicError> {
        if let Some(raw) = &self.raw {
            return Ok(raw.clone());
        }
        self.render_select(&raw_identifier)
    }

    /// Build the SELECT query with validated identifiers.
    ///
    /// This method rejects invalid identifiers and optionally quotes them
    /// (depending on `identifier_policy`). Attribute markers count as valid
    /// identifiers.
    pub fn build_select_checked(&self) -> Result<Statement, DynamicError> {
        if let Some(raw) = &self.raw {
            return Ok(raw.clone());
        }
        self.render_select(&|s: &str| self.format_identifier_checked(s, false, "column"))
    }

    /// Build a COUNT query over the rows this query selects.
    ///
    /// Raw SQL and grouped queries are counted as a derived table. Order,
    /// limit and offset are ignored.
    pub fn build_count(&self) -> Result<Statement, DynamicError> {
        if let Some(raw) = &self.raw {
            return Ok(Statement::new(
                format!("SELECT COUNT(*) FROM ({}) AS {COUNT_ALIAS}", raw.sql),
                raw.params.clone(),
            ));
        }
        if self.group.is_empty() && self.having.is_empty() {
            return self.render("COUNT(*)", &raw_identifier);
        }
        let inner = self.render("1", &raw_identifier)?;
        Ok(Statement::new(
            format!("SELECT COUNT(*) FROM ({}) AS {COUNT_ALIAS}", inner.sql),
            inner.params,
        ))
    }

    fn render_select(
        &self,
        ident: &dyn Fn(&str) -> Result<String, DynamicError>,
    ) -> Result<Statement, DynamicError> {
        let columns = self.render_select_list(ident)?;
        let mut statement = self.render(&columns, ident)?;
        self.append_order(&mut statement.sql, ident)?;
        self.append_limit_offset(&mut statement.sql);
        Ok(statement)
    }

    /// `SELECT <columns> FROM <table>` with the WHERE, GROUP BY and HAVING
    /// clauses.
    fn render(
        &self,
        columns: &str,
        ident: &dyn Fn(&str) -> Result<String, DynamicError>,
    ) -> Result<Statement, DynamicError> {
        let table = ident(&self.table)?;
        let mut sql = format!("SELECT {columns} FROM {table}");
        // Caller-named bindings go in first so generated names avoid them.
        let mut params = self.raw_params()?;
        let mut placeholders = Placeholders::new(&self.param_prefix);
        self.append_where(&mut sql, &mut params, &mut placeholders, ident)?;
        self.append_group(&mut sql, ident)?;
        Ok(Statement::new(sql, params))
    }

    fn raw_params(&self) -> Result<BoundParams, DynamicError> {
        let mut params = BoundParams::new();
        for cond in &self.conditions {
            if let Condition::Raw(_, raw_params) = cond {
                params.merge(raw_params.clone())?;
            }
        }
        for (_, having_params) in &self.having {
            params.merge(having_params.clone())?;
        }
        Ok(params)
    }

    fn render_select_list(
        &self,
        ident: &dyn Fn(&str) -> Result<String, DynamicError>,
    ) -> Result<String, DynamicError> {
        if self.select.is_empty() {
            return Ok("*".to_string());
        }
        let mut out = Vec::with_capacity(self.select.len());
        for item in &self.select {
            match item {
                SelectItem::Column(c) if item.is_wildcard() => out.push(c.clone()),
                SelectItem::Column(c) => out.push(ident(c)?),
                SelectItem::Expr { sql, alias } => out.push(format!("{sql} AS {}", ident(alias)?)),
            }
        }
        Ok(out.join(", "))
    }

    fn append_where(
        &self,
        sql: &mut String,
        params: &mut BoundParams,
        placeholders: &mut Placeholders,
        ident: &dyn Fn(&str) -> Result<String, DynamicError>,
    ) -> Result<(), DynamicError> {
        if self.conditions.is_empty() {
            return Ok(());
        }
        sql.push_str(" WHERE ");
        let mut first = true;
        for cond in &self.conditions {
            if !first {
                sql.push_str(" AND ");
            }
            first = false;
            match cond {
                Condition::Eq(col, val) => {
                    let col = ident(col)?;
                    let ph = bind(placeholders, params, val);
                    sql.push_str(&format!("{col} = {ph}"));
                }
                Condition::NotEq(col, val) => {
                    let col = ident(col)?;
                    let ph = bind(placeholders, params, val);
                    sql.push_str(&format!("{col} != {ph}"));
                }
                Condition::Like(col, pat) => {
                    let col = ident(col)?;
                    let ph = bind(placeholders, params, pat);
                    sql.push_str(&format!("{col} LIKE {ph}"));
                }
                Condition::Gt(col, val) => {
                    let col = ident(col)?;
                    let ph = bind(placeholders, params, val);
                    sql.push_str(&format!("{col} > {ph}"));
                }
                Condition::Lt(col, val) => {
                    let col = ident(col)?;
                    let ph = bind(placeholders, params, val);
                    sql.push_str(&format!("{col} < {ph}"));
                }
                Condition::In(col, vals) => {
                    let col = ident(col)?;
                    let phs: Vec<_> = vals
                        .iter()
                        .map(|v| bind(placeholders, params, v))
                        .collect();
                    sql.push_str(&format!("{col} IN ({})", phs.join(", ")));
                }
                Condition::IsNull(col) => {
                    let col = ident(col)?;
                    sql.push_str(&format!("{col} IS NULL"));
                }
                Condition::IsNotNull(col) => {
                    let col = ident(col)?;
                    sql.push_str(&format!("{col} IS NOT NULL"));
                }
                Condition::Raw(raw, _) => {
                    sql.push_str(&format!("({raw})"));
                }
            }
        }
        Ok(())
    }

    fn append_group(
        &self,
        sql: &mut String,
        ident: &dyn Fn(&str) -> Result<String, DynamicError>,
    ) -> Result<(), DynamicError> {
        if !self.group.is_empty() {
            let mut cols = Vec::with_capacity(self.group.len());
            for col in &self.group {
                cols.push(ident(col)?);
            }
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols.join(", "));
        }
        if !self.having.is_empty() {
            let clauses: Vec<_> = self.having.iter().map(|(h, _)| format!("({h})")).collect();
            sql.push_str(" HAVING ");
            sql.push_str(&clauses.join(" AND "));
        }
        Ok(())
    }

    fn append_order(
        &self,
        sql: &mut String,
        ident: &dyn Fn(&str) -> Result<String, DynamicError>,
    ) -> Result<(), DynamicError> {
        if self.order.is_empty() {
            return Ok(());
        }
        sql.push_str(" ORDER BY ");
        let mut clauses = Vec::with_capacity(self.order.len());
        for (col, asc) in &self.order {
            let col = ident(col)?;
            if *asc {
                clauses.push(format!("{col} ASC"));
            } else {
                clauses.push(format!("{col} DESC"));
            }
        }
        sql.push_str(&clauses.join(", "));
        Ok(())
    }

    fn append_limit_offset(&self, sql: &mut String) {
        if let Some(limit) = self.limit_val {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset_val {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }

    fn format_identifier_checked(
        &self,
        ident: &str,
        allow_star: bool,
        kind: &'static str,
    ) -> Result<String, DynamicError> {
        if marker::is_marker(ident) {
            return Ok(match (self.identifier_policy, self.dialect) {
                (IdentifierPolicy::Quote, Dialect::MySql) => format!("`{ident}`"),
                _ => ident.to_string(),
            });
        }
        if !is_valid_identifier(ident, allow_star) {
            return Err(DynamicError::InvalidIdentifier {
                kind,
                ident: ident.to_string(),
            });
        }
        match self.identifier_policy {
            IdentifierPolicy::Quote => Ok(quote_identifier(ident, self.dialect, allow_star)),
            IdentifierPolicy::Raw | IdentifierPolicy::Validate => Ok(ident.to_string()),
        }
    }
}

fn raw_identifier(ident: &str) -> Result<String, DynamicError> {
    Ok(ident.to_string())
}

/// Bind `value` under the next free generated name.
fn bind(placeholders: &mut Placeholders, params: &mut BoundParams, value: &ParamValue) -> String {
    let name = placeholders.next_free(params);
    params.insert(name.clone(), value.clone());
    name
}

fn is_valid_identifier(ident: &str, allow_star: bool) -> bool {
    if ident.is_empty() {
        return false;
    }
    let parts: Vec<&str> = ident.split('.').collect();
    for (idx, part) in parts.iter().enumerate() {
        if allow_star && *part == "*" {
            return idx + 1 == parts.len();
        }
        if !is_valid_segment(part) {
            return false;
        }
    }
    true
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            return false;
        }
    }
    true
}

fn quote_identifier(ident: &str, dialect: Dialect, allow_star: bool) -> String {
    let quote = dialect.quote_char();
    let parts: Vec<&str> = ident.split('.').collect();
    let last_idx = parts.len().saturating_sub(1);
    parts
        .into_iter()
        .enumerate()
        .map(|(idx, part)| {
            if allow_star && part == "*" && idx == last_idx {
                part.to_string()
            } else {
                format!("{quote}{part}{quote}")
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}
