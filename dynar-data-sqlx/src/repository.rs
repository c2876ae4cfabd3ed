use crate::database::{DynamicDatabase, ExecuteResult};
use crate::error::SqlxResult;
use crate::positional::{to_positional, PositionalQuery};
use dynar_data::{
    DataError, DynValue, DynamicEntity, DynamicRecord, ModelMeta, ParamValue, QueryBuilder,
    QueryRewriter, Statement,
};
use sqlx::Pool;
use std::sync::Arc;

/// Runs dynamic-attribute queries for one model against an `sqlx::Pool<DB>`.
///
/// Every statement goes through the same steps: render, rewrite attribute
/// markers, convert placeholders to the driver's style, execute, hydrate.
///
/// # Example
///
/// ```ignore
/// let repo = DynamicRepository::<MySql>::for_entity::<Product>(pool.clone())?;
/// let black = repo
///     .fetch_all(repo.query().where_eq("(!color!)", "black"))
///     .await?;
/// ```
pub struct DynamicRepository<DB: DynamicDatabase> {
    pool: Pool<DB>,
    meta: Arc<ModelMeta>,
}

impl<DB: DynamicDatabase> DynamicRepository<DB> {
    /// Fails if the model cannot take part in dynamic-attribute SQL, or its
    /// dialect is not the pool's.
    pub fn new(pool: Pool<DB>, meta: Arc<ModelMeta>) -> SqlxResult<Self> {
        meta.validate()?;
        if meta.dialect_kind() != DB::DIALECT {
            return Err(DataError::Other(format!(
                "model `{}` is configured for {} but the pool is {}",
                meta.entity_name(),
                meta.dialect_kind().name(),
                DB::DIALECT.name()
            )));
        }
        Ok(Self { pool, meta })
    }

    pub fn for_entity<E: DynamicEntity>(pool: Pool<DB>) -> SqlxResult<Self> {
        Self::new(pool, E::meta())
    }

    /// Get the underlying pool reference.
    pub fn pool(&self) -> &Pool<DB> {
        &self.pool
    }

    pub fn meta(&self) -> &Arc<ModelMeta> {
        &self.meta
    }

    /// Create a `QueryBuilder` pre-configured for this model's table.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new_with_dialect(self.meta.table(), DB::DIALECT)
    }

    /// A fresh, unsaved record of this model.
    pub fn create(&self) -> DynamicRecord {
        DynamicRecord::new(self.meta.clone())
    }

    pub async fn fetch_all(&self, query: QueryBuilder) -> SqlxResult<Vec<DynamicRecord>> {
        let statement = self.rewriter()?.build(query)?;
        let rows = DB::fetch_rows(&self.pool, &self.positional(&statement)?).await?;
        rows.into_iter()
            .map(|row| DynamicRecord::hydrate(self.meta.clone(), row).map_err(DataError::from))
            .collect()
    }

    pub async fn fetch_optional(&self, query: QueryBuilder) -> SqlxResult<Option<DynamicRecord>> {
        Ok(self.fetch_all(query.limit(1)).await?.into_iter().next())
    }

    pub async fn fetch_one(&self, query: QueryBuilder) -> SqlxResult<DynamicRecord> {
        self.fetch_optional(query)
            .await?
            .ok_or_else(|| DataError::NotFound(format!("no `{}` row matched", self.meta.table())))
    }

    pub async fn find_by_id(&self, id: impl Into<ParamValue>) -> SqlxResult<Option<DynamicRecord>> {
        let query = self.query().where_eq(self.meta.primary_key(), id);
        self.fetch_optional(query).await
    }

    pub async fn count(&self, query: &QueryBuilder) -> SqlxResult<u64> {
        let statement = self.rewriter()?.build_count(query)?;
        let rows = DB::fetch_rows(&self.pool, &self.positional(&statement)?).await?;
        let count = rows
            .first()
            .and_then(|row| row.values().next())
            .and_then(DynValue::as_i64)
            .unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Insert a new record or update an existing one, writing the dynamic
    /// attributes with the backend build expression.
    ///
    /// After an insert the generated key, if the driver reports one, is
    /// stored on the record.
    pub async fn save(&self, record: &mut DynamicRecord) -> SqlxResult<u64> {
        let statement = if record.is_new() {
            record.insert_statement()?
        } else {
            record.update_statement()?
        };
        let result = self.execute(&statement).await?;
        if record.is_new() && record.id().is_none() {
            if let Some(id) = result.last_insert_id {
                record.set(self.meta.primary_key(), id)?;
            }
        }
        record.mark_persisted();
        tracing::debug!(
            table = self.meta.table(),
            rows = result.rows_affected,
            "saved dynamic record"
        );
        Ok(result.rows_affected)
    }

    pub async fn delete(&self, record: &DynamicRecord) -> SqlxResult<bool> {
        let statement = record.delete_statement()?;
        Ok(self.execute(&statement).await?.rows_affected > 0)
    }

    /// Execute a statement, rewriting any attribute markers it contains.
    pub async fn execute(&self, statement: &Statement) -> SqlxResult<ExecuteResult> {
        let statement = self
            .rewriter()?
            .rewrite(&statement.sql, statement.params.clone());
        DB::execute(&self.pool, &self.positional(&statement)?).await
    }

    fn rewriter(&self) -> SqlxResult<QueryRewriter<'_>> {
        Ok(QueryRewriter::new(&self.meta)?)
    }

    fn positional(&self, statement: &Statement) -> SqlxResult<PositionalQuery> {
        let query = to_positional(statement, DB::DIALECT)?;
        tracing::trace!(sql = %query.sql, values = query.values.len(), "executing");
        Ok(query)
    }
}

impl<DB: DynamicDatabase> Clone for DynamicRepository<DB> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            meta: self.meta.clone(),
        }
    }
}
