use crate::positional::PositionalQuery;
use dynar_data::{DataError, Dialect, Row};
use sqlx::{Database, Pool};
use std::future::Future;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    /// Generated key of an `INSERT`, where the driver reports one.
    pub last_insert_id: Option<i64>,
}

/// A SQLx database with a structured blob column type.
///
/// Implemented for `MySql` (MariaDB dynamic columns) and `Postgres`
/// (`jsonb`) behind the `mysql` / `postgres` features.
pub trait DynamicDatabase: Database {
    const DIALECT: Dialect;

    fn fetch_rows<'a>(
        pool: &'a Pool<Self>,
        query: &'a PositionalQuery,
    ) -> impl Future<Output = Result<Vec<Row>, DataError>> + Send + 'a;

    fn execute<'a>(
        pool: &'a Pool<Self>,
        query: &'a PositionalQuery,
    ) -> impl Future<Output = Result<ExecuteResult, DataError>> + Send + 'a;
}

/// Bind [`ParamValue`](dynar_data::ParamValue)s onto a query, in order.
#[allow(unused_macros)]
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values {
            query = match value {
                dynar_data::ParamValue::Null => query.bind(None::<String>),
                dynar_data::ParamValue::Bool(b) => query.bind(*b),
                dynar_data::ParamValue::Int(i) => query.bind(*i),
                dynar_data::ParamValue::Float(f) => query.bind(*f),
                dynar_data::ParamValue::Text(s) => query.bind(s.clone()),
                dynar_data::ParamValue::Bytes(b) => query.bind(b.to_vec()),
            };
        }
        query
    }};
}

/// Decode column `$idx` of `$row` by trying each Rust type in turn.
#[allow(unused_macros)]
macro_rules! decode_column {
    ($row:expr, $idx:expr, [$($int:ty),*], [$($float:ty),*]) => {{
        use sqlx::{Column as _, Row as _, TypeInfo as _, ValueRef as _};
        let row = $row;
        let idx = $idx;
        let is_null = row
            .try_get_raw(idx)
            .map(|raw| raw.is_null())
            .map_err($crate::SqlxErrorExt::into_data_error)?;
        if is_null {
            Ok(dynar_data::DynValue::Null)
        } else if let Some(v) = None::<i64>
            $(.or_else(|| row.try_get::<$int, _>(idx).ok().and_then(|v| i64::try_from(v).ok())))*
        {
            Ok(dynar_data::DynValue::Int(v))
        } else if let Some(v) = None::<f64>
            $(.or_else(|| row.try_get::<$float, _>(idx).ok().map(f64::from)))*
        {
            Ok(dynar_data::DynValue::Float(v))
        } else if let Ok(v) = row.try_get::<bool, _>(idx) {
            Ok(dynar_data::DynValue::Bool(v))
        } else if let Ok(v) = row.try_get::<String, _>(idx) {
            Ok(dynar_data::DynValue::Str(bytes::Bytes::from(v)))
        } else if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
            Ok(dynar_data::DynValue::Str(bytes::Bytes::from(v)))
        } else {
            let column = &row.columns()[idx];
            Err(DataError::Other(format!(
                "cannot decode column `{}` of type {}",
                column.name(),
                column.type_info().name()
            )))
        }
    }};
}

#[cfg(feature = "mysql")]
mod mysql {
    use super::*;
    use crate::SqlxErrorExt;
    use sqlx::mysql::{MySql, MySqlRow};
    use sqlx::{Column as _, Row as _};

    fn decode_row(row: &MySqlRow) -> Result<Row, DataError> {
        let mut out = Row::new();
        for (idx, column) in row.columns().iter().enumerate() {
            let value: Result<_, DataError> = decode_column!(row, idx, [i64, u64], [f64, f32]);
            out.insert(column.name().to_string(), value?);
        }
        Ok(out)
    }

    impl DynamicDatabase for MySql {
        const DIALECT: Dialect = Dialect::MySql;

        fn fetch_rows<'a>(
            pool: &'a Pool<Self>,
            query: &'a PositionalQuery,
        ) -> impl Future<Output = Result<Vec<Row>, DataError>> + Send + 'a {
            async move {
                let rows = bind_values!(sqlx::query::<MySql>(&query.sql), &query.values)
                    .fetch_all(pool)
                    .await
                    .map_err(SqlxErrorExt::into_data_error)?;
                rows.iter().map(decode_row).collect()
            }
        }

        fn execute<'a>(
            pool: &'a Pool<Self>,
            query: &'a PositionalQuery,
        ) -> impl Future<Output = Result<ExecuteResult, DataError>> + Send + 'a {
            async move {
                let result = bind_values!(sqlx::query::<MySql>(&query.sql), &query.values)
                    .execute(pool)
                    .await
                    .map_err(SqlxErrorExt::into_data_error)?;
                Ok(ExecuteResult {
                    rows_affected: result.rows_affected(),
                    last_insert_id: i64::try_from(result.last_insert_id())
                        .ok()
                        .filter(|id| *id != 0),
                })
            }
        }
    }
}

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use crate::SqlxErrorExt;
    use sqlx::postgres::{PgRow, Postgres};
    use sqlx::{Column as _, Row as _};

    fn decode_row(row: &PgRow) -> Result<Row, DataError> {
        let mut out = Row::new();
        for (idx, column) in row.columns().iter().enumerate() {
            let value: Result<_, DataError> = decode_column!(row, idx, [i64, i32, i16], [f64, f32]);
            out.insert(column.name().to_string(), value?);
        }
        Ok(out)
    }

    impl DynamicDatabase for Postgres {
        const DIALECT: Dialect = Dialect::Postgres;

        fn fetch_rows<'a>(
            pool: &'a Pool<Self>,
            query: &'a PositionalQuery,
        ) -> impl Future<Output = Result<Vec<Row>, DataError>> + Send + 'a {
            async move {
                let rows = bind_values!(sqlx::query::<Postgres>(&query.sql), &query.values)
                    .fetch_all(pool)
                    .await
                    .map_err(SqlxErrorExt::into_data_error)?;
                rows.iter().map(decode_row).collect()
            }
        }

        fn execute<'a>(
            pool: &'a Pool<Self>,
            query: &'a PositionalQuery,
        ) -> impl Future<Output = Result<ExecuteResult, DataError>> + Send + 'a {
            async move {
                let result = bind_values!(sqlx::query::<Postgres>(&query.sql), &query.values)
                    .execute(pool)
                    .await
                    .map_err(SqlxErrorExt::into_data_error)?;
                Ok(ExecuteResult {
                    rows_affected: result.rows_affected(),
                    last_insert_id: None,
                })
            }
        }
    }
}
