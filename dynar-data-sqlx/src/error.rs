use dynar_data::DataError;

/// Extension trait for converting `sqlx::Error` into `DataError`.
///
/// Due to Rust's orphan rules, we can't implement `From<sqlx::Error> for DataError`
/// in this crate. Instead, use `.into_data_error()` or the `?` operator with `SqlxResult`.
pub trait SqlxErrorExt {
    fn into_data_error(self) -> DataError;
}

impl SqlxErrorExt for sqlx::Error {
    fn into_data_error(self) -> DataError {
        match &self {
            sqlx::Error::RowNotFound => DataError::NotFound("Row not found".into()),
            sqlx::Error::ColumnDecode { index, source } => {
                DataError::Other(format!("cannot decode column {index}: {source}"))
            }
            _ => DataError::database(self),
        }
    }
}

/// Convenience alias for data-layer results using `DataError`.
pub type SqlxResult<T> = Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = sqlx::Error::RowNotFound.into_data_error();
        assert!(matches!(err, DataError::NotFound(_)));
    }

    #[test]
    fn test_other_errors_are_database_errors() {
        let err = sqlx::Error::PoolTimedOut.into_data_error();
        assert!(matches!(err, DataError::Database(_)));
        assert!(err.to_string().starts_with("Database error"));
    }
}
