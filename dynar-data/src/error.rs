use thiserror::Error;

/// Errors raised while building dynamic-attribute SQL or handling attributes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DynamicError {
    /// The model type never declared which column holds its dynamic attributes.
    #[error("model `{entity}` does not declare a dynamic column")]
    MissingDynamicColumn { entity: String },

    /// The configured dialect has no structured blob column support.
    #[error("dialect `{dialect}` does not support dynamic columns")]
    UnsupportedBackend { dialect: String },

    #[error("invalid dynamic attribute name: `{name}`")]
    InvalidAttributeName { name: String },

    #[error("property `{name}` is read-only")]
    ReadOnlyProperty { name: String },

    /// The dynamic column itself cannot be written as an attribute.
    #[error("`{name}` is the dynamic column and cannot be assigned directly")]
    ReservedAttribute { name: String },

    #[error("column `{name}` cannot hold a nested map")]
    InvalidColumnValue { name: String },

    #[error("cannot encode non-finite float for dynamic attribute `{key}`")]
    NonFiniteFloat { key: String },

    #[error("invalid {kind} identifier: {ident}")]
    InvalidIdentifier { kind: &'static str, ident: String },

    /// Two clauses bind the same placeholder name to different values.
    #[error("placeholder `{name}` is bound to conflicting values")]
    ConflictingParameter { name: String },

    #[error("record of `{table}` has no value for primary key `{column}`")]
    MissingPrimaryKey { table: String, column: String },

    /// The blob text could not be parsed, even after repair.
    #[error("cannot decode dynamic column: {0}")]
    Decode(String),
}

/// Errors that can occur in the data layer.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(Box<dyn std::error::Error + Send + Sync>),
    #[error(transparent)]
    Dynamic(#[from] DynamicError),
    #[error("Data error: {0}")]
    Other(String),
}

impl DataError {
    /// Construct a `Database` variant from any error type.
    ///
    /// Used by backend crates (e.g. `dynar-data-sqlx`) to wrap
    /// driver-specific errors.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Database(Box::new(err))
    }
}
