//! Dynamic attributes for relational rows.
//!
//! A model keeps its declared columns plus one blob column holding a nested
//! map of attributes that have no column of their own. Attributes are read
//! and written by dotted path on a [`DynamicRecord`], persisted through a
//! backend build expression, and queried with markers such as
//! `(!price.retail|decimal(6,2)!)` that [`QueryRewriter`] turns into accessor
//! SQL.
//!
//! This crate performs no I/O; `dynar-data-sqlx` executes the statements.

pub mod attributes;
pub mod codec;
pub mod config;
pub mod encoder;
pub mod entity;
pub mod error;
pub mod marker;
pub mod params;
pub mod path;
pub mod query;
pub mod record;
pub mod rewrite;
pub mod value;

pub use attributes::DynamicAttributes;
pub use config::{ConfigError, DynamicConfig};
pub use encoder::{DynamicEncoder, MariaEncoder, PgsqlEncoder};
pub use entity::{DynamicEntity, Entity, ModelMeta, PropertyRegistry};
pub use error::{DataError, DynamicError};
pub use params::{BoundParams, Expression, ParamValue, Placeholders, Statement};
pub use query::{Dialect, IdentifierPolicy, QueryBuilder};
pub use record::{DynamicRecord, Row};
pub use rewrite::QueryRewriter;
pub use value::{DynMap, DynValue, Verbatim};

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        BoundParams, Dialect, DynMap, DynValue, DynamicEntity, DynamicRecord, Entity, ModelMeta,
        QueryBuilder, QueryRewriter, Statement, Verbatim,
    };
}
