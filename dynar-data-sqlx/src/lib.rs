//! # dynar-data-sqlx - SQLx backend for dynamic attributes
//!
//! This crate executes the statements built by [`dynar-data`] through
//! [SQLx](https://github.com/launchbadge/sqlx). It depends on `dynar-data`
//! for query rewriting, blob encoding and records, and adds placeholder
//! conversion, value binding, row decoding and error bridging.
//!
//! # What's in this crate
//!
//! | Type | Description |
//! |------|-------------|
//! | [`DynamicRepository`] | Fetch, count, save and delete dynamic records through an `sqlx::Pool<DB>` |
//! | [`DynamicDatabase`] | Per-driver binding, row decoding and execution |
//! | [`to_positional`] | Convert `:name` placeholders to `?` or `$n` |
//! | [`SqlxErrorExt`] | Extension trait to convert `sqlx::Error` → `DataError` (`.into_data_error()`) |
//! | [`SqlxResult<T>`] | Type alias for `Result<T, DataError>` |
//!
//! # Feature flags
//!
//! | Feature    | Driver |
//! |------------|--------|
//! | `mysql`    | MariaDB dynamic columns via `sqlx/mysql` |
//! | `postgres` | PostgreSQL `jsonb` columns via `sqlx/postgres` |
//!
//! # Quick start
//!
//! ```toml
//! [dependencies]
//! dynar-data-sqlx = { version = "0.1", features = ["mysql"] }
//! ```
//!
//! ```ignore
//! use dynar_data_sqlx::prelude::*;
//! use sqlx::MySql;
//!
//! let repo = DynamicRepository::<MySql>::for_entity::<Product>(pool.clone())?;
//!
//! let mut shirt = repo.create();
//! shirt.set("name", "Shirt")?;
//! shirt.set("color", "black")?;
//! shirt.set("price.retail", 12.99)?;
//! repo.save(&mut shirt).await?;
//!
//! let cheap = repo
//!     .fetch_all(repo.query().where_raw("(!price.retail|decimal(6,2)!) < 20", BoundParams::new()))
//!     .await?;
//! ```
//!
//! # Error bridging
//!
//! Due to Rust's orphan rules, `From<sqlx::Error> for DataError` can't be
//! implemented here. Use the [`SqlxErrorExt`] trait instead:
//!
//! ```ignore
//! use dynar_data_sqlx::SqlxErrorExt;
//!
//! let rows = sqlx::query("SELECT ...")
//!     .fetch_all(&pool)
//!     .await
//!     .map_err(|e| e.into_data_error())?;
//! ```
//!
//! [`dynar-data`]: dynar_data

pub mod database;
pub mod error;
pub mod positional;
pub mod repository;

pub use database::{DynamicDatabase, ExecuteResult};
pub use error::{SqlxErrorExt, SqlxResult};
pub use positional::{to_positional, PositionalQuery};
pub use repository::DynamicRepository;

/// Re-exports of the most commonly used types from both `dynar-data` and this crate.
pub mod prelude {
    pub use crate::{DynamicDatabase, DynamicRepository, SqlxErrorExt};
    pub use dynar_data::prelude::*;
}
