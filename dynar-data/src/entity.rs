use crate::encoder::DynamicEncoder;
use crate::error::DynamicError;
use crate::query::Dialect;
use crate::record::DynamicRecord;
use crate::value::DynValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait representing a database table with a name, id column, and column list.
///
/// Implemented on a marker type per model; rows are held by
/// [`DynamicRecord`].
///
/// # Example
///
/// ```ignore
/// struct Product;
///
/// impl Entity for Product {
///     fn table_name() -> &'static str { "product" }
///     fn id_column() -> &'static str { "id" }
///     fn columns() -> &'static [&'static str] { &["id", "name", "details"] }
/// }
///
/// impl DynamicEntity for Product {
///     fn dynamic_column() -> Option<&'static str> { Some("details") }
/// }
/// ```
pub trait Entity: Send + Sync + 'static {
    fn table_name() -> &'static str;
    fn id_column() -> &'static str;
    fn columns() -> &'static [&'static str];
}

/// An entity whose table has one column holding serialized dynamic attributes.
pub trait DynamicEntity: Entity {
    /// The column holding the dynamic attribute blob.
    ///
    /// Every dynamic entity must override this; the default makes every
    /// query and save fail with [`DynamicError::MissingDynamicColumn`].
    fn dynamic_column() -> Option<&'static str> {
        None
    }

    fn dialect() -> Dialect {
        Dialect::MySql
    }

    /// Computed properties, consulted after declared columns.
    fn properties() -> PropertyRegistry {
        PropertyRegistry::default()
    }

    /// Metadata for building queries and records of this entity.
    fn meta() -> Arc<ModelMeta> {
        Arc::new(ModelMeta::of::<Self>())
    }
}

pub type PropertyGetter = fn(&DynamicRecord) -> DynValue;
pub type PropertySetter = fn(&mut DynamicRecord, DynValue) -> Result<(), DynamicError>;

/// A computed property: a getter and an optional setter.
#[derive(Debug, Clone, Copy)]
pub struct Property {
    pub getter: PropertyGetter,
    pub setter: Option<PropertySetter>,
}

/// Named computed properties of a model.
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    entries: HashMap<String, Property>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only(mut self, name: &str, getter: PropertyGetter) -> Self {
        self.entries.insert(
            name.to_string(),
            Property {
                getter,
                setter: None,
            },
        );
        self
    }

    pub fn read_write(mut self, name: &str, getter: PropertyGetter, setter: PropertySetter) -> Self {
        self.entries.insert(
            name.to_string(),
            Property {
                getter,
                setter: Some(setter),
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Runtime description of a model: the schema registry consulted before
/// falling through to dynamic attributes.
///
/// Built once (from a [`DynamicEntity`] or from configuration) and shared
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct ModelMeta {
    name: String,
    table: String,
    id_column: String,
    columns: Vec<String>,
    dynamic_column: Option<String>,
    dialect: Dialect,
    properties: PropertyRegistry,
    query_param_prefix: String,
    attribute_param_prefix: String,
}

pub const DEFAULT_QUERY_PARAM_PREFIX: &str = ":dcq";
pub const DEFAULT_ATTRIBUTE_PARAM_PREFIX: &str = ":dca";

impl ModelMeta {
    pub fn new(table: &str) -> Self {
        Self {
            name: table.to_string(),
            table: table.to_string(),
            id_column: "id".to_string(),
            columns: Vec::new(),
            dynamic_column: None,
            dialect: Dialect::MySql,
            properties: PropertyRegistry::default(),
            query_param_prefix: DEFAULT_QUERY_PARAM_PREFIX.to_string(),
            attribute_param_prefix: DEFAULT_ATTRIBUTE_PARAM_PREFIX.to_string(),
        }
    }

    pub fn of<E: DynamicEntity + ?Sized>() -> Self {
        let mut meta = Self::new(E::table_name())
            .name(std::any::type_name::<E>())
            .id_column(E::id_column())
            .columns(E::columns())
            .dialect(E::dialect())
            .properties(E::properties());
        meta.dynamic_column = E::dynamic_column().map(str::to_string);
        meta
    }

    /// Name used in error messages. Defaults to the table name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn id_column(mut self, column: &str) -> Self {
        self.id_column = column.to_string();
        self
    }

    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn dynamic_column(mut self, column: &str) -> Self {
        self.dynamic_column = Some(column.to_string());
        self
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn properties(mut self, properties: PropertyRegistry) -> Self {
        self.properties = properties;
        self
    }

    pub fn param_prefixes(mut self, query: &str, attribute: &str) -> Self {
        self.query_param_prefix = query.to_string();
        self.attribute_param_prefix = attribute.to_string();
        self
    }

    pub fn entity_name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.id_column
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn dialect_kind(&self) -> Dialect {
        self.dialect
    }

    pub fn property_registry(&self) -> &PropertyRegistry {
        &self.properties
    }

    pub fn query_param_prefix(&self) -> &str {
        &self.query_param_prefix
    }

    pub fn attribute_param_prefix(&self) -> &str {
        &self.attribute_param_prefix
    }

    /// The dynamic column name; a configuration error if none was declared.
    pub fn dynamic_column_name(&self) -> Result<&str, DynamicError> {
        self.dynamic_column
            .as_deref()
            .ok_or_else(|| DynamicError::MissingDynamicColumn {
                entity: self.name.clone(),
            })
    }

    /// The blob encoder for this model's dialect.
    pub fn encoder(&self) -> Result<&'static dyn DynamicEncoder, DynamicError> {
        self.dialect.dynamic_encoder()
    }

    /// Check that the model can take part in dynamic-attribute SQL at all.
    pub fn validate(&self) -> Result<(), DynamicError> {
        self.dynamic_column_name()?;
        self.encoder()?;
        Ok(())
    }
}
