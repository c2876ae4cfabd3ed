use crate::attributes::DynamicAttributes;
use crate::entity::ModelMeta;
use crate::error::DynamicError;
use crate::params::{BoundParams, Expression, ParamValue, Placeholders, Statement};
use crate::value::{DynMap, DynValue};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One result row, column name to value.
pub type Row = BTreeMap<String, DynValue>;

/// A row of a model with dynamic attributes.
///
/// Names are resolved in order: declared columns, computed properties,
/// dynamic attributes, then any other values the query selected (aliases,
/// aggregates). Dotted names always address dynamic attributes.
#[derive(Debug, Clone)]
pub struct DynamicRecord {
    meta: Arc<ModelMeta>,
    columns: BTreeMap<String, DynValue>,
    extras: BTreeMap<String, DynValue>,
    attributes: DynamicAttributes,
    is_new: bool,
}

impl DynamicRecord {
    /// A record that has not been saved yet.
    pub fn new(meta: Arc<ModelMeta>) -> Self {
        Self {
            meta,
            columns: BTreeMap::new(),
            extras: BTreeMap::new(),
            attributes: DynamicAttributes::new(),
            is_new: true,
        }
    }

    /// Build a record from a fetched row.
    ///
    /// The dynamic column must hold the JSON text produced by the read
    /// expression (see [`QueryRewriter::prepare_select`]); a null or missing
    /// value leaves the attributes empty.
    ///
    /// [`QueryRewriter::prepare_select`]: crate::rewrite::QueryRewriter::prepare_select
    pub fn hydrate(meta: Arc<ModelMeta>, row: Row) -> Result<Self, DynamicError> {
        let dynamic_column = meta.dynamic_column_name()?.to_string();
        let mut record = Self::new(meta);
        record.is_new = false;
        for (name, value) in row {
            if name == dynamic_column {
                record.attributes = match value {
                    DynValue::Null => DynamicAttributes::new(),
                    DynValue::Str(blob) => DynamicAttributes::hydrate(&blob)?,
                    other => {
                        return Err(DynamicError::Decode(format!(
                            "dynamic column `{name}` holds a non-text value: {:?}",
                            other
                        )))
                    }
                };
            } else if record.meta.has_column(&name) {
                record.columns.insert(name, value);
            } else {
                record.extras.insert(name, value);
            }
        }
        Ok(record)
    }

    pub fn meta(&self) -> &Arc<ModelMeta> {
        &self.meta
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Record that the row now exists in the database.
    pub fn mark_persisted(&mut self) {
        self.is_new = false;
    }

    pub fn id(&self) -> Option<&DynValue> {
        self.columns
            .get(self.meta.primary_key())
            .filter(|v| !v.is_null())
    }

    pub fn attributes(&self) -> &DynamicAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut DynamicAttributes {
        &mut self.attributes
    }

    /// A value selected by the query that is neither a column nor the blob.
    pub fn extra(&self, name: &str) -> Option<&DynValue> {
        self.extras.get(name)
    }

    pub fn get(&self, name: &str) -> Option<DynValue> {
        if let Some(value) = self.columns.get(name) {
            return Some(value.clone());
        }
        if self.meta.has_column(name) {
            return None;
        }
        if let Some(prop) = self.meta.property_registry().get(name) {
            return Some((prop.getter)(self));
        }
        self.attributes
            .get(name)
            .or_else(|| self.extras.get(name))
            .cloned()
    }

    pub fn set(&mut self, name: &str, value: impl Into<DynValue>) -> Result<(), DynamicError> {
        let value = value.into();
        self.check_member_path(name)?;
        if self.meta.has_column(name) {
            if matches!(value, DynValue::Map(_)) {
                return Err(DynamicError::InvalidColumnValue {
                    name: name.to_string(),
                });
            }
            self.columns.insert(name.to_string(), value);
            return Ok(());
        }
        if let Some(prop) = self.meta.property_registry().get(name).copied() {
            return match prop.setter {
                Some(setter) => setter(self, value),
                None => Err(DynamicError::ReadOnlyProperty {
                    name: name.to_string(),
                }),
            };
        }
        self.attributes.set(name, value)
    }

    /// Declared columns and properties are set when not null; dynamic
    /// attributes are set when present, even as null.
    pub fn isset(&self, name: &str) -> bool {
        if self.meta.has_column(name) {
            return self.columns.get(name).is_some_and(|v| !v.is_null());
        }
        if let Some(prop) = self.meta.property_registry().get(name) {
            return !(prop.getter)(self).is_null();
        }
        self.attributes.isset(name) || self.extras.contains_key(name)
    }

    pub fn unset(&mut self, name: &str) -> Result<(), DynamicError> {
        self.check_member_path(name)?;
        if self.meta.has_column(name) {
            self.columns.insert(name.to_string(), DynValue::Null);
            return Ok(());
        }
        if self.meta.property_registry().contains(name) {
            return self.set(name, DynValue::Null);
        }
        self.attributes.unset(name);
        self.extras.remove(name);
        Ok(())
    }

    pub fn dynamic_attribute_names(&self) -> Vec<String> {
        self.attributes.names()
    }

    /// Everything readable on the record as one map: dynamic attributes and
    /// selected extras, overlaid by properties and declared columns.
    pub fn to_map(&self) -> DynMap {
        let mut out = DynMap::new();
        for (name, value) in &self.extras {
            out.insert(Bytes::from(name.clone()), value.clone());
        }
        for (name, value) in self.attributes.as_map() {
            out.insert(name.clone(), value.clone());
        }
        for name in self.meta.property_registry().names() {
            if let Some(prop) = self.meta.property_registry().get(name) {
                out.insert(Bytes::from(name.to_string()), (prop.getter)(self));
            }
        }
        for (name, value) in &self.columns {
            out.insert(Bytes::from(name.clone()), value.clone());
        }
        out
    }

    /// The value to write into the dynamic column.
    pub fn before_save(&self) -> Result<Expression, DynamicError> {
        let mut placeholders = Placeholders::new(self.meta.attribute_param_prefix());
        self.encode_blob(&mut placeholders)
    }

    /// Encode the attributes, drawing names from a counter shared with the
    /// rest of the statement.
    fn encode_blob(&self, placeholders: &mut Placeholders) -> Result<Expression, DynamicError> {
        self.meta.dynamic_column_name()?;
        let encoder = self.meta.encoder()?;
        crate::codec::encode(encoder, self.attributes.as_map(), placeholders)
    }

    /// `INSERT` of the declared columns that hold a value plus the blob.
    pub fn insert_statement(&self) -> Result<Statement, DynamicError> {
        let encoder = self.meta.encoder()?;
        let dynamic_column = self.meta.dynamic_column_name()?;
        let mut placeholders = Placeholders::new(self.meta.attribute_param_prefix());
        let mut params = BoundParams::new();
        let mut names = Vec::new();
        let mut values = Vec::new();
        for column in self.meta.column_names() {
            if column == dynamic_column {
                continue;
            }
            let Some(value) = self.columns.get(column) else {
                continue;
            };
            names.push(encoder.quote_column(column));
            values.push(self.bind_column(column, value, &mut placeholders, &mut params)?);
        }
        let blob = self.encode_blob(&mut placeholders)?;
        names.push(encoder.quote_column(dynamic_column));
        values.push(blob.sql);
        params.merge(blob.params)?;
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            encoder.quote_column(self.meta.table()),
            names.join(", "),
            values.join(", ")
        );
        Ok(Statement::new(sql, params))
    }

    /// `UPDATE` of every loaded column plus the blob, keyed on the id.
    pub fn update_statement(&self) -> Result<Statement, DynamicError> {
        let encoder = self.meta.encoder()?;
        let dynamic_column = self.meta.dynamic_column_name()?;
        let id_column = self.meta.primary_key();
        let id = self.id().ok_or_else(|| DynamicError::MissingPrimaryKey {
            table: self.meta.table().to_string(),
            column: id_column.to_string(),
        })?;
        let mut placeholders = Placeholders::new(self.meta.attribute_param_prefix());
        let mut params = BoundParams::new();
        let mut assignments = Vec::new();
        for column in self.meta.column_names() {
            if column == dynamic_column || column == id_column {
                continue;
            }
            let Some(value) = self.columns.get(column) else {
                continue;
            };
            let bound = self.bind_column(column, value, &mut placeholders, &mut params)?;
            assignments.push(format!("{} = {bound}", encoder.quote_column(column)));
        }
        let blob = self.encode_blob(&mut placeholders)?;
        assignments.push(format!("{} = {}", encoder.quote_column(dynamic_column), blob.sql));
        params.merge(blob.params)?;
        let id_bound = self.bind_column(id_column, id, &mut placeholders, &mut params)?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {id_bound}",
            encoder.quote_column(self.meta.table()),
            assignments.join(", "),
            encoder.quote_column(id_column),
        );
        Ok(Statement::new(sql, params))
    }

    pub fn delete_statement(&self) -> Result<Statement, DynamicError> {
        let encoder = self.meta.encoder()?;
        let id_column = self.meta.primary_key();
        let id = self.id().ok_or_else(|| DynamicError::MissingPrimaryKey {
            table: self.meta.table().to_string(),
            column: id_column.to_string(),
        })?;
        let mut placeholders = Placeholders::new(self.meta.attribute_param_prefix());
        let mut params = BoundParams::new();
        let id_bound = self.bind_column(id_column, id, &mut placeholders, &mut params)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = {id_bound}",
            encoder.quote_column(self.meta.table()),
            encoder.quote_column(id_column),
        );
        Ok(Statement::new(sql, params))
    }

    /// The dynamic column is never writable, and a dotted path cannot reach
    /// into a declared column or property.
    fn check_member_path(&self, name: &str) -> Result<(), DynamicError> {
        let top = name.split_once('.').map_or(name, |(top, _)| top);
        if self.is_dynamic_column(top) {
            return Err(DynamicError::ReservedAttribute {
                name: name.to_string(),
            });
        }
        if top == name {
            return Ok(());
        }
        if self.meta.has_column(top) {
            return Err(DynamicError::InvalidColumnValue {
                name: top.to_string(),
            });
        }
        if self.meta.property_registry().contains(top) {
            return Err(DynamicError::ReadOnlyProperty {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn is_dynamic_column(&self, name: &str) -> bool {
        self.meta
            .dynamic_column_name()
            .is_ok_and(|column| column == name)
    }

    fn bind_column(
        &self,
        column: &str,
        value: &DynValue,
        placeholders: &mut Placeholders,
        params: &mut BoundParams,
    ) -> Result<String, DynamicError> {
        let param = match value {
            DynValue::Verbatim(v) => return Ok(v.sql.clone()),
            DynValue::Map(_) => {
                return Err(DynamicError::InvalidColumnValue {
                    name: column.to_string(),
                })
            }
            DynValue::Null => ParamValue::Null,
            DynValue::Bool(b) => ParamValue::Bool(*b),
            DynValue::Int(i) => ParamValue::Int(*i),
            DynValue::Float(f) => ParamValue::Float(*f),
            DynValue::Str(s) => match std::str::from_utf8(s) {
                Ok(text) => ParamValue::Text(text.to_string()),
                Err(_) => ParamValue::Bytes(s.clone()),
            },
        };
        let name = placeholders.next_free(params);
        params.insert(name.clone(), param);
        Ok(name)
    }
}
