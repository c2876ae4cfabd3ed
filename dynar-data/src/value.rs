//! In-memory representation of dynamic attributes.
//!
//! Strings and keys are byte strings ([`Bytes`]) because dynamic attributes
//! may hold arbitrary binary data. The blob codec takes care of making them
//! safe for the backend's text serialization.

use bytes::Bytes;
use std::collections::BTreeMap;

/// A nested map of dynamic attributes, keyed by byte strings.
pub type DynMap = BTreeMap<Bytes, DynValue>;

/// A single dynamic attribute value.
///
/// Lists are stored as maps keyed by decimal indices, which is how the
/// backends store them (see [`DynValue::list`]).
#[derive(Debug, Clone, PartialEq)]
pub enum DynValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Bytes),
    Map(DynMap),
    /// Raw SQL written unescaped into the blob build expression.
    Verbatim(Verbatim),
}

/// A raw SQL expression used as a dynamic attribute value.
///
/// The expression is written into the build expression as-is instead of
/// being bound as a parameter, optionally cast to `sql_type`:
///
/// ```ignore
/// record.set("joined", Verbatim::typed("'2015-06-01 12:30:00'", "DATETIME"))?;
/// record.set("price", Verbatim::typed("4.99", "DECIMAL(6,2)"))?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verbatim {
    pub sql: String,
    pub sql_type: Option<String>,
}

impl Verbatim {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            sql_type: None,
        }
    }

    pub fn typed(sql: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            sql_type: Some(sql_type.into()),
        }
    }
}

impl DynValue {
    /// An empty nested map.
    pub fn map() -> Self {
        DynValue::Map(DynMap::new())
    }

    /// Build a list, stored as a map keyed by `"0"`, `"1"`, ...
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DynValue>,
    {
        DynValue::Map(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Bytes::from(i.to_string()), v.into()))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DynValue::Null)
    }

    pub fn as_map(&self) -> Option<&DynMap> {
        match self {
            DynValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut DynMap> {
        match self {
            DynValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DynValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The string value, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DynValue::Int(i) => Some(*i),
            DynValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DynValue::Float(f) => Some(*f),
            DynValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynValue::Bool(b) => Some(*b),
            DynValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Convert to JSON for display or API output.
    ///
    /// Non-UTF-8 strings are rendered lossily and verbatim SQL as its text;
    /// this is not the blob encoding.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            DynValue::Null => Json::Null,
            DynValue::Bool(b) => Json::Bool(*b),
            DynValue::Int(i) => Json::from(*i),
            DynValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            DynValue::Str(s) => Json::String(String::from_utf8_lossy(s).into_owned()),
            DynValue::Map(m) => Json::Object(
                m.iter()
                    .map(|(k, v)| (String::from_utf8_lossy(k).into_owned(), v.to_json()))
                    .collect(),
            ),
            DynValue::Verbatim(v) => Json::String(v.sql.clone()),
        }
    }
}

impl From<&str> for DynValue {
    fn from(value: &str) -> Self {
        DynValue::Str(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for DynValue {
    fn from(value: String) -> Self {
        DynValue::Str(Bytes::from(value))
    }
}

impl From<&[u8]> for DynValue {
    fn from(value: &[u8]) -> Self {
        DynValue::Str(Bytes::copy_from_slice(value))
    }
}

impl From<Vec<u8>> for DynValue {
    fn from(value: Vec<u8>) -> Self {
        DynValue::Str(Bytes::from(value))
    }
}

impl From<Bytes> for DynValue {
    fn from(value: Bytes) -> Self {
        DynValue::Str(value)
    }
}

impl From<i64> for DynValue {
    fn from(value: i64) -> Self {
        DynValue::Int(value)
    }
}

impl From<i32> for DynValue {
    fn from(value: i32) -> Self {
        DynValue::Int(i64::from(value))
    }
}

impl From<u32> for DynValue {
    fn from(value: u32) -> Self {
        DynValue::Int(i64::from(value))
    }
}

impl From<f64> for DynValue {
    fn from(value: f64) -> Self {
        DynValue::Float(value)
    }
}

impl From<bool> for DynValue {
    fn from(value: bool) -> Self {
        DynValue::Bool(value)
    }
}

impl From<DynMap> for DynValue {
    fn from(value: DynMap) -> Self {
        DynValue::Map(value)
    }
}

impl From<Verbatim> for DynValue {
    fn from(value: Verbatim) -> Self {
        DynValue::Verbatim(value)
    }
}

impl<T: Into<DynValue>> From<Option<T>> for DynValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(DynValue::Null)
    }
}

impl From<serde_json::Value> for DynValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => DynValue::Null,
            Json::Bool(b) => DynValue::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => DynValue::Int(i),
                None => DynValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => DynValue::from(s),
            Json::Array(items) => DynValue::list(items),
            Json::Object(obj) => DynValue::Map(
                obj.into_iter()
                    .map(|(k, v)| (Bytes::from(k), DynValue::from(v)))
                    .collect(),
            ),
        }
    }
}
