use crate::codec;
use crate::encoder::DynamicEncoder;
use crate::error::DynamicError;
use crate::params::{Expression, Placeholders};
use crate::path;
use crate::value::{DynMap, DynValue};

/// The dynamic attributes of one record.
///
/// Names are dotted paths. Only the top-level key is checked on write, child
/// segments may be anything (numeric list indices included).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicAttributes {
    map: DynMap,
}

impl DynamicAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a blob as returned by the backend's read expression.
    pub fn hydrate(blob: &[u8]) -> Result<Self, DynamicError> {
        Ok(Self {
            map: codec::decode(blob)?,
        })
    }

    pub fn get(&self, name: &str) -> Option<&DynValue> {
        path::get(&self.map, name)
    }

    /// Store `value` at `name`, creating intermediate maps as needed.
    pub fn set(&mut self, name: &str, value: impl Into<DynValue>) -> Result<(), DynamicError> {
        let top = name.split('.').next().unwrap_or(name);
        if !is_valid_attribute_name(top) {
            return Err(DynamicError::InvalidAttributeName {
                name: name.to_string(),
            });
        }
        path::set(&mut self.map, name, value.into());
        Ok(())
    }

    /// A stored null counts as set.
    pub fn isset(&self, name: &str) -> bool {
        path::isset(&self.map, name)
    }

    pub fn unset(&mut self, name: &str) -> Option<DynValue> {
        path::unset(&mut self.map, name)
    }

    /// Top-level attribute names holding a non-null value.
    pub fn names(&self) -> Vec<String> {
        self.map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| String::from_utf8_lossy(k).into_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn as_map(&self) -> &DynMap {
        &self.map
    }

    /// Replace all attributes at once.
    pub fn replace(&mut self, map: DynMap) -> DynMap {
        std::mem::replace(&mut self.map, map)
    }

    /// The build expression to write into the dynamic column.
    pub fn encode(
        &self,
        encoder: &dyn DynamicEncoder,
        prefix: &str,
    ) -> Result<Expression, DynamicError> {
        codec::encode(encoder, &self.map, &mut Placeholders::new(prefix))
    }
}

impl From<DynMap> for DynamicAttributes {
    fn from(map: DynMap) -> Self {
        Self { map }
    }
}

/// Identifier grammar for top-level attribute names.
///
/// First character: ASCII letter, `_`, or any non-ASCII character. Then the
/// same plus ASCII digits.
pub fn is_valid_attribute_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' || b >= 0x7f => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_' || b >= 0x7f)
}
