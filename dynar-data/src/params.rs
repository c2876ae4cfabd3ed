//! Named bound parameters and the statements that carry them.

use crate::error::DynamicError;
use bytes::Bytes;

/// A value bound to a named placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Bytes),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Bytes> for ParamValue {
    fn from(value: Bytes) -> Self {
        ParamValue::Bytes(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// Placeholder name to value, in insertion order.
///
/// Existing entries are never overwritten: translating a marker or a blob
/// write only ever adds fresh names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundParams {
    entries: Vec<(String, ParamValue)>,
}

impl BoundParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Add a binding. Returns `false` (and keeps the old value) if the name
    /// is already bound.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.entries.push((name, value.into()));
        true
    }

    /// Merge `other` into `self`.
    ///
    /// A name bound on both sides must carry the same value on both, or the
    /// merge fails and `self` keeps only the entries merged so far.
    pub fn merge(&mut self, other: BoundParams) -> Result<(), DynamicError> {
        for (name, value) in other.entries {
            match self.get(&name) {
                Some(existing) if *existing == value => {}
                Some(_) => return Err(DynamicError::ConflictingParameter { name }),
                None => self.entries.push((name, value)),
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

impl IntoIterator for BoundParams {
    type Item = (String, ParamValue);
    type IntoIter = std::vec::IntoIter<(String, ParamValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<N: Into<String>, V: Into<ParamValue>> FromIterator<(N, V)> for BoundParams {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut params = BoundParams::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// Generates placeholder names for one statement construction.
///
/// Each rewrite or encode call owns its own counter, so concurrent query
/// building never races on names.
#[derive(Debug, Clone)]
pub struct Placeholders {
    prefix: String,
    counter: usize,
}

impl Placeholders {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of names handed out so far.
    pub fn issued(&self) -> usize {
        self.counter
    }

    /// The next name in sequence: `<prefix>1`, `<prefix>2`, ...
    pub fn next_name(&mut self) -> String {
        self.counter += 1;
        format!("{}{}", self.prefix, self.counter)
    }

    /// The next name in sequence that `params` does not bind yet.
    pub fn next_free(&mut self, params: &BoundParams) -> String {
        loop {
            let name = self.next_name();
            if !params.contains(&name) {
                return name;
            }
        }
    }
}

/// SQL text plus the parameters it refers to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: BoundParams,
}

/// A SQL fragment with its own bindings, e.g. a blob build expression.
pub type Expression = Statement;

impl Statement {
    pub fn new(sql: impl Into<String>, params: BoundParams) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, BoundParams::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_never_overwrites() {
        let mut params = BoundParams::new();
        assert!(params.insert(":a", "x"));
        assert!(!params.insert(":a", "y"));
        assert_eq!(params.get(":a"), Some(&ParamValue::Text("x".into())));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_merge_rejects_conflicting_values() {
        let mut params: BoundParams = [(":min", 1i64)].into_iter().collect();
        params.merge([(":min", 1i64), (":max", 5)].into_iter().collect()).unwrap();
        assert_eq!(params.len(), 2);

        let err = params
            .merge([(":min", 9i64)].into_iter().collect())
            .unwrap_err();
        assert_eq!(err, DynamicError::ConflictingParameter { name: ":min".into() });
        assert_eq!(params.get(":min"), Some(&ParamValue::Int(1)));
    }

    #[test]
    fn test_insertion_order() {
        let params: BoundParams = [(":b", 1i64), (":a", 2), (":c", 3)].into_iter().collect();
        let names: Vec<_> = params.names().collect();
        assert_eq!(names, vec![":b", ":a", ":c"]);
    }

    #[test]
    fn test_placeholders_skip_taken_names() {
        let mut params = BoundParams::new();
        params.insert(":dcq1", "taken");
        let mut ph = Placeholders::new(":dcq");
        assert_eq!(ph.next_free(&params), ":dcq2");
        assert_eq!(ph.next_name(), ":dcq3");
        assert_eq!(ph.issued(), 3);
    }

    #[test]
    fn test_counters_are_independent() {
        let mut a = Placeholders::new(":p");
        let mut b = Placeholders::new(":p");
        assert_eq!(a.next_name(), ":p1");
        assert_eq!(a.next_name(), ":p2");
        assert_eq!(b.next_name(), ":p1");
    }
}
