/// Values and Rows
///
/// `Value` is the scalar exchanged with drivers in both directions (bound
/// parameters and fetched cells). `Row` is the decoded, name-addressed form of
/// one result row, optionally carrying one nested row per join alias.
use serde::ser::{Serialize, SerializeMap, Serializer};

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }
}

macro_rules! integer_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Integer(v as i64)
            }
        })*
    };
}

integer_from!(i8, i16, i32, i64, u8, u16, u32, isize);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One entry of a decoded row.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A column of the table itself
    Value(Value),
    /// The columns of a joined table; `None` when a LEFT JOIN found no match
    Joined(Option<Row>),
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Field::Value(v) => v.serialize(serializer),
            Field::Joined(Some(row)) => row.serialize(serializer),
            Field::Joined(None) => serializer.serialize_none(),
        }
    }
}

/// A decoded result row: column name to field, in result order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    entries: Vec<(String, Field)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing an earlier entry with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.set(name.into(), Field::Value(value));
    }

    /// Sets the nested row stored under a join alias.
    pub fn insert_joined(&mut self, alias: impl Into<String>, row: Option<Row>) {
        self.set(alias.into(), Field::Joined(row));
    }

    fn set(&mut self, name: String, field: Field) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = field,
            None => self.entries.push((name, field)),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// The scalar value of a column; `None` if absent or if `name` is a join alias.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.field(name)? {
            Field::Value(v) => Some(v),
            Field::Joined(_) => None,
        }
    }

    /// The nested row under a join alias.
    ///
    /// `None` when there is no such alias, `Some(None)` for an unmatched LEFT JOIN.
    pub fn joined(&self, alias: &str) -> Option<Option<&Row>> {
        match self.field(alias)? {
            Field::Joined(row) => Some(row.as_ref()),
            Field::Value(_) => None,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.entries.iter().map(|(n, f)| (n.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> crate::core::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, field) in &self.entries {
            map.serialize_entry(name, field)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v.into());
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(5), Value::Integer(5));
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from("x"), Value::Text("x".to_string()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(2.5)), Value::Real(2.5));
    }

    #[test]
    fn test_row_insert_overwrites_duplicates() {
        let mut row = Row::new();
        row.insert("id", Value::Integer(1));
        row.insert("id", Value::Integer(2));
        assert_eq!(row.len(), 1);
        assert_eq!(row.get("id"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_row_joined_access() {
        let mut row: Row = [("id", 1)].into_iter().collect();
        row.insert_joined("book", None);
        assert_eq!(row.joined("book"), Some(None));
        assert_eq!(row.get("book"), None);
        assert_eq!(row.joined("id"), None);
        assert_eq!(row.joined("missing"), None);
    }

    #[test]
    fn test_row_serializes_as_object() {
        let child: Row = [("value", Value::from(18)), ("name", Value::from("mint"))]
            .into_iter()
            .collect();
        let mut row: Row = [("id", Value::from(2)), ("note", Value::Null)].into_iter().collect();
        row.insert_joined("book", Some(child));
        row.insert_joined("other", None);

        assert_eq!(
            row.to_json().unwrap(),
            json!({"id": 2, "note": null, "book": {"value": 18, "name": "mint"}, "other": null})
        );
    }
}
