//! Raw row values as read from the primary store.

use std::fmt;

/// A single column value with the primary store's loose typing.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// SQL NULL.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// Floating-point number.
    Real(f64),
    /// Text.
    Text(String),
    /// Binary data.
    Blob(Vec<u8>),
}

impl RawValue {
    /// Returns true for NULL and for text that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Short name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Integer(_) => "integer",
            RawValue::Real(_) => "real",
            RawValue::Text(_) => "text",
            RawValue::Blob(_) => "blob",
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("NULL"),
            RawValue::Integer(v) => write!(f, "{v}"),
            RawValue::Real(v) => write!(f, "{v}"),
            RawValue::Text(v) => write!(f, "{v:?}"),
            RawValue::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Integer(v)
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        RawValue::Integer(i64::from(v))
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Integer(i64::from(v))
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Real(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(RawValue::Null)
    }
}

/// One row of an entity table, columns in table order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    columns: Vec<(String, RawValue)>,
}

impl RawRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Adds a column.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<RawValue>) {
        self.columns.push((name.into(), value.into()));
    }

    /// Looks up a column by exact name.
    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Looks up the first present column among `names`.
    pub fn get_any(&self, names: &[&str]) -> Option<&RawValue> {
        names.iter().find_map(|name| self.get(name))
    }

    /// The row's `id` column, if it is an integer.
    pub fn id(&self) -> Option<i64> {
        match self.get("id")? {
            RawValue::Integer(id) => Some(*id),
            RawValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Iterates columns in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the record has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values() {
        assert!(RawValue::Null.is_blank());
        assert!(RawValue::Text("  ".into()).is_blank());
        assert!(!RawValue::Text("2024-01-01".into()).is_blank());
        assert!(!RawValue::Integer(0).is_blank());
    }

    #[test]
    fn record_lookup() {
        let record = RawRecord::new()
            .with("id", 7i64)
            .with("password", "hash")
            .with("deadline", None::<String>);

        assert_eq!(record.id(), Some(7));
        assert_eq!(
            record.get_any(&["password_hash", "password"]),
            Some(&RawValue::Text("hash".into()))
        );
        assert_eq!(record.get("deadline"), Some(&RawValue::Null));
        assert_eq!(record.get("missing"), None);
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn text_id_is_accepted() {
        let record = RawRecord::new().with("id", " 12 ");
        assert_eq!(record.id(), Some(12));
        let record = RawRecord::new().with("id", "abc");
        assert_eq!(record.id(), None);
    }
}
