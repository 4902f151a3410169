//! Stored-procedure call contract.

use crate::entity::EntityKind;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;

/// Canonical date format bound to procedure parameters (`YYYY-MM-DD`).
pub const WIRE_DATE_FORMAT: &str = "%Y-%m-%d";

/// A value bound to one named procedure parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// SQL NULL.
    Null,
    /// Integer (ids, foreign keys, 0/1 flags).
    Integer(i64),
    /// Exact decimal (money).
    Decimal(Decimal),
    /// Text.
    Text(String),
    /// Calendar date, bound as `YYYY-MM-DD` text.
    Date(NaiveDate),
}

impl ParamValue {
    /// Returns true if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    /// Textual form used when a driver binds everything as strings.
    ///
    /// Returns `None` for NULL.
    pub fn to_wire_text(&self) -> Option<String> {
        match self {
            ParamValue::Null => None,
            ParamValue::Integer(v) => Some(v.to_string()),
            ParamValue::Decimal(v) => Some(v.normalize().to_string()),
            ParamValue::Text(v) => Some(v.clone()),
            ParamValue::Date(v) => Some(v.format(WIRE_DATE_FORMAT).to_string()),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Integer(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Integer(i64::from(v))
    }
}

impl From<Decimal> for ParamValue {
    fn from(v: Decimal) -> Self {
        ParamValue::Decimal(v)
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(v: NaiveDate) -> Self {
        ParamValue::Date(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Null => serializer.serialize_none(),
            ParamValue::Integer(v) => serializer.serialize_i64(*v),
            ParamValue::Decimal(v) => serializer.collect_str(&v.normalize()),
            ParamValue::Text(v) => serializer.serialize_str(v),
            ParamValue::Date(v) => serializer.collect_str(&v.format(WIRE_DATE_FORMAT)),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_wire_text() {
            None => f.write_str("NULL"),
            Some(text) => match self {
                ParamValue::Text(_) | ParamValue::Date(_) => write!(f, "'{text}'"),
                _ => f.write_str(&text),
            },
        }
    }
}

/// One invocation of a secondary-store upsert procedure.
///
/// Parameters are bound by name; names come from
/// [`EntityKind::parameter_names`] so every call for a kind carries the same
/// parameter set in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureCall {
    procedure: String,
    entity: EntityKind,
    record_id: i64,
    params: Vec<(&'static str, ParamValue)>,
}

impl ProcedureCall {
    /// Binds `values` to the parameter names of `entity`'s procedure.
    ///
    /// `values` must be in parameter order; surplus values are dropped and
    /// missing trailing values bind as NULL.
    pub fn new(entity: EntityKind, record_id: i64, values: Vec<ParamValue>) -> Self {
        let names = entity.parameter_names();
        debug_assert_eq!(names.len(), values.len(), "parameter count for {entity}");

        let mut values = values.into_iter();
        let params = names
            .iter()
            .map(|name| (*name, values.next().unwrap_or(ParamValue::Null)))
            .collect();

        Self {
            procedure: entity.procedure().to_string(),
            entity,
            record_id,
            params,
        }
    }

    /// Prepends `prefix` to the procedure name (e.g. `sp_`).
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() {
            self.procedure = format!("{prefix}{}", self.procedure);
        }
        self
    }

    /// Procedure name.
    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    /// Entity kind the call replicates.
    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    /// Primary-store id of the replicated record.
    pub fn record_id(&self) -> i64 {
        self.record_id
    }

    /// Named parameters in call order.
    pub fn params(&self) -> &[(&'static str, ParamValue)] {
        &self.params
    }

    /// Looks up one parameter by name.
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|(param, _)| *param == name)
            .map(|(_, value)| value)
    }

    /// Named placeholders in call order: `:id, :username, ...`.
    pub fn placeholders(&self) -> String {
        self.params
            .iter()
            .map(|(name, _)| format!(":{name}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ProcedureCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.procedure)?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name} => {value}")?;
        }
        f.write_str(")")
    }
}
