// blpdata/src/result.rs
// Normalized output of a request.

use crate::element::Value;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// A named value in a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
  Null,
  Value(Value),
  /// Array of scalars, e.g. a curve's `type` list.
  List(Vec<Value>),
  /// Bulk (array-of-struct) field: one row per entry.
  Table(Vec<Row>),
  /// Date-indexed observations of one field.
  Series(BTreeMap<NaiveDate, Value>),
}

impl FieldValue {
  pub fn value(&self) -> Option<&Value> {
    match self {
      FieldValue::Value(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    self.value().and_then(Value::as_f64)
  }

  pub fn as_str(&self) -> Option<&str> {
    self.value().and_then(Value::as_str)
  }

  pub fn table(&self) -> Option<&[Row]> {
    match self {
      FieldValue::Table(rows) => Some(rows),
      _ => None,
    }
  }

  pub fn series(&self) -> Option<&BTreeMap<NaiveDate, Value>> {
    match self {
      FieldValue::Series(s) => Some(s),
      _ => None,
    }
  }
}

impl From<Value> for FieldValue {
  fn from(v: Value) -> Self { FieldValue::Value(v) }
}

pub type Row = BTreeMap<String, FieldValue>;

/// Rows keyed by security, field id, curve id or observation date.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultSet {
  rows: BTreeMap<String, Row>,
}

impl ResultSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize { self.rows.len() }
  pub fn is_empty(&self) -> bool { self.rows.is_empty() }

  pub fn get(&self, key: &str) -> Option<&Row> {
    self.rows.get(key)
  }

  pub fn value(&self, key: &str, field: &str) -> Option<&FieldValue> {
    self.rows.get(key).and_then(|row| row.get(field))
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.rows.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Row)> {
    self.rows.iter().map(|(k, r)| (k.as_str(), r))
  }

  /// Row for `key`, created empty when missing.
  pub fn row_mut(&mut self, key: &str) -> &mut Row {
    self.rows.entry(key.to_string()).or_default()
  }

  pub fn insert(&mut self, key: &str, row: Row) {
    self.rows.insert(key.to_string(), row);
  }

  pub fn to_json(&self) -> serde_json::Value {
    serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
  }
}
