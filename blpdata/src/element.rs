// blpdata/src/element.rs
// Named, typed element trees used both for request parameters and responses.

use crate::base::BlpError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// A scalar leaf value as reported by the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Bool(bool),
  Int(i64),
  Float(f64),
  Date(NaiveDate),
  Datetime(NaiveDateTime),
  String(String),
}

impl Value {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  /// Numeric view. Strings are parsed, which is how weights arrive for some portfolio fields.
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Int(i) => Some(*i as f64),
      Value::Float(f) => Some(*f),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Value::Int(i) => Some(*i),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  /// Calendar date view: dates, the date part of datetimes, and `YYYY-MM-DD` / `YYYYMMDD` strings.
  pub fn as_date(&self) -> Option<NaiveDate> {
    match self {
      Value::Date(d) => Some(*d),
      Value::Datetime(dt) => Some(dt.date()),
      Value::String(s) => parse_date(s).ok(),
      _ => None,
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Bool(b) => write!(f, "{}", b),
      Value::Int(i) => write!(f, "{}", i),
      Value::Float(x) => write!(f, "{}", x),
      Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
      Value::Datetime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
      Value::String(s) => f.write_str(s),
    }
  }
}

impl From<&str> for Value { fn from(s: &str) -> Self { Value::String(s.to_string()) } }
impl From<String> for Value { fn from(s: String) -> Self { Value::String(s) } }
impl From<&String> for Value { fn from(s: &String) -> Self { Value::String(s.clone()) } }
impl From<bool> for Value { fn from(b: bool) -> Self { Value::Bool(b) } }
impl From<i32> for Value { fn from(i: i32) -> Self { Value::Int(i as i64) } }
impl From<u32> for Value { fn from(i: u32) -> Self { Value::Int(i as i64) } }
impl From<i64> for Value { fn from(i: i64) -> Self { Value::Int(i) } }
impl From<f64> for Value { fn from(x: f64) -> Self { Value::Float(x) } }
impl From<NaiveDate> for Value { fn from(d: NaiveDate) -> Self { Value::Date(d) } }
impl From<NaiveDateTime> for Value { fn from(dt: NaiveDateTime) -> Self { Value::Datetime(dt) } }

/// Parses `YYYYMMDD` (the terminal's request format) or `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate, BlpError> {
  let s = s.trim();
  NaiveDate::parse_from_str(s, "%Y%m%d")
    .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
    .map_err(|e| BlpError::InvalidParameter(format!("Invalid date '{}': {}", s, e)))
}

/// Formats a date the way request elements expect it.
pub fn request_date(date: NaiveDate) -> String {
  date.format("%Y%m%d").to_string()
}

/// Content of an element: nothing, a scalar, an array (of scalars or sequences),
/// or a sequence of named children.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Datum {
  #[default]
  Null,
  Scalar(Value),
  Array(Vec<Datum>),
  Sequence(Vec<Element>),
}

impl Datum {
  pub fn is_null(&self) -> bool {
    matches!(self, Datum::Null)
  }

  /// Child with the given name, for sequences.
  pub fn get(&self, name: &str) -> Option<&Datum> {
    match self {
      Datum::Sequence(children) => children.iter().find(|e| e.name == name).map(|e| &e.datum),
      _ => None,
    }
  }

  pub fn has(&self, name: &str) -> bool {
    self.get(name).is_some()
  }

  /// Like `get` but a missing child is a parse error.
  pub fn field(&self, name: &str) -> Result<&Datum, BlpError> {
    self.get(name).ok_or_else(|| BlpError::ParseError(format!("Missing element '{}'", name)))
  }

  pub fn value(&self) -> Option<&Value> {
    match self {
      Datum::Scalar(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    self.value().and_then(Value::as_str)
  }

  /// Child rendered as a string; scalars of any type are accepted.
  pub fn string(&self, name: &str) -> Result<String, BlpError> {
    match self.field(name)? {
      Datum::Scalar(v) => Ok(v.to_string()),
      Datum::Null => Ok(String::new()),
      _ => Err(BlpError::ParseError(format!("Element '{}' is not a scalar", name))),
    }
  }

  /// Child rendered as a string, empty when missing.
  pub fn string_or_empty(&self, name: &str) -> String {
    self.string(name).unwrap_or_default()
  }

  /// Array items. A single non-array datum is treated as a one-item array,
  /// a null as an empty one.
  pub fn items(&self) -> &[Datum] {
    match self {
      Datum::Array(items) => items,
      Datum::Null => &[],
      other => std::slice::from_ref(other),
    }
  }

  /// Named children of a sequence.
  pub fn elements(&self) -> &[Element] {
    match self {
      Datum::Sequence(children) => children,
      _ => &[],
    }
  }

  // --- Mutation, used to build request trees ---

  /// Child with the given name, created (as null) when missing.
  pub fn element_mut(&mut self, name: &str) -> Result<&mut Datum, BlpError> {
    if self.is_null() {
      *self = Datum::Sequence(Vec::new());
    }
    match self {
      Datum::Sequence(children) => {
        let idx = match children.iter().position(|e| e.name == name) {
          Some(i) => i,
          None => {
            children.push(Element::new(name, Datum::Null));
            children.len() - 1
          }
        };
        Ok(&mut children[idx].datum)
      }
      _ => Err(BlpError::InternalError(format!("Cannot add element '{}' to a non-sequence", name))),
    }
  }

  pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), BlpError> {
    *self.element_mut(name)? = Datum::Scalar(value.into());
    Ok(())
  }

  pub fn append(&mut self, name: &str, value: impl Into<Value>) -> Result<(), BlpError> {
    self.element_mut(name)?.append_value(value)
  }

  pub fn append_value(&mut self, value: impl Into<Value>) -> Result<(), BlpError> {
    self.array_mut()?.push(Datum::Scalar(value.into()));
    Ok(())
  }

  /// Appends an empty sequence to this array and returns it.
  pub fn append_element(&mut self) -> Result<&mut Datum, BlpError> {
    let items = self.array_mut()?;
    items.push(Datum::Sequence(Vec::new()));
    let last = items.len() - 1;
    Ok(&mut items[last])
  }

  /// Selects `name` as the active alternative of a choice element.
  pub fn set_choice(&mut self, name: &str) -> Result<&mut Datum, BlpError> {
    *self = Datum::Sequence(vec![Element::new(name, Datum::Sequence(Vec::new()))]);
    self.element_mut(name)
  }

  fn array_mut(&mut self) -> Result<&mut Vec<Datum>, BlpError> {
    if self.is_null() {
      *self = Datum::Array(Vec::new());
    }
    match self {
      Datum::Array(items) => Ok(items),
      _ => Err(BlpError::InternalError("Cannot append to a non-array element".to_string())),
    }
  }

  // --- JSON ---

  pub fn from_json(json: &JsonValue) -> Datum {
    match json {
      JsonValue::Null => Datum::Null,
      JsonValue::Bool(b) => Datum::Scalar(Value::Bool(*b)),
      JsonValue::Number(n) => match n.as_i64() {
        Some(i) => Datum::Scalar(Value::Int(i)),
        None => Datum::Scalar(Value::Float(n.as_f64().unwrap_or(f64::NAN))),
      },
      JsonValue::String(s) => Datum::Scalar(scalar_from_string(s)),
      JsonValue::Array(items) => Datum::Array(items.iter().map(Datum::from_json).collect()),
      JsonValue::Object(map) => Datum::Sequence(
        map.iter().map(|(k, v)| Element::new(k, Datum::from_json(v))).collect(),
      ),
    }
  }

  pub fn to_json(&self) -> JsonValue {
    match self {
      Datum::Null => JsonValue::Null,
      Datum::Scalar(v) => match v {
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Float(x) => serde_json::Number::from_f64(*x).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        Value::String(s) => JsonValue::String(s.clone()),
        other => JsonValue::String(other.to_string()),
      },
      Datum::Array(items) => JsonValue::Array(items.iter().map(Datum::to_json).collect()),
      Datum::Sequence(children) => JsonValue::Object(
        children.iter().map(|e| (e.name.clone(), e.datum.to_json())).collect(),
      ),
    }
  }
}

fn scalar_from_string(s: &str) -> Value {
  if s.len() == 10 {
    if let Ok(d) = s.parse::<NaiveDate>() {
      return Value::Date(d);
    }
  }
  if s.len() >= 19 && s.as_bytes().get(10) == Some(&b'T') {
    if let Ok(dt) = s.parse::<NaiveDateTime>() {
      return Value::Datetime(dt);
    }
  }
  Value::String(s.to_string())
}

/// A named datum.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
  name: String,
  datum: Datum,
}

impl Element {
  pub fn new(name: &str, datum: Datum) -> Self {
    Element { name: name.to_string(), datum }
  }

  pub fn name(&self) -> &str { &self.name }
  pub fn datum(&self) -> &Datum { &self.datum }

  pub fn from_json(name: &str, json: &JsonValue) -> Self {
    Element::new(name, Datum::from_json(json))
  }

  pub fn to_json(&self) -> JsonValue {
    self.datum.to_json()
  }
}
