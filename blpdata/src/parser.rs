// blpdata/src/parser.rs
// Helpers for walking response trees: error elements, flat and bulk fields,
// time series records.

use crate::base::{BlpError, ResponseError};
use crate::config::ErrorPolicy;
use crate::element::{Datum, Value};
use crate::result::{FieldValue, Row};
use chrono::NaiveDate;
use log::{error, warn};
use std::collections::BTreeMap;

pub const SECURITY_DATA: &str = "securityData";
pub const SECURITY: &str = "security";
pub const FIELD_DATA: &str = "fieldData";
pub const SECURITY_ERROR: &str = "securityError";
pub const FIELD_EXCEPTIONS: &str = "fieldExceptions";
pub const FIELD_ID: &str = "fieldId";
pub const ERROR_INFO: &str = "errorInfo";
pub const RESPONSE_ERROR: &str = "responseError";
pub const DATE: &str = "date";

/// Reads an `{source, code, category, message, subcategory}` block.
pub fn read_error_info(info: &Datum) -> ResponseError {
  ResponseError {
    source: info.string_or_empty("source"),
    code: info.get("code").and_then(Datum::value).and_then(Value::as_i64).unwrap_or_default(),
    category: info.string_or_empty("category"),
    message: info.string_or_empty("message"),
    subcategory: info.string_or_empty("subcategory"),
    security: None,
    field: None,
  }
}

/// Fails when a message root carries a request-level `responseError`.
pub fn check_response_error(root: &Datum) -> Result<(), BlpError> {
  match root.get(RESPONSE_ERROR) {
    Some(info) if !info.is_null() => {
      let err = read_error_info(info);
      error!("Request rejected by terminal: {}", err);
      Err(BlpError::RequestFailed(err))
    }
    _ => Ok(()),
  }
}

pub fn security_error(sec: &Datum, security: &str) -> Option<ResponseError> {
  sec.get(SECURITY_ERROR).filter(|d| !d.is_null()).map(|info| ResponseError {
    security: Some(security.to_string()),
    ..read_error_info(info)
  })
}

pub fn field_exceptions(sec: &Datum, security: &str) -> Vec<ResponseError> {
  sec.get(FIELD_EXCEPTIONS).map(Datum::items).unwrap_or_default().iter().map(|exc| {
    let detail = exc.get(ERROR_INFO).map(read_error_info).unwrap_or_default();
    ResponseError {
      security: Some(security.to_string()),
      field: Some(exc.string_or_empty(FIELD_ID)),
      ..detail
    }
  }).collect()
}

/// Outcome of checking one security's error elements against the policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Screened {
  /// Parse the security's data. Lists fields reported as errors (and omitted).
  Keep(Vec<String>),
  /// Drop the security's row.
  Skip,
}

/// Applies the security/field error policy to one `securityData` entry.
/// Errors are fatal unless the matching `ignore_*` flag is set.
pub fn screen_security(sec: &Datum, security: &str, policy: ErrorPolicy) -> Result<Screened, BlpError> {
  if let Some(err) = security_error(sec, security) {
    if policy.ignore_security_errors {
      warn!("Dropping {}: {}", security, err);
      return Ok(Screened::Skip);
    }
    error!("Security error for {}: {}", security, err);
    return Err(BlpError::SecurityError(err));
  }
  let exceptions = field_exceptions(sec, security);
  if let Some(first) = exceptions.first() {
    if !policy.ignore_field_errors {
      error!("Field error for {}: {}", security, first);
      return Err(BlpError::FieldError(first.clone()));
    }
    for exc in &exceptions {
      warn!("Omitting {} for {}: {}", exc.field.as_deref().unwrap_or("?"), security, exc.error_code());
    }
  }
  Ok(Screened::Keep(exceptions.into_iter().filter_map(|e| e.field).collect()))
}

/// Converts a datum to a row value: scalars stay scalars, arrays of scalars
/// become lists, arrays of sequences (bulk fields) become nested tables.
pub fn field_value(datum: &Datum) -> FieldValue {
  match datum {
    Datum::Null => FieldValue::Null,
    Datum::Scalar(v) => FieldValue::Value(v.clone()),
    Datum::Sequence(_) => FieldValue::Table(vec![flat_fields(datum)]),
    Datum::Array(items) => {
      if items.iter().all(|i| matches!(i, Datum::Scalar(_))) && !items.is_empty() {
        FieldValue::List(items.iter().filter_map(|i| i.value().cloned()).collect())
      } else {
        FieldValue::Table(items.iter().map(flat_fields).collect())
      }
    }
  }
}

/// One column per named child of `field_data`.
pub fn flat_fields(field_data: &Datum) -> Row {
  field_data.elements().iter()
    .map(|e| (e.name().to_string(), field_value(e.datum())))
    .collect()
}

/// Child rendered as a list of strings: arrays itemwise, a scalar as one item.
pub fn string_list(parent: &Datum, name: &str) -> Vec<String> {
  parent.get(name).map(Datum::items).unwrap_or_default().iter()
    .filter_map(|d| d.value().map(Value::to_string))
    .collect()
}

/// Parses a record's `date` element as a calendar date.
pub fn record_date(record: &Datum) -> Result<NaiveDate, BlpError> {
  let value = record.field(DATE)?.value()
    .ok_or_else(|| BlpError::ParseError("Record 'date' is not a scalar".to_string()))?;
  value.as_date().ok_or_else(|| BlpError::ParseError(format!("Record date '{}' is not a date", value)))
}

/// Folds time-series records (one per observation date) into per-field
/// series. Later records for an already-seen date replace earlier values.
pub fn merge_time_series(records: &Datum, into: &mut Row) -> Result<(), BlpError> {
  for record in records.items() {
    let date = record_date(record)?;
    for element in record.elements() {
      if element.name() == DATE {
        continue;
      }
      let Some(value) = element.datum().value() else { continue };
      let entry = into.entry(element.name().to_string())
        .or_insert_with(|| FieldValue::Series(BTreeMap::new()));
      if let FieldValue::Series(series) = entry {
        series.insert(date, value.clone());
      }
    }
  }
  Ok(())
}
