// blpdata/src/request.rs
// Request parameter trees and the services they are created from.

use crate::base::BlpError;
use crate::element::{Datum, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Named endpoints a session can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
  /// Reference, historical, portfolio and screening data.
  RefData,
  /// Field metadata and field search.
  ApiFields,
  /// Security, government and curve lookup.
  Instruments,
  /// Technical analysis studies.
  TechnicalAnalysis,
}

impl Service {
  pub fn as_str(self) -> &'static str {
    match self {
      Service::RefData => "//blp/refdata",
      Service::ApiFields => "//blp/apiflds",
      Service::Instruments => "//blp/instruments",
      Service::TechnicalAnalysis => "//blp/tasvc",
    }
  }
}

impl fmt::Display for Service {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Service {
  type Err = BlpError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "//blp/refdata" => Ok(Service::RefData),
      "//blp/apiflds" => Ok(Service::ApiFields),
      "//blp/instruments" => Ok(Service::Instruments),
      "//blp/tasvc" => Ok(Service::TechnicalAnalysis),
      _ => Err(BlpError::InvalidParameter(format!("Unknown service '{}'", s))),
    }
  }
}

/// A mutable parameter tree for one operation of one service.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  service: String,
  operation: String,
  params: Datum,
}

impl Request {
  pub fn new(service: &str, operation: &str) -> Self {
    Request {
      service: service.to_string(),
      operation: operation.to_string(),
      params: Datum::Sequence(Vec::new()),
    }
  }

  pub fn service(&self) -> &str { &self.service }
  pub fn operation(&self) -> &str { &self.operation }
  pub fn params(&self) -> &Datum { &self.params }

  pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), BlpError> {
    self.params.set(name, value)
  }

  pub fn append(&mut self, name: &str, value: impl Into<Value>) -> Result<(), BlpError> {
    self.params.append(name, value)
  }

  pub fn element_mut(&mut self, name: &str) -> Result<&mut Datum, BlpError> {
    self.params.element_mut(name)
  }

  /// Appends one `{fieldId, value}` entry to the `overrides` array.
  pub fn add_override(&mut self, field_id: &str, value: impl Into<Value>) -> Result<(), BlpError> {
    let entry = self.params.element_mut("overrides")?.append_element()?;
    entry.set("fieldId", field_id)?;
    entry.set("value", value)
  }

  pub fn add_overrides(&mut self, overrides: &BTreeMap<String, Value>) -> Result<(), BlpError> {
    for (field_id, value) in overrides {
      self.add_override(field_id, value.clone())?;
    }
    Ok(())
  }
}

/// Looks `s` up among the tokens of a closed parameter domain.
pub(crate) fn parse_token<T: Copy>(what: &str, all: &[T], as_str: fn(T) -> &'static str, s: &str) -> Result<T, BlpError> {
  all.iter().copied().find(|t| as_str(*t) == s).ok_or_else(|| {
    let valid: Vec<&str> = all.iter().map(|t| as_str(*t)).collect();
    BlpError::InvalidParameter(format!("Invalid {} '{}'; expected one of: {}", what, s, valid.join(", ")))
  })
}

/// Deserializers shared by the request kinds' parameter structs.
pub(crate) mod de {
  use crate::element::parse_date;
  use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
  use serde::de::Error;
  use serde::{Deserialize, Deserializer};

  #[derive(Deserialize)]
  #[serde(untagged)]
  enum OneOrMany {
    One(String),
    Many(Vec<String>),
  }

  /// Accepts `"IBM US Equity"` as well as `["IBM US Equity", ...]`.
  pub fn one_or_many<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(d)? {
      OneOrMany::One(s) => vec![s],
      OneOrMany::Many(v) => v,
    })
  }

  pub fn date<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
    let s = String::deserialize(d)?;
    parse_date(&s).map_err(D::Error::custom)
  }

  /// A date (taken as midnight) or a `YYYY-MM-DDTHH:MM:SS` datetime.
  pub fn datetime<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
    let s = String::deserialize(d)?;
    if let Ok(dt) = NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S") {
      return Ok(dt);
    }
    parse_date(&s).map(|date| date.and_time(NaiveTime::default())).map_err(D::Error::custom)
  }

  pub fn opt_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
    match Option::<String>::deserialize(d)? {
      Some(s) => parse_date(&s).map(Some).map_err(D::Error::custom),
      None => Ok(None),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_overrides_are_field_value_pairs() {
    let mut req = Request::new(Service::RefData.as_str(), "ReferenceDataRequest");
    req.append("securities", "IBM US Equity").unwrap();
    let mut ovr = BTreeMap::new();
    ovr.insert("EQY_FUND_CRNCY".to_string(), Value::from("EUR"));
    ovr.insert("BEST_FPERIOD_OVERRIDE".to_string(), Value::from("1BF"));
    req.add_overrides(&ovr).unwrap();
    assert_eq!(req.params().to_json(), json!({
      "securities": ["IBM US Equity"],
      "overrides": [
        {"fieldId": "BEST_FPERIOD_OVERRIDE", "value": "1BF"},
        {"fieldId": "EQY_FUND_CRNCY", "value": "EUR"}
      ]
    }));
  }

  #[test]
  fn test_service_names() {
    assert_eq!("//blp/tasvc".parse::<Service>().unwrap(), Service::TechnicalAnalysis);
    assert!("//blp/mktdata".parse::<Service>().is_err());
  }
}
