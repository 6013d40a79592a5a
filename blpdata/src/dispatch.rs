// blpdata/src/dispatch.rs
// Selecting a request kind by name and decoding its parameters from JSON.

use crate::base::BlpError;
use crate::config::{ErrorPolicy, OptionsOverlay};
use crate::event::Response;
use crate::field::{FieldInfoRequest, FieldSearchRequest};
use crate::instrument::{normalize_security_key, CurveSearch, GovernmentSearch, SecuritySearch};
use crate::lifecycle::{EventRetention, RequestKind};
use crate::reference::{HistoricalDataRequest, PortfolioDataRequest, ReferenceDataRequest};
use crate::request::{Request, Service};
use crate::result::ResultSet;
use crate::screen::EquityScreenRequest;
use crate::study::TechnicalStudyRequest;
use crate::table::Table;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequestType {
  ReferenceData,
  HistoricalData,
  FieldSearch,
  FieldInfo,
  PortfolioData,
  EquityScreen,
  GovernmentSearch,
  CurveSearch,
  SecuritySearch,
  Study,
}

static REQUEST_TYPES: Lazy<BTreeMap<&'static str, RequestType>> = Lazy::new(|| {
  let mut m = BTreeMap::new();
  m.insert("ReferenceDataRequest", RequestType::ReferenceData);
  m.insert("HistoricalDataRequest", RequestType::HistoricalData);
  m.insert("FieldSearch", RequestType::FieldSearch);
  m.insert("FieldInfo", RequestType::FieldInfo);
  m.insert("PortfolioDataRequest", RequestType::PortfolioData);
  m.insert("EQS", RequestType::EquityScreen);
  m.insert("GovernmentSearch", RequestType::GovernmentSearch);
  m.insert("CurveSearch", RequestType::CurveSearch);
  m.insert("SecuritySearch", RequestType::SecuritySearch);
  m.insert("Study", RequestType::Study);
  m
});

impl RequestType {
  /// Every dispatchable name, sorted.
  pub fn names() -> Vec<&'static str> {
    REQUEST_TYPES.keys().copied().collect()
  }

  pub fn name(self) -> &'static str {
    REQUEST_TYPES.iter().find(|(_, t)| **t == self).map(|(n, _)| *n).unwrap_or("?")
  }

  /// Renders a result of this type: historical data as a wide date-indexed
  /// table, everything else as one row per key.
  pub fn table(self, result: &ResultSet) -> Table {
    match self {
      RequestType::HistoricalData => Table::from_time_series(result),
      RequestType::SecuritySearch => Table::from_records("security", result).map_index(normalize_security_key),
      RequestType::FieldInfo | RequestType::FieldSearch => Table::from_records("field", result),
      RequestType::GovernmentSearch => Table::from_records("sec_id", result),
      RequestType::CurveSearch => Table::from_records("curve", result),
      RequestType::Study => Table::from_records("date", result),
      RequestType::ReferenceData | RequestType::PortfolioData | RequestType::EquityScreen => {
        Table::from_records("security", result)
      }
    }
  }
}

impl fmt::Display for RequestType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for RequestType {
  type Err = BlpError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    REQUEST_TYPES.get(s).copied().ok_or_else(|| {
      BlpError::InvalidParameter(format!("Unknown request type '{}'; available: {}", s, Self::names().join(", ")))
    })
  }
}

/// Any concrete request kind, as selected by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnyRequest {
  ReferenceData(ReferenceDataRequest),
  HistoricalData(HistoricalDataRequest),
  FieldSearch(FieldSearchRequest),
  FieldInfo(FieldInfoRequest),
  PortfolioData(PortfolioDataRequest),
  EquityScreen(EquityScreenRequest),
  GovernmentSearch(GovernmentSearch),
  CurveSearch(CurveSearch),
  SecuritySearch(SecuritySearch),
  Study(TechnicalStudyRequest),
}

fn decode<T: DeserializeOwned>(request_type: RequestType, params: &JsonValue) -> Result<T, BlpError> {
  serde_json::from_value(params.clone())
    .map_err(|e| BlpError::InvalidParameter(format!("Bad parameters for {}: {}", request_type, e)))
}

/// Top-level keys `value` serializes to.
fn keys_of<T: Serialize>(request_type: RequestType, value: &T) -> Result<Vec<String>, BlpError> {
  match serde_json::to_value(value) {
    Ok(JsonValue::Object(map)) => Ok(map.into_iter().map(|(k, _)| k).collect()),
    Ok(other) => Err(BlpError::InternalError(format!("{} parameters serialized to {}", request_type, other))),
    Err(e) => Err(BlpError::InternalError(format!("Failed to serialize {} parameters: {}", request_type, e))),
  }
}

/// Rejects keys that neither the request kind nor the options block reads,
/// so a misspelled parameter fails instead of silently taking its default.
fn check_known_keys(
  request_type: RequestType,
  params: &JsonValue,
  request: &AnyRequest,
  overlay: &OptionsOverlay,
) -> Result<(), BlpError> {
  let mut known = keys_of(request_type, request)?;
  known.extend(keys_of(request_type, overlay)?);
  let Some(object) = params.as_object() else {
    return Ok(());
  };
  if let Some(unknown) = object.keys().find(|k| !known.contains(k)) {
    known.sort();
    return Err(BlpError::InvalidParameter(format!(
      "Unknown parameter '{}' for {}; expected one of: {}", unknown, request_type, known.join(", "))));
  }
  Ok(())
}

impl AnyRequest {
  /// Decodes kind-specific parameters plus the common configuration block
  /// (`host`, `port`, `ignore_security_errors`, `ignore_field_errors`,
  /// `deadline_ms`) from one JSON object. Any other key is an error.
  pub fn from_params(request_type: RequestType, params: &JsonValue) -> Result<(AnyRequest, OptionsOverlay), BlpError> {
    let empty = JsonValue::Object(Default::default());
    let params = if params.is_null() { &empty } else { params };
    if !params.is_object() {
      return Err(BlpError::InvalidParameter(format!("Parameters for {} must be a JSON object", request_type)));
    }
    let request = match request_type {
      RequestType::ReferenceData => AnyRequest::ReferenceData(decode(request_type, params)?),
      RequestType::HistoricalData => AnyRequest::HistoricalData(decode(request_type, params)?),
      RequestType::FieldSearch => AnyRequest::FieldSearch(decode(request_type, params)?),
      RequestType::FieldInfo => AnyRequest::FieldInfo(decode(request_type, params)?),
      RequestType::PortfolioData => AnyRequest::PortfolioData(decode(request_type, params)?),
      RequestType::EquityScreen => AnyRequest::EquityScreen(decode(request_type, params)?),
      RequestType::GovernmentSearch => AnyRequest::GovernmentSearch(decode(request_type, params)?),
      RequestType::CurveSearch => AnyRequest::CurveSearch(decode(request_type, params)?),
      RequestType::SecuritySearch => AnyRequest::SecuritySearch(decode(request_type, params)?),
      RequestType::Study => AnyRequest::Study(decode(request_type, params)?),
    };
    let overlay = decode(request_type, params)?;
    check_known_keys(request_type, params, &request, &overlay)?;
    Ok((request, overlay))
  }

  pub fn request_type(&self) -> RequestType {
    match self {
      AnyRequest::ReferenceData(_) => RequestType::ReferenceData,
      AnyRequest::HistoricalData(_) => RequestType::HistoricalData,
      AnyRequest::FieldSearch(_) => RequestType::FieldSearch,
      AnyRequest::FieldInfo(_) => RequestType::FieldInfo,
      AnyRequest::PortfolioData(_) => RequestType::PortfolioData,
      AnyRequest::EquityScreen(_) => RequestType::EquityScreen,
      AnyRequest::GovernmentSearch(_) => RequestType::GovernmentSearch,
      AnyRequest::CurveSearch(_) => RequestType::CurveSearch,
      AnyRequest::SecuritySearch(_) => RequestType::SecuritySearch,
      AnyRequest::Study(_) => RequestType::Study,
    }
  }

  pub fn as_kind(&self) -> &dyn RequestKind {
    match self {
      AnyRequest::ReferenceData(r) => r,
      AnyRequest::HistoricalData(r) => r,
      AnyRequest::FieldSearch(r) => r,
      AnyRequest::FieldInfo(r) => r,
      AnyRequest::PortfolioData(r) => r,
      AnyRequest::EquityScreen(r) => r,
      AnyRequest::GovernmentSearch(r) => r,
      AnyRequest::CurveSearch(r) => r,
      AnyRequest::SecuritySearch(r) => r,
      AnyRequest::Study(r) => r,
    }
  }
}

impl RequestKind for AnyRequest {
  fn service(&self) -> Service { self.as_kind().service() }
  fn operation(&self) -> &'static str { self.as_kind().operation() }
  fn validate(&self) -> Result<(), BlpError> { self.as_kind().validate() }
  fn generate(&self, request: &mut Request) -> Result<(), BlpError> { self.as_kind().generate(request) }
  fn process(&self, response: &Response, policy: ErrorPolicy) -> Result<ResultSet, BlpError> {
    self.as_kind().process(response, policy)
  }
  fn retention(&self) -> EventRetention { self.as_kind().retention() }
}
