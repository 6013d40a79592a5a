// blpdata/src/reference.rs
// Reference, historical and portfolio requests on the reference data service.

use crate::base::BlpError;
use crate::config::ErrorPolicy;
use crate::element::{request_date, Datum, Value};
use crate::event::Response;
use crate::lifecycle::{EventRetention, RequestKind};
use crate::parser::{
  check_response_error, flat_fields, merge_time_series, screen_security, Screened, FIELD_DATA, SECURITY,
  SECURITY_DATA,
};
use crate::request::{de, Request, Service};
use crate::result::{FieldValue, ResultSet, Row};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn require_non_empty(what: &str, items: &[String]) -> Result<(), BlpError> {
  if items.is_empty() || items.iter().any(|s| s.trim().is_empty()) {
    return Err(BlpError::InvalidParameter(format!("{} must be a non-empty list of non-empty names", what)));
  }
  Ok(())
}

fn append_all(request: &mut Request, name: &str, items: &[String]) -> Result<(), BlpError> {
  for item in items {
    request.append(name, item)?;
  }
  Ok(())
}

/// Reads `securityData` entries into one row per kept security, with `read`
/// filling the row from the entry.
fn collect_security_data<F>(
  securities: &Datum,
  policy: ErrorPolicy,
  result: &mut ResultSet,
  mut read: F,
) -> Result<(), BlpError>
where
  F: FnMut(&Datum, &mut Row) -> Result<(), BlpError>,
{
  for sec in securities.items() {
    let security = sec.string(SECURITY)?;
    match screen_security(sec, &security, policy)? {
      Screened::Skip => continue,
      Screened::Keep(omitted) => {
        if !omitted.is_empty() {
          debug!("{}: omitted fields {:?}", security, omitted);
        }
        let row = result.row_mut(&security);
        if let Some(field_data) = sec.get(FIELD_DATA) {
          read(field_data, row)?;
        }
      }
    }
  }
  Ok(())
}

/// Reads the usual `securityData` shape shared by reference data and equity
/// screens: one flat row per security.
pub(crate) fn process_security_data(securities: &Datum, policy: ErrorPolicy, result: &mut ResultSet) -> Result<(), BlpError> {
  collect_security_data(securities, policy, result, |field_data, row| {
    row.extend(flat_fields(field_data));
    Ok(())
  })
}

// --- ReferenceDataRequest ---

/// Identifier fields looked up by `BlpClient::identifiers`.
pub const IDENTIFIER_FIELDS: [&str; 5] = ["EQY_FUND_TICKER", "ID_CUSIP", "ID_ISIN", "ID_BB_GLOBAL", "CENTRAL_INDEX_KEY_NUMBER"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDataRequest {
  #[serde(deserialize_with = "de::one_or_many")]
  pub securities: Vec<String>,
  #[serde(deserialize_with = "de::one_or_many")]
  pub fields: Vec<String>,
  #[serde(default)]
  pub overrides: BTreeMap<String, Value>,
}

impl ReferenceDataRequest {
  pub fn new<S: Into<String>, F: Into<String>>(
    securities: impl IntoIterator<Item = S>,
    fields: impl IntoIterator<Item = F>,
  ) -> Self {
    ReferenceDataRequest {
      securities: securities.into_iter().map(Into::into).collect(),
      fields: fields.into_iter().map(Into::into).collect(),
      overrides: BTreeMap::new(),
    }
  }

  pub fn with_override(mut self, field_id: &str, value: impl Into<Value>) -> Self {
    self.overrides.insert(field_id.to_string(), value.into());
    self
  }
}

impl RequestKind for ReferenceDataRequest {
  fn service(&self) -> Service { Service::RefData }
  fn operation(&self) -> &'static str { "ReferenceDataRequest" }

  fn validate(&self) -> Result<(), BlpError> {
    require_non_empty("securities", &self.securities)?;
    require_non_empty("fields", &self.fields)
  }

  fn generate(&self, request: &mut Request) -> Result<(), BlpError> {
    append_all(request, "securities", &self.securities)?;
    append_all(request, "fields", &self.fields)?;
    request.add_overrides(&self.overrides)
  }

  /// Large requests arrive as several messages, each covering a group of
  /// securities.
  fn process(&self, response: &Response, policy: ErrorPolicy) -> Result<ResultSet, BlpError> {
    let mut result = ResultSet::new();
    for msg in response.messages() {
      check_response_error(msg.root())?;
      process_security_data(msg.root().field(SECURITY_DATA)?, policy, &mut result)?;
    }
    Ok(result)
  }

  fn retention(&self) -> EventRetention {
    EventRetention::All
  }
}

// --- HistoricalDataRequest ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Periodicity {
  #[default]
  Daily,
  Weekly,
  Monthly,
  Quarterly,
  SemiAnnually,
  Yearly,
}

impl Periodicity {
  pub fn as_str(self) -> &'static str {
    match self {
      Periodicity::Daily => "DAILY",
      Periodicity::Weekly => "WEEKLY",
      Periodicity::Monthly => "MONTHLY",
      Periodicity::Quarterly => "QUARTERLY",
      Periodicity::SemiAnnually => "SEMI_ANNUALLY",
      Periodicity::Yearly => "YEARLY",
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodicityAdjustment {
  #[default]
  Actual,
  Calendar,
  Fiscal,
}

impl PeriodicityAdjustment {
  pub fn as_str(self) -> &'static str {
    match self {
      PeriodicityAdjustment::Actual => "ACTUAL",
      PeriodicityAdjustment::Calendar => "CALENDAR",
      PeriodicityAdjustment::Fiscal => "FISCAL",
    }
  }
}

fn default_max_points() -> u32 { 100 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalDataRequest {
  #[serde(deserialize_with = "de::one_or_many")]
  pub securities: Vec<String>,
  #[serde(deserialize_with = "de::one_or_many")]
  pub fields: Vec<String>,
  #[serde(deserialize_with = "de::date")]
  pub start_date: NaiveDate,
  #[serde(deserialize_with = "de::date")]
  pub end_date: NaiveDate,
  #[serde(default)]
  pub periodicity: Periodicity,
  #[serde(default)]
  pub periodicity_adjustment: PeriodicityAdjustment,
  #[serde(default = "default_max_points")]
  pub max_points: u32,
  #[serde(default)]
  pub overrides: BTreeMap<String, Value>,
}

impl HistoricalDataRequest {
  pub fn new<S: Into<String>, F: Into<String>>(
    securities: impl IntoIterator<Item = S>,
    fields: impl IntoIterator<Item = F>,
    start_date: NaiveDate,
    end_date: NaiveDate,
  ) -> Self {
    HistoricalDataRequest {
      securities: securities.into_iter().map(Into::into).collect(),
      fields: fields.into_iter().map(Into::into).collect(),
      start_date,
      end_date,
      periodicity: Periodicity::default(),
      periodicity_adjustment: PeriodicityAdjustment::default(),
      max_points: default_max_points(),
      overrides: BTreeMap::new(),
    }
  }

  pub fn with_periodicity(mut self, periodicity: Periodicity, adjustment: PeriodicityAdjustment) -> Self {
    self.periodicity = periodicity;
    self.periodicity_adjustment = adjustment;
    self
  }

  pub fn with_max_points(mut self, max_points: u32) -> Self {
    self.max_points = max_points;
    self
  }

  pub fn with_override(mut self, field_id: &str, value: impl Into<Value>) -> Self {
    self.overrides.insert(field_id.to_string(), value.into());
    self
  }
}

impl RequestKind for HistoricalDataRequest {
  fn service(&self) -> Service { Service::RefData }
  fn operation(&self) -> &'static str { "HistoricalDataRequest" }

  fn validate(&self) -> Result<(), BlpError> {
    require_non_empty("securities", &self.securities)?;
    require_non_empty("fields", &self.fields)?;
    if self.start_date > self.end_date {
      return Err(BlpError::InvalidParameter(format!(
        "start_date {} is after end_date {}", self.start_date, self.end_date)));
    }
    if self.max_points == 0 {
      return Err(BlpError::InvalidParameter("max_points must be positive".to_string()));
    }
    Ok(())
  }

  fn generate(&self, request: &mut Request) -> Result<(), BlpError> {
    append_all(request, "securities", &self.securities)?;
    append_all(request, "fields", &self.fields)?;
    request.set("startDate", request_date(self.start_date))?;
    request.set("endDate", request_date(self.end_date))?;
    request.set("periodicitySelection", self.periodicity.as_str())?;
    request.set("periodicityAdjustment", self.periodicity_adjustment.as_str())?;
    request.set("maxDataPoints", self.max_points)?;
    request.add_overrides(&self.overrides)
  }

  /// Each message carries one security's chunk of records; chunks for the
  /// same security are merged in arrival order.
  fn process(&self, response: &Response, policy: ErrorPolicy) -> Result<ResultSet, BlpError> {
    let mut result = ResultSet::new();
    for msg in response.messages() {
      check_response_error(msg.root())?;
      collect_security_data(msg.root().field(SECURITY_DATA)?, policy, &mut result, |records, row| {
        merge_time_series(records, row)
      })?;
    }
    Ok(result)
  }

  fn retention(&self) -> EventRetention {
    EventRetention::All
  }
}

// --- PortfolioDataRequest ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortfolioField {
  #[serde(rename = "PORTFOLIO_MEMBER")]
  Member,
  #[serde(rename = "PORTFOLIO_MPOSITION")]
  Position,
  #[default]
  #[serde(rename = "PORTFOLIO_MWEIGHT")]
  Weight,
  #[serde(rename = "PORTFOLIO_DATA")]
  Data,
}

impl PortfolioField {
  pub fn as_str(self) -> &'static str {
    match self {
      PortfolioField::Member => "PORTFOLIO_MEMBER",
      PortfolioField::Position => "PORTFOLIO_MPOSITION",
      PortfolioField::Weight => "PORTFOLIO_MWEIGHT",
      PortfolioField::Data => "PORTFOLIO_DATA",
    }
  }
}

const POSITION_SECURITY: &str = "Security";
const NUMERIC_POSITION_ELEMENTS: [&str; 3] = ["Weight", "Position", "Market Value"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioDataRequest {
  /// Portfolio id as shown by PRTU, e.g. `U12345678-1 Client`.
  pub portfolio_id: String,
  #[serde(default)]
  pub field: PortfolioField,
  #[serde(default, deserialize_with = "de::opt_date")]
  pub reference_date: Option<NaiveDate>,
}

impl PortfolioDataRequest {
  pub fn new(portfolio_id: &str) -> Self {
    PortfolioDataRequest { portfolio_id: portfolio_id.to_string(), field: PortfolioField::default(), reference_date: None }
  }

  pub fn with_field(mut self, field: PortfolioField) -> Self {
    self.field = field;
    self
  }

  pub fn as_of(mut self, date: NaiveDate) -> Self {
    self.reference_date = Some(date);
    self
  }
}

fn position_row(position: &Datum) -> Result<Row, BlpError> {
  let mut row = Row::new();
  for element in position.elements() {
    let name = element.name();
    if name == POSITION_SECURITY {
      continue;
    }
    let value = match element.datum().value() {
      Some(v) if NUMERIC_POSITION_ELEMENTS.contains(&name) => {
        let x = v.as_f64()
          .ok_or_else(|| BlpError::ParseError(format!("Position '{}' is not numeric: {}", name, v)))?;
        FieldValue::Value(Value::Float(x))
      }
      _ => crate::parser::field_value(element.datum()),
    };
    row.insert(name.to_string(), value);
  }
  Ok(row)
}

impl RequestKind for PortfolioDataRequest {
  fn service(&self) -> Service { Service::RefData }
  fn operation(&self) -> &'static str { "PortfolioDataRequest" }

  fn validate(&self) -> Result<(), BlpError> {
    if self.portfolio_id.trim().is_empty() {
      return Err(BlpError::InvalidParameter("portfolio_id must not be empty".to_string()));
    }
    Ok(())
  }

  fn generate(&self, request: &mut Request) -> Result<(), BlpError> {
    request.append("securities", &self.portfolio_id)?;
    request.append("fields", self.field.as_str())?;
    if let Some(date) = self.reference_date {
      request.add_override("REFERENCE_DATE", request_date(date))?;
    }
    Ok(())
  }

  fn process(&self, response: &Response, policy: ErrorPolicy) -> Result<ResultSet, BlpError> {
    let mut result = ResultSet::new();
    let root = response.first_message()?.root();
    check_response_error(root)?;
    let Some(portfolio) = root.field(SECURITY_DATA)?.items().first() else {
      return Ok(result);
    };
    if screen_security(portfolio, &self.portfolio_id, policy)? == Screened::Skip {
      return Ok(result);
    }
    let positions = portfolio.field(FIELD_DATA)?.get(self.field.as_str()).map(Datum::items).unwrap_or_default();
    for position in positions {
      let security = position.string(POSITION_SECURITY)?;
      result.insert(&security, position_row(position)?);
    }
    Ok(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ClientOptions;
  use crate::conn_mock::{ScriptStep, ScriptedProvider};
  use crate::lifecycle::run;
  use serde_json::json;
  use std::time::Duration;

  fn fast() -> ClientOptions {
    ClientOptions::default().with_poll_timeout(Duration::from_millis(5))
  }

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn refdata_provider() -> ScriptedProvider {
    ScriptedProvider::new().respond("ReferenceDataRequest", vec![
      ScriptStep::response("ReferenceDataResponse", json!({"securityData": [
        {"security": "IBM US Equity", "sequenceNumber": 0, "fieldExceptions": [],
         "fieldData": {"PX_LAST": 141.5, "NAME": "INTL BUSINESS MACHINES CORP",
                       "DVD_HIST": [{"Declared Date": "2020-01-28", "Dividend Amount": 1.62}]}},
        {"security": "AAPL US Equity", "sequenceNumber": 1, "fieldExceptions": [],
         "fieldData": {"PX_LAST": 320.0, "NAME": "APPLE INC", "DVD_HIST": []}}
      ]})),
    ])
  }

  #[test]
  fn test_reference_rows_per_security_and_field() {
    let provider = refdata_provider();
    let req = ReferenceDataRequest::new(["IBM US Equity", "AAPL US Equity"], ["PX_LAST", "NAME", "DVD_HIST"])
      .with_override("EQY_FUND_CRNCY", "EUR");
    let rs = run(&provider, &fast(), &req).unwrap();
    assert_eq!(rs.len(), 2);
    for (_, row) in rs.iter() {
      assert_eq!(row.len(), 3);
    }
    assert_eq!(rs.value("IBM US Equity", "DVD_HIST").and_then(FieldValue::table).map(<[Row]>::len), Some(1));
    assert_eq!(rs.value("AAPL US Equity", "DVD_HIST"), Some(&FieldValue::Table(vec![])));

    let sent = &provider.journal().requests()[0];
    assert_eq!(sent.params().to_json(), json!({
      "securities": ["IBM US Equity", "AAPL US Equity"],
      "fields": ["PX_LAST", "NAME", "DVD_HIST"],
      "overrides": [{"fieldId": "EQY_FUND_CRNCY", "value": "EUR"}]
    }));
  }

  #[test]
  fn test_reference_is_idempotent() {
    let provider = refdata_provider();
    let req = ReferenceDataRequest::new(["IBM US Equity"], ["PX_LAST"]);
    let first = run(&provider, &fast(), &req).unwrap();
    let second = run(&provider, &fast(), &req).unwrap();
    assert_eq!(first, second);
    assert_eq!(provider.journal().sessions_stopped(), 2);
  }

  fn mixed_provider() -> ScriptedProvider {
    ScriptedProvider::new().respond("ReferenceDataRequest", vec![
      ScriptStep::response("ReferenceDataResponse", json!({"securityData": [
        {"security": "IBM US Equity", "fieldExceptions": [
          {"fieldId": "NOT_A_FIELD", "errorInfo": {"source": "3923::bbdbd11", "code": 9, "category": "BAD_FLD",
                                                    "message": "Field not valid", "subcategory": "INVALID_FIELD"}}],
         "fieldData": {"PX_LAST": 141.5}},
        {"security": "bad sec", "fieldExceptions": [],
         "securityError": {"source": "3923::bbdbd11", "code": 15, "category": "BAD_SEC",
                           "message": "Unknown/Invalid security", "subcategory": "INVALID_SECURITY"},
         "fieldData": {}}
      ]})),
    ])
  }

  #[test]
  fn test_error_suppression() {
    let req = ReferenceDataRequest::new(["IBM US Equity", "bad sec"], ["PX_LAST", "NOT_A_FIELD"]);

    let err = run(&mixed_provider(), &fast(), &req).unwrap_err();
    assert_eq!(err.error_code(), Some("INVALID_FIELD"));

    let err = run(&mixed_provider(), &fast().ignore_field_errors(true), &req).unwrap_err();
    assert_eq!(err.error_code(), Some("INVALID_SECURITY"));

    let lenient = fast().ignore_field_errors(true).ignore_security_errors(true);
    let rs = run(&mixed_provider(), &lenient, &req).unwrap();
    assert_eq!(rs.keys().collect::<Vec<_>>(), vec!["IBM US Equity"]);
    assert_eq!(rs.value("IBM US Equity", "PX_LAST").and_then(FieldValue::as_f64), Some(141.5));
    assert!(rs.value("IBM US Equity", "NOT_A_FIELD").is_none());
  }

  #[test]
  fn test_reference_keeps_securities_from_partial_events() {
    let provider = ScriptedProvider::new().respond("ReferenceDataRequest", vec![
      ScriptStep::partial("ReferenceDataResponse", json!({"securityData": [
        {"security": "IBM US Equity", "sequenceNumber": 0, "fieldExceptions": [], "fieldData": {"PX_LAST": 141.5}}
      ]})),
      ScriptStep::Silence,
      ScriptStep::response("ReferenceDataResponse", json!({"securityData": [
        {"security": "AAPL US Equity", "sequenceNumber": 1, "fieldExceptions": [], "fieldData": {"PX_LAST": 320.0}}
      ]})),
    ]);
    let req = ReferenceDataRequest::new(["IBM US Equity", "AAPL US Equity"], ["PX_LAST"]);
    let rs = run(&provider, &fast(), &req).unwrap();
    assert_eq!(rs.len(), 2);
    assert_eq!(rs.value("IBM US Equity", "PX_LAST").and_then(FieldValue::as_f64), Some(141.5));
    assert_eq!(rs.value("AAPL US Equity", "PX_LAST").and_then(FieldValue::as_f64), Some(320.0));
  }

  #[test]
  fn test_reference_validation() {
    let req = ReferenceDataRequest::new(Vec::<String>::new(), ["PX_LAST"]);
    assert!(matches!(req.validate(), Err(BlpError::InvalidParameter(_))));
  }

  #[test]
  fn test_historical_concatenates_partial_responses() {
    let provider = ScriptedProvider::new().respond("HistoricalDataRequest", vec![
      ScriptStep::partial("HistoricalDataResponse", json!({"securityData": {
        "security": "IBM US Equity", "sequenceNumber": 0, "fieldExceptions": [],
        "fieldData": [{"date": "2020-01-02", "PX_LAST": 135.42}, {"date": "2020-01-03", "PX_LAST": 134.34}]}})),
      ScriptStep::Silence,
      ScriptStep::partial("HistoricalDataResponse", json!({"securityData": {
        "security": "AAPL US Equity", "sequenceNumber": 1, "fieldExceptions": [],
        "fieldData": [{"date": "2020-01-02", "PX_LAST": 300.35}]}})),
      ScriptStep::response("HistoricalDataResponse", json!({"securityData": {
        "security": "IBM US Equity", "sequenceNumber": 0, "fieldExceptions": [],
        "fieldData": [{"date": "2020-01-06", "PX_LAST": 134.1}]}})),
    ]);
    let req = HistoricalDataRequest::new(["IBM US Equity", "AAPL US Equity"], ["PX_LAST"], date(2020, 1, 1), date(2020, 1, 6));
    let rs = run(&provider, &fast(), &req).unwrap();

    let ibm = rs.value("IBM US Equity", "PX_LAST").and_then(FieldValue::series).unwrap();
    assert_eq!(ibm.keys().copied().collect::<Vec<_>>(), vec![date(2020, 1, 2), date(2020, 1, 3), date(2020, 1, 6)]);
    assert_eq!(rs.value("AAPL US Equity", "PX_LAST").and_then(FieldValue::series).map(BTreeMap::len), Some(1));

    let sent = &provider.journal().requests()[0];
    assert_eq!(sent.params().string("startDate").unwrap(), "20200101");
    assert_eq!(sent.params().string("periodicitySelection").unwrap(), "DAILY");
    assert_eq!(sent.params().get("maxDataPoints").and_then(Datum::value), Some(&Value::Int(100)));
  }

  #[test]
  fn test_historical_field_not_applicable() {
    let provider = ScriptedProvider::new().respond("HistoricalDataRequest", vec![
      ScriptStep::response("HistoricalDataResponse", json!({"securityData": {
        "security": "IBM US Equity", "fieldExceptions": [{"fieldId": "NAME", "errorInfo": {
          "source": "x", "code": 1, "category": "BAD_FLD", "message": "Not valid historical field",
          "subcategory": "NOT_APPLICABLE_TO_HIST_DATA"}}],
        "fieldData": []}})),
    ]);
    let req = HistoricalDataRequest::new(["IBM US Equity"], ["NAME"], date(2020, 1, 1), date(2020, 1, 6));
    let err = run(&provider, &fast(), &req).unwrap_err();
    assert_eq!(err.error_code(), Some("NOT_APPLICABLE_TO_HIST_DATA"));
  }

  fn historical_with_bad_security() -> ScriptedProvider {
    ScriptedProvider::new().respond("HistoricalDataRequest", vec![
      ScriptStep::partial("HistoricalDataResponse", json!({"securityData": {
        "security": "bad sec", "sequenceNumber": 0, "fieldExceptions": [], "fieldData": [],
        "securityError": {"source": "3923::bbdbd11", "code": 15, "category": "BAD_SEC",
                          "message": "Unknown/Invalid security", "subcategory": "INVALID_SECURITY"}}})),
      ScriptStep::response("HistoricalDataResponse", json!({"securityData": {
        "security": "IBM US Equity", "sequenceNumber": 1, "fieldExceptions": [],
        "fieldData": [{"date": "2020-01-02", "PX_LAST": 135.42}]}})),
    ])
  }

  #[test]
  fn test_historical_security_error_suppression() {
    let req = HistoricalDataRequest::new(["bad sec", "IBM US Equity"], ["PX_LAST"], date(2020, 1, 1), date(2020, 1, 6));

    let err = run(&historical_with_bad_security(), &fast(), &req).unwrap_err();
    assert_eq!(err.error_code(), Some("INVALID_SECURITY"));

    let rs = run(&historical_with_bad_security(), &fast().ignore_security_errors(true), &req).unwrap();
    assert_eq!(rs.keys().collect::<Vec<_>>(), vec!["IBM US Equity"]);
    assert_eq!(rs.value("IBM US Equity", "PX_LAST").and_then(FieldValue::series).map(BTreeMap::len), Some(1));
  }

  #[test]
  fn test_historical_validation_and_decoding() {
    let req: HistoricalDataRequest = serde_json::from_value(json!({
      "securities": "IBM US Equity", "fields": ["PX_LAST"],
      "start_date": "20200110", "end_date": "2020-01-01", "periodicity": "WEEKLY"
    })).unwrap();
    assert_eq!(req.securities, vec!["IBM US Equity".to_string()]);
    assert_eq!(req.periodicity, Periodicity::Weekly);
    assert_eq!(req.max_points, 100);
    assert!(matches!(req.validate(), Err(BlpError::InvalidParameter(_))));

    let bad: Result<HistoricalDataRequest, _> = serde_json::from_value(json!({
      "securities": "IBM US Equity", "fields": "PX_LAST",
      "start_date": "20200101", "end_date": "20200110", "periodicity": "HOURLY"
    }));
    assert!(bad.is_err());
  }

  #[test]
  fn test_portfolio_weights_are_floats() {
    let provider = ScriptedProvider::new().respond("PortfolioDataRequest", vec![
      ScriptStep::response("PortfolioDataResponse", json!({"securityData": [
        {"security": "U12345678-1 Client", "fieldExceptions": [], "fieldData": {"PORTFOLIO_MWEIGHT": [
          {"Security": "IBM US Equity", "Weight": "60.5"},
          {"Security": "AAPL US Equity", "Weight": 39.5}
        ]}}
      ]})),
    ]);
    let req = PortfolioDataRequest::new("U12345678-1 Client").as_of(date(2020, 3, 31));
    let rs = run(&provider, &fast(), &req).unwrap();
    assert_eq!(rs.len(), 2);
    assert_eq!(rs.value("IBM US Equity", "Weight"), Some(&FieldValue::Value(Value::Float(60.5))));
    assert!(rs.value("IBM US Equity", "Security").is_none());

    let sent = &provider.journal().requests()[0];
    assert_eq!(sent.params().to_json(), json!({
      "securities": ["U12345678-1 Client"],
      "fields": ["PORTFOLIO_MWEIGHT"],
      "overrides": [{"fieldId": "REFERENCE_DATE", "value": "20200331"}]
    }));
  }

  #[test]
  fn test_portfolio_position_elements() {
    let provider = ScriptedProvider::new().respond("PortfolioDataRequest", vec![
      ScriptStep::response("PortfolioDataResponse", json!({"securityData": [
        {"security": "P", "fieldData": {"PORTFOLIO_DATA": [
          {"Security": "IBM US Equity", "Position": 100, "Market Value": "14150.0", "Cost": 120.0}
        ]}}
      ]})),
    ]);
    let req = PortfolioDataRequest::new("P").with_field(PortfolioField::Data);
    let rs = run(&provider, &fast(), &req).unwrap();
    let row = rs.get("IBM US Equity").unwrap();
    assert_eq!(row["Position"], FieldValue::Value(Value::Float(100.0)));
    assert_eq!(row["Market Value"].as_f64(), Some(14150.0));
    assert_eq!(row["Cost"].as_f64(), Some(120.0));
  }
}
