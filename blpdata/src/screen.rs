// blpdata/src/screen.rs
// Equity screening (BEQS) on the reference data service.

use crate::base::BlpError;
use crate::config::ErrorPolicy;
use crate::element::request_date;
use crate::event::Response;
use crate::lifecycle::{EventRetention, RequestKind};
use crate::parser::{check_response_error, SECURITY_DATA};
use crate::reference::process_security_data;
use crate::request::{de, parse_token, Request, Service};
use crate::result::ResultSet;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScreenType {
  /// Screens saved by the user.
  Private,
  /// Screens published by the vendor.
  Global,
}

impl ScreenType {
  pub const ALL: [ScreenType; 2] = [ScreenType::Private, ScreenType::Global];

  pub fn as_str(self) -> &'static str {
    match self {
      ScreenType::Private => "PRIVATE",
      ScreenType::Global => "GLOBAL",
    }
  }
}

impl fmt::Display for ScreenType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ScreenType {
  type Err = BlpError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse_token("screen type", &Self::ALL, Self::as_str, s)
  }
}

impl TryFrom<String> for ScreenType {
  type Error = BlpError;
  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<ScreenType> for String {
  fn from(v: ScreenType) -> Self { v.as_str().to_string() }
}

fn default_language() -> String { "ENGLISH".to_string() }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityScreenRequest {
  pub name: String,
  pub screen_type: ScreenType,
  /// Folder the screen is saved under, for private screens.
  #[serde(default)]
  pub group: Option<String>,
  /// Point-in-time date the screen is run as of.
  #[serde(default, deserialize_with = "de::opt_date")]
  pub date: Option<NaiveDate>,
  #[serde(default = "default_language")]
  pub language: String,
}

impl EquityScreenRequest {
  pub fn new(name: &str, screen_type: ScreenType) -> Self {
    EquityScreenRequest { name: name.to_string(), screen_type, group: None, date: None, language: default_language() }
  }

  pub fn in_group(mut self, group: &str) -> Self {
    self.group = Some(group.to_string());
    self
  }

  pub fn as_of(mut self, date: NaiveDate) -> Self {
    self.date = Some(date);
    self
  }
}

impl RequestKind for EquityScreenRequest {
  fn service(&self) -> Service { Service::RefData }
  fn operation(&self) -> &'static str { "BeqsRequest" }

  fn validate(&self) -> Result<(), BlpError> {
    if self.name.trim().is_empty() {
      return Err(BlpError::InvalidParameter("screen name must not be empty".to_string()));
    }
    Ok(())
  }

  fn generate(&self, request: &mut Request) -> Result<(), BlpError> {
    request.set("screenName", &self.name)?;
    request.set("screenType", self.screen_type.as_str())?;
    if let Some(group) = &self.group {
      request.set("Group", group)?;
    }
    request.set("languageId", &self.language)?;
    if let Some(date) = self.date {
      request.add_override("PiTDate", request_date(date))?;
    }
    Ok(())
  }

  fn process(&self, response: &Response, policy: ErrorPolicy) -> Result<ResultSet, BlpError> {
    let mut result = ResultSet::new();
    for msg in response.messages() {
      check_response_error(msg.root())?;
      let securities = msg.root().field("data")?.field(SECURITY_DATA)?;
      process_security_data(securities, policy, &mut result)?;
    }
    Ok(result)
  }

  fn retention(&self) -> EventRetention {
    EventRetention::All
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ClientOptions;
  use crate::conn_mock::{ScriptStep, ScriptedProvider};
  use crate::lifecycle::run;
  use crate::result::FieldValue;
  use serde_json::json;
  use std::time::Duration;

  #[test]
  fn test_screen_rows_and_request() {
    let provider = ScriptedProvider::new().respond("BeqsRequest", vec![
      ScriptStep::response("BeqsResponse", json!({"data": {"securityData": [
        {"security": "AAPL US", "fieldData": {"Ticker": "AAPL US", "Market Cap": 1.3e12}},
        {"security": "MSFT US", "fieldData": {"Ticker": "MSFT US", "Market Cap": 1.2e12}}
      ]}})),
    ]);
    let req = EquityScreenRequest::new("Core Capital Ratios", ScreenType::Global)
      .in_group("General")
      .as_of(NaiveDate::from_ymd_opt(2019, 12, 31).unwrap());
    let options = ClientOptions::default().with_poll_timeout(Duration::from_millis(5));
    let rs = run(&provider, &options, &req).unwrap();
    assert_eq!(rs.len(), 2);
    assert_eq!(rs.value("MSFT US", "Market Cap").and_then(FieldValue::as_f64), Some(1.2e12));

    let sent = &provider.journal().requests()[0];
    assert_eq!(sent.params().to_json(), json!({
      "screenName": "Core Capital Ratios", "screenType": "GLOBAL", "Group": "General", "languageId": "ENGLISH",
      "overrides": [{"fieldId": "PiTDate", "value": "20191231"}]
    }));
  }

  #[test]
  fn test_screen_rows_span_partial_events() {
    let provider = ScriptedProvider::new().respond("BeqsRequest", vec![
      ScriptStep::partial("BeqsResponse", json!({"data": {"securityData": [
        {"security": "AAPL US", "fieldData": {"Ticker": "AAPL US"}}
      ]}})),
      ScriptStep::response("BeqsResponse", json!({"data": {"securityData": [
        {"security": "MSFT US", "fieldData": {"Ticker": "MSFT US"}}
      ]}})),
    ]);
    let options = ClientOptions::default().with_poll_timeout(Duration::from_millis(5));
    let rs = run(&provider, &options, &EquityScreenRequest::new("Large Caps", ScreenType::Private)).unwrap();
    assert_eq!(rs.keys().collect::<Vec<_>>(), vec!["AAPL US", "MSFT US"]);
  }

  #[test]
  fn test_screen_type_is_validated() {
    assert!(serde_json::from_value::<EquityScreenRequest>(json!({"name": "x", "screen_type": "PUBLIC"})).is_err());
    let req: EquityScreenRequest = serde_json::from_value(json!({"name": "x", "screen_type": "PRIVATE"})).unwrap();
    assert_eq!(req.screen_type, ScreenType::Private);
  }
}
