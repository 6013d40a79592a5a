// blpdata/src/study.rs
// Technical analysis studies on //blp/tasvc.

use crate::base::BlpError;
use crate::config::ErrorPolicy;
use crate::element::{request_date, Value};
use crate::event::Response;
use crate::lifecycle::RequestKind;
use crate::parser::{check_response_error, field_value, DATE};
use crate::reference::Periodicity;
use crate::request::{de, Request, Service};
use crate::result::{ResultSet, Row};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const STUDY_DATA: &str = "studyData";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataRange {
  #[default]
  Historical,
  Intraday,
}

impl DataRange {
  pub fn as_str(self) -> &'static str {
    match self {
      DataRange::Historical => "historical",
      DataRange::Intraday => "intraday",
    }
  }
}

fn default_interval() -> u32 { 15 }
fn default_event_type() -> String { "TRADE".to_string() }

/// A study (e.g. `smavg`, `rsi`, `dmi`) computed over one security's prices.
///
/// Historical ranges use the date part of `start`/`end` and an optional
/// periodicity; intraday ranges use the full datetimes, `event_type` and
/// `interval` (minutes). `attributes` are set on `<study>StudyAttributes`,
/// e.g. `period` or `priceSourceClose`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalStudyRequest {
  pub security: String,
  pub study: String,
  #[serde(deserialize_with = "de::datetime")]
  pub start: NaiveDateTime,
  #[serde(deserialize_with = "de::datetime")]
  pub end: NaiveDateTime,
  #[serde(default)]
  pub data_range: DataRange,
  #[serde(default)]
  pub periodicity: Option<Periodicity>,
  #[serde(default = "default_interval")]
  pub interval: u32,
  #[serde(default = "default_event_type")]
  pub event_type: String,
  #[serde(default)]
  pub attributes: BTreeMap<String, Value>,
}

impl TechnicalStudyRequest {
  pub fn historical(security: &str, study: &str, start: NaiveDateTime, end: NaiveDateTime) -> Self {
    TechnicalStudyRequest {
      security: security.to_string(),
      study: study.to_string(),
      start,
      end,
      data_range: DataRange::Historical,
      periodicity: None,
      interval: default_interval(),
      event_type: default_event_type(),
      attributes: BTreeMap::new(),
    }
  }

  pub fn intraday(security: &str, study: &str, start: NaiveDateTime, end: NaiveDateTime, interval: u32) -> Self {
    TechnicalStudyRequest {
      data_range: DataRange::Intraday,
      interval,
      ..Self::historical(security, study, start, end)
    }
  }

  pub fn with_periodicity(mut self, periodicity: Periodicity) -> Self {
    self.periodicity = Some(periodicity);
    self
  }

  pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
    self.attributes.insert(name.to_string(), value.into());
    self
  }

  fn attributes_element(&self) -> String {
    format!("{}StudyAttributes", self.study)
  }
}

impl RequestKind for TechnicalStudyRequest {
  fn service(&self) -> Service { Service::TechnicalAnalysis }
  fn operation(&self) -> &'static str { "studyRequest" }

  fn validate(&self) -> Result<(), BlpError> {
    if self.security.trim().is_empty() || self.study.trim().is_empty() {
      return Err(BlpError::InvalidParameter("security and study must not be empty".to_string()));
    }
    if self.start > self.end {
      return Err(BlpError::InvalidParameter(format!("start {} is after end {}", self.start, self.end)));
    }
    if self.data_range == DataRange::Intraday && self.interval == 0 {
      return Err(BlpError::InvalidParameter("interval must be positive".to_string()));
    }
    Ok(())
  }

  fn generate(&self, request: &mut Request) -> Result<(), BlpError> {
    let source = request.element_mut("priceSource")?;
    source.set("securityName", &self.security)?;
    let range = source.element_mut("dataRange")?.set_choice(self.data_range.as_str())?;
    match self.data_range {
      DataRange::Historical => {
        range.set("startDate", request_date(self.start.date()))?;
        range.set("endDate", request_date(self.end.date()))?;
        if let Some(periodicity) = self.periodicity {
          range.set("periodicitySelection", periodicity.as_str())?;
        }
      }
      DataRange::Intraday => {
        range.set("startDate", self.start.format("%Y-%m-%dT%H:%M:%S").to_string())?;
        range.set("endDate", self.end.format("%Y-%m-%dT%H:%M:%S").to_string())?;
        range.set("eventType", &self.event_type)?;
        range.set("interval", self.interval)?;
      }
    }

    let attributes = request.element_mut("studyAttributes")?.set_choice(&self.attributes_element())?;
    for (name, value) in &self.attributes {
      attributes.set(name, value.clone())?;
    }
    Ok(())
  }

  /// One row per study record, keyed by the record's ISO date or datetime.
  fn process(&self, response: &Response, _policy: ErrorPolicy) -> Result<ResultSet, BlpError> {
    let mut result = ResultSet::new();
    for msg in response.messages() {
      check_response_error(msg.root())?;
      for record in msg.root().field(STUDY_DATA)?.items() {
        let key = record.string(DATE)?;
        let row: Row = record.elements().iter()
          .filter(|e| e.name() != DATE)
          .map(|e| (e.name().to_string(), field_value(e.datum())))
          .collect();
        result.insert(&key, row);
      }
    }
    Ok(result)
  }
}
