// blpdata/src/client.rs
// Public entry points: one method per request kind plus dispatch by name.

use crate::base::BlpError;
use crate::config::ClientOptions;
use crate::conn::SessionProvider;
use crate::conn_log::{RecordingProvider, SessionLogger};
use crate::conn_mock::ReplayProvider;
use crate::dispatch::{AnyRequest, RequestType};
use crate::field::{FieldInfoRequest, FieldSearchRequest};
use crate::instrument::{CurveSearch, GovernmentSearch, SecuritySearch};
use crate::lifecycle::{run, RequestKind};
use crate::reference::{HistoricalDataRequest, PortfolioDataRequest, ReferenceDataRequest, IDENTIFIER_FIELDS};
use crate::result::ResultSet;
use crate::screen::EquityScreenRequest;
use crate::study::TechnicalStudyRequest;
use crate::table::Table;
use log::info;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;

/// Runs requests against sessions opened by a provider. Every call opens and
/// releases its own session; the client holds no per-request state.
#[derive(Clone)]
pub struct BlpClient {
  provider: Arc<dyn SessionProvider>,
  options: ClientOptions,
}

impl BlpClient {
  pub fn new(provider: Arc<dyn SessionProvider>, options: ClientOptions) -> Self {
    BlpClient { provider, options }
  }

  /// Wraps `inner` so every session's traffic is recorded to `db_path` under `session_name`.
  pub fn recording<P, D>(inner: P, options: ClientOptions, db_path: D, session_name: &str) -> Result<Self, BlpError>
  where
    P: SessionProvider + 'static,
    D: AsRef<Path>,
  {
    let logger = SessionLogger::new(db_path, session_name, &options.host, options.port)?;
    Ok(Self::new(Arc::new(RecordingProvider::new(inner, logger)), options))
  }

  /// Create a new client using a stored interaction.
  pub fn from_db<D: AsRef<Path>>(db_path: D, session_name: &str, options: ClientOptions) -> Result<Self, BlpError> {
    let provider = ReplayProvider::new(db_path, session_name)?;
    Ok(Self::new(Arc::new(provider), options))
  }

  pub fn options(&self) -> &ClientOptions { &self.options }

  /// Same provider, different options.
  pub fn with_options(&self, options: ClientOptions) -> Self {
    BlpClient { provider: self.provider.clone(), options }
  }

  pub fn execute<K: RequestKind + ?Sized>(&self, kind: &K) -> Result<ResultSet, BlpError> {
    run(self.provider.as_ref(), &self.options, kind)
  }

  pub fn reference_data(&self, request: &ReferenceDataRequest) -> Result<ResultSet, BlpError> {
    self.execute(request)
  }

  /// Table of common identifiers (ticker, CUSIP, ISIN, FIGI, CIK) for each
  /// security. Unknown securities and fields that don't apply are left out.
  pub fn identifiers<S: Into<String>>(&self, securities: impl IntoIterator<Item = S>) -> Result<ResultSet, BlpError> {
    let request = ReferenceDataRequest::new(securities, IDENTIFIER_FIELDS);
    let options = self.options.clone().ignore_security_errors(true).ignore_field_errors(true);
    run(self.provider.as_ref(), &options, &request)
  }

  pub fn historical_data(&self, request: &HistoricalDataRequest) -> Result<ResultSet, BlpError> {
    self.execute(request)
  }

  pub fn field_info(&self, request: &FieldInfoRequest) -> Result<ResultSet, BlpError> {
    self.execute(request)
  }

  pub fn field_search(&self, request: &FieldSearchRequest) -> Result<ResultSet, BlpError> {
    self.execute(request)
  }

  pub fn government_search(&self, request: &GovernmentSearch) -> Result<ResultSet, BlpError> {
    self.execute(request)
  }

  pub fn security_search(&self, request: &SecuritySearch) -> Result<ResultSet, BlpError> {
    self.execute(request)
  }

  pub fn curve_search(&self, request: &CurveSearch) -> Result<ResultSet, BlpError> {
    self.execute(request)
  }

  pub fn portfolio_data(&self, request: &PortfolioDataRequest) -> Result<ResultSet, BlpError> {
    self.execute(request)
  }

  pub fn equity_screen(&self, request: &EquityScreenRequest) -> Result<ResultSet, BlpError> {
    self.execute(request)
  }

  pub fn technical_study(&self, request: &TechnicalStudyRequest) -> Result<ResultSet, BlpError> {
    self.execute(request)
  }

  /// Runs the request type registered as `name` with JSON `params`. The
  /// params may also carry the common options block, which applies to this
  /// request only.
  pub fn get(&self, name: &str, params: &JsonValue) -> Result<ResultSet, BlpError> {
    let request_type: RequestType = name.parse()?;
    let (request, overlay) = AnyRequest::from_params(request_type, params)?;
    let options = overlay.apply(&self.options);
    info!("Dispatching {} ({})", request_type, request.operation());
    run(self.provider.as_ref(), &options, &request)
  }

  /// Like `get`, rendered as a table.
  pub fn get_table(&self, name: &str, params: &JsonValue) -> Result<Table, BlpError> {
    let request_type: RequestType = name.parse()?;
    let result = self.get(name, params)?;
    Ok(request_type.table(&result))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::conn::MockSessionProvider;
  use crate::conn_mock::{ScriptStep, ScriptedProvider};
  use crate::result::FieldValue;
  use serde_json::json;
  use std::time::Duration;

  fn fast() -> ClientOptions {
    ClientOptions::default().with_poll_timeout(Duration::from_millis(5))
  }

  fn mixed_securities() -> ScriptedProvider {
    ScriptedProvider::new().respond("ReferenceDataRequest", vec![
      ScriptStep::response("ReferenceDataResponse", json!({"securityData": [
        {"security": "IBM US Equity", "fieldExceptions": [], "fieldData": {"PX_LAST": 141.5}},
        {"security": "bad sec", "fieldExceptions": [],
         "securityError": {"source": "3923::bbdbd11", "code": 15, "category": "BAD_SEC",
                           "message": "Unknown/Invalid security", "subcategory": "INVALID_SECURITY"},
         "fieldData": {}}
      ]})),
    ])
  }

  #[test]
  fn test_single_security_single_field() {
    let provider = ScriptedProvider::new().respond("ReferenceDataRequest", vec![
      ScriptStep::response("ReferenceDataResponse", json!({"securityData": [
        {"security": "IBM US Equity", "fieldExceptions": [], "fieldData": {"PX_LAST": 141.5}}
      ]})),
    ]);
    let client = BlpClient::new(Arc::new(provider), fast());
    let rs = client.reference_data(&ReferenceDataRequest::new(["IBM US Equity"], ["PX_LAST"])).unwrap();
    assert_eq!(rs.len(), 1);
    assert_eq!(rs.value("IBM US Equity", "PX_LAST").and_then(FieldValue::as_f64), Some(141.5));
  }

  #[test]
  fn test_get_applies_options_block_per_request() {
    let client = BlpClient::new(Arc::new(mixed_securities()), fast());
    let params = json!({"securities": ["IBM US Equity", "bad sec"], "fields": "PX_LAST"});

    let err = client.get("ReferenceDataRequest", &params).unwrap_err();
    assert_eq!(err.error_code(), Some("INVALID_SECURITY"));
    assert_eq!(err.response_error().unwrap().security.as_deref(), Some("bad sec"));

    let mut lenient = params.clone();
    lenient["ignore_security_errors"] = json!(true);
    let rs = client.get("ReferenceDataRequest", &lenient).unwrap();
    assert_eq!(rs.keys().collect::<Vec<_>>(), vec!["IBM US Equity"]);
    assert!(!client.options().ignore_security_errors);
  }

  #[test]
  fn test_identifiers_skip_unknown_securities_and_fields() {
    let provider = ScriptedProvider::new().respond("ReferenceDataRequest", vec![
      ScriptStep::response("ReferenceDataResponse", json!({"securityData": [
        {"security": "AAPL US Equity", "fieldExceptions": [
          {"fieldId": "CENTRAL_INDEX_KEY_NUMBER", "errorInfo": {"source": "x", "code": 9, "category": "BAD_FLD",
                                                                "message": "Field not applicable", "subcategory": "NOT_APPLICABLE_TO_REF_DATA"}}],
         "fieldData": {"EQY_FUND_TICKER": "AAPL", "ID_CUSIP": "037833100", "ID_ISIN": "US0378331005",
                       "ID_BB_GLOBAL": "BBG000B9XRY4"}},
        {"security": "/cusip/000000000", "fieldExceptions": [],
         "securityError": {"source": "x", "code": 15, "category": "BAD_SEC",
                           "message": "Unknown/Invalid security", "subcategory": "INVALID_SECURITY"},
         "fieldData": {}}
      ]})),
    ]);
    let client = BlpClient::new(Arc::new(provider.clone()), fast());
    let rs = client.identifiers(["AAPL US Equity", "/cusip/000000000"]).unwrap();
    assert_eq!(rs.keys().collect::<Vec<_>>(), vec!["AAPL US Equity"]);
    assert_eq!(rs.value("AAPL US Equity", "ID_ISIN").and_then(FieldValue::value),
               Some(&crate::element::Value::from("US0378331005")));
    assert!(rs.value("AAPL US Equity", "CENTRAL_INDEX_KEY_NUMBER").is_none());
    assert!(!client.options().ignore_field_errors);

    let sent = &provider.journal().requests()[0];
    assert_eq!(sent.params().to_json()["fields"], json!(IDENTIFIER_FIELDS));
  }

  #[test]
  fn test_validation_fails_before_any_session() {
    let mut provider = MockSessionProvider::new();
    provider.expect_open_session().never();
    let client = BlpClient::new(Arc::new(provider), fast());

    let err = client.get("SecuritySearch", &json!({"query": "IBM", "yellow_key_filter": "YK_FILTER_BONDS"})).unwrap_err();
    assert!(matches!(err, BlpError::InvalidParameter(_)));

    let err = client.reference_data(&ReferenceDataRequest::new(["IBM US Equity"], Vec::<String>::new())).unwrap_err();
    assert!(matches!(err, BlpError::InvalidParameter(_)));

    let err = client.get("NoSuchRequest", &json!({})).unwrap_err();
    assert!(matches!(err, BlpError::InvalidParameter(_)));
  }

  #[test]
  fn test_host_and_port_reach_the_provider() {
    let provider = mixed_securities();
    let client = BlpClient::new(Arc::new(provider.clone()), fast().ignore_security_errors(true));
    client.get("ReferenceDataRequest", &json!({
      "securities": "IBM US Equity", "fields": "PX_LAST", "host": "terminal-2", "port": 8196
    })).unwrap();
    assert_eq!(provider.journal().endpoints(), vec![("terminal-2".to_string(), 8196)]);
  }

  #[test]
  fn test_record_then_replay() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("session.db");
    let scripted = ScriptedProvider::new().respond("HistoricalDataRequest", vec![
      ScriptStep::partial("HistoricalDataResponse", json!({"securityData": {
        "security": "IBM US Equity", "fieldExceptions": [],
        "fieldData": [{"date": "2020-01-02", "PX_LAST": 135.42}]}})),
      ScriptStep::response("HistoricalDataResponse", json!({"securityData": {
        "security": "IBM US Equity", "fieldExceptions": [],
        "fieldData": [{"date": "2020-01-03", "PX_LAST": 134.34}]}})),
    ]);
    let params = json!({
      "securities": "IBM US Equity", "fields": "PX_LAST", "start_date": "20200101", "end_date": "20200103"
    });

    let recorder = BlpClient::recording(scripted, fast(), &db, "hist").unwrap();
    let live = recorder.get("HistoricalDataRequest", &params).unwrap();

    let replay = BlpClient::from_db(&db, "hist", fast()).unwrap();
    let replayed = replay.get("HistoricalDataRequest", &params).unwrap();
    assert_eq!(live, replayed);
    assert_eq!(replayed.value("IBM US Equity", "PX_LAST").and_then(FieldValue::series).map(|s| s.len()), Some(2));

    let err = replay.get("HistoricalDataRequest", &params).unwrap_err();
    assert!(matches!(err, BlpError::ReplayError(_)));
  }

  #[test]
  fn test_get_table_for_historical_data() {
    let provider = ScriptedProvider::new().respond("HistoricalDataRequest", vec![
      ScriptStep::response("HistoricalDataResponse", json!({"securityData": {
        "security": "IBM US Equity", "fieldExceptions": [],
        "fieldData": [{"date": "2020-01-02", "PX_LAST": 135.42, "VOLUME": 3148461}]}})),
    ]);
    let client = BlpClient::new(Arc::new(provider), fast());
    let table = client.get_table("HistoricalDataRequest", &json!({
      "securities": "IBM US Equity", "fields": ["PX_LAST", "VOLUME"], "start_date": "20200101", "end_date": "20200103"
    })).unwrap();
    assert_eq!(table.num_rows(), 1);
    assert_eq!(table.columns().len(), 2);
    assert!(table.columns().iter().all(|c| c.group.as_deref() == Some("IBM US Equity")));
  }
}
