// blpdata/src/instrument.rs
// Lookups on //blp/instruments: government, security and curve search.

use crate::base::BlpError;
use crate::config::ErrorPolicy;
use crate::element::Datum;
use crate::event::Response;
use crate::lifecycle::RequestKind;
use crate::parser::{check_response_error, field_value, string_list};
use crate::request::{parse_token, Request, Service};
use crate::result::{FieldValue, ResultSet, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const RESULTS: &str = "results";

fn default_max_results() -> u32 { 100 }
fn default_true() -> bool { true }

fn validate_search(query: &str, max_results: u32) -> Result<(), BlpError> {
  if query.trim().is_empty() {
    return Err(BlpError::InvalidParameter("query must not be empty".to_string()));
  }
  if max_results == 0 {
    return Err(BlpError::InvalidParameter("max_results must be positive".to_string()));
  }
  Ok(())
}

/// Walks `results[]`, keying each entry by its `key` element.
fn process_results<F>(response: &Response, key: &str, mut read: F) -> Result<ResultSet, BlpError>
where
  F: FnMut(&Datum, &mut Row),
{
  let mut result = ResultSet::new();
  for msg in response.messages() {
    check_response_error(msg.root())?;
    for entry in msg.root().get(RESULTS).map(Datum::items).unwrap_or_default() {
      let id = entry.string(key)?;
      read(entry, result.row_mut(&id));
    }
  }
  Ok(result)
}

fn copy_elements(entry: &Datum, names: &[&str], row: &mut Row) {
  for name in names {
    row.insert(name.to_string(), entry.get(name).map(field_value).unwrap_or(FieldValue::Null));
  }
}

/// Turns a lookup key such as `AAPL US<equity>` into `AAPL US EQUITY`.
pub fn normalize_security_key(key: &str) -> String {
  key.replace(['<', '>'], " ").trim().to_uppercase()
}

// --- GovernmentSearch ---

/// Government securities by query, optionally filtered by (non-unique) ticker.
/// With `partial_match`, a query of `T*` matches every ticker starting with T.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernmentSearch {
  pub query: String,
  #[serde(default)]
  pub ticker: String,
  #[serde(default = "default_true")]
  pub partial_match: bool,
  #[serde(default = "default_max_results")]
  pub max_results: u32,
}

impl GovernmentSearch {
  pub fn new(query: &str) -> Self {
    GovernmentSearch { query: query.to_string(), ticker: String::new(), partial_match: true, max_results: 100 }
  }

  pub fn with_ticker(mut self, ticker: &str) -> Self {
    self.ticker = ticker.to_string();
    self
  }

  pub fn partial_match(mut self, partial: bool) -> Self {
    self.partial_match = partial;
    self
  }

  pub fn with_max_results(mut self, max_results: u32) -> Self {
    self.max_results = max_results;
    self
  }
}

impl RequestKind for GovernmentSearch {
  fn service(&self) -> Service { Service::Instruments }
  fn operation(&self) -> &'static str { "govtListRequest" }

  fn validate(&self) -> Result<(), BlpError> {
    validate_search(&self.query, self.max_results)
  }

  fn generate(&self, request: &mut Request) -> Result<(), BlpError> {
    request.set("query", &self.query)?;
    request.set("partialMatch", self.partial_match)?;
    request.set("ticker", &self.ticker)?;
    request.set("maxResults", self.max_results)
  }

  fn process(&self, response: &Response, _policy: ErrorPolicy) -> Result<ResultSet, BlpError> {
    process_results(response, "parseky", |entry, row| copy_elements(entry, &["name", "ticker"], row))
  }
}

// --- SecuritySearch ---

/// Yellow-key (market sector) filter of a security lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum YellowKeyFilter {
  #[default]
  None,
  Cmdt,
  Eqty,
  Muni,
  Prfd,
  Clnt,
  Mmkt,
  Govt,
  Corp,
  Indx,
  Curr,
  Mtge,
}

impl YellowKeyFilter {
  pub const ALL: [YellowKeyFilter; 12] = [
    YellowKeyFilter::None, YellowKeyFilter::Cmdt, YellowKeyFilter::Eqty, YellowKeyFilter::Muni,
    YellowKeyFilter::Prfd, YellowKeyFilter::Clnt, YellowKeyFilter::Mmkt, YellowKeyFilter::Govt,
    YellowKeyFilter::Corp, YellowKeyFilter::Indx, YellowKeyFilter::Curr, YellowKeyFilter::Mtge,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      YellowKeyFilter::None => "YK_FILTER_NONE",
      YellowKeyFilter::Cmdt => "YK_FILTER_CMDT",
      YellowKeyFilter::Eqty => "YK_FILTER_EQTY",
      YellowKeyFilter::Muni => "YK_FILTER_MUNI",
      YellowKeyFilter::Prfd => "YK_FILTER_PRFD",
      YellowKeyFilter::Clnt => "YK_FILTER_CLNT",
      YellowKeyFilter::Mmkt => "YK_FILTER_MMKT",
      YellowKeyFilter::Govt => "YK_FILTER_GOVT",
      YellowKeyFilter::Corp => "YK_FILTER_CORP",
      YellowKeyFilter::Indx => "YK_FILTER_INDX",
      YellowKeyFilter::Curr => "YK_FILTER_CURR",
      YellowKeyFilter::Mtge => "YK_FILTER_MTGE",
    }
  }
}

impl fmt::Display for YellowKeyFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for YellowKeyFilter {
  type Err = BlpError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse_token("yellow key filter", &Self::ALL, Self::as_str, s)
  }
}

impl TryFrom<String> for YellowKeyFilter {
  type Error = BlpError;
  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<YellowKeyFilter> for String {
  fn from(v: YellowKeyFilter) -> Self { v.as_str().to_string() }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LanguageOverride {
  None,
  #[default]
  English,
  Kanji,
  French,
  German,
  Spanish,
  Portuguese,
  Italian,
  ChineseTraditional,
  Korean,
  ChineseSimplified,
  Russian,
}

impl LanguageOverride {
  pub const ALL: [LanguageOverride; 12] = [
    LanguageOverride::None, LanguageOverride::English, LanguageOverride::Kanji, LanguageOverride::French,
    LanguageOverride::German, LanguageOverride::Spanish, LanguageOverride::Portuguese, LanguageOverride::Italian,
    LanguageOverride::ChineseTraditional, LanguageOverride::Korean, LanguageOverride::ChineseSimplified,
    LanguageOverride::Russian,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      LanguageOverride::None => "LANG_OVERRIDE_NONE",
      LanguageOverride::English => "LANG_OVERRIDE_ENGLISH",
      LanguageOverride::Kanji => "LANG_OVERRIDE_KANJI",
      LanguageOverride::French => "LANG_OVERRIDE_FRENCH",
      LanguageOverride::German => "LANG_OVERRIDE_GERMAN",
      LanguageOverride::Spanish => "LANG_OVERRIDE_SPANISH",
      LanguageOverride::Portuguese => "LANG_OVERRIDE_PORTUGUESE",
      LanguageOverride::Italian => "LANG_OVERRIDE_ITALIAN",
      LanguageOverride::ChineseTraditional => "LANG_OVERRIDE_CHINESE_TRAD",
      LanguageOverride::Korean => "LANG_OVERRIDE_KOREAN",
      LanguageOverride::ChineseSimplified => "LANG_OVERRIDE_CHINESE_SIMP",
      LanguageOverride::Russian => "LANG_OVERRIDE_RUSSIAN",
    }
  }
}

impl fmt::Display for LanguageOverride {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for LanguageOverride {
  type Err = BlpError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse_token("language override", &Self::ALL, Self::as_str, s)
  }
}

impl TryFrom<String> for LanguageOverride {
  type Error = BlpError;
  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<LanguageOverride> for String {
  fn from(v: LanguageOverride) -> Self { v.as_str().to_string() }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecuritySearch {
  pub query: String,
  #[serde(default)]
  pub yellow_key_filter: YellowKeyFilter,
  #[serde(default)]
  pub language_override: LanguageOverride,
  #[serde(default = "default_max_results")]
  pub max_results: u32,
}

impl SecuritySearch {
  pub fn new(query: &str) -> Self {
    SecuritySearch {
      query: query.to_string(),
      yellow_key_filter: YellowKeyFilter::default(),
      language_override: LanguageOverride::default(),
      max_results: 100,
    }
  }

  pub fn with_filter(mut self, filter: YellowKeyFilter) -> Self {
    self.yellow_key_filter = filter;
    self
  }

  pub fn with_language(mut self, language: LanguageOverride) -> Self {
    self.language_override = language;
    self
  }

  pub fn with_max_results(mut self, max_results: u32) -> Self {
    self.max_results = max_results;
    self
  }
}

impl RequestKind for SecuritySearch {
  fn service(&self) -> Service { Service::Instruments }
  fn operation(&self) -> &'static str { "instrumentListRequest" }

  fn validate(&self) -> Result<(), BlpError> {
    validate_search(&self.query, self.max_results)
  }

  fn generate(&self, request: &mut Request) -> Result<(), BlpError> {
    request.set("query", &self.query)?;
    request.set("yellowKeyFilter", self.yellow_key_filter.as_str())?;
    request.set("languageOverride", self.language_override.as_str())?;
    request.set("maxResults", self.max_results)
  }

  /// Keys are the raw lookup keys (`IBM US<equity>`); see `normalize_security_key`.
  fn process(&self, response: &Response, _policy: ErrorPolicy) -> Result<ResultSet, BlpError> {
    process_results(response, "security", |entry, row| copy_elements(entry, &["description"], row))
  }
}

// --- CurveSearch ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveSearch {
  pub query: String,
  pub bbgid: String,
  pub country_code: String,
  pub currency_code: String,
  pub curve_id: String,
  pub curve_type: Option<String>,
  pub subtype: Option<String>,
  pub max_results: u32,
}

impl Default for CurveSearch {
  fn default() -> Self {
    CurveSearch {
      query: String::new(),
      bbgid: String::new(),
      country_code: String::new(),
      currency_code: String::new(),
      curve_id: String::new(),
      curve_type: None,
      subtype: None,
      max_results: default_max_results(),
    }
  }
}

impl CurveSearch {
  pub fn new(query: &str) -> Self {
    CurveSearch { query: query.to_string(), ..Default::default() }
  }

  pub fn in_country(mut self, country_code: &str) -> Self {
    self.country_code = country_code.to_string();
    self
  }

  pub fn in_currency(mut self, currency_code: &str) -> Self {
    self.currency_code = currency_code.to_string();
    self
  }

  pub fn with_type(mut self, curve_type: &str, subtype: Option<&str>) -> Self {
    self.curve_type = Some(curve_type.to_string());
    self.subtype = subtype.map(str::to_string);
    self
  }
}

const CURVE_TEXT_ELEMENTS: [&str; 6] = ["description", "country", "currency", "curveid", "publisher", "bbgid"];
const CURVE_LIST_ELEMENTS: [&str; 2] = ["type", "subtype"];

impl RequestKind for CurveSearch {
  fn service(&self) -> Service { Service::Instruments }
  fn operation(&self) -> &'static str { "curveListRequest" }

  fn validate(&self) -> Result<(), BlpError> {
    validate_search(&self.query, self.max_results)
  }

  fn generate(&self, request: &mut Request) -> Result<(), BlpError> {
    request.set("query", &self.query)?;
    request.set("bbgid", &self.bbgid)?;
    request.set("countryCode", &self.country_code)?;
    request.set("currencyCode", &self.currency_code)?;
    request.set("curveid", &self.curve_id)?;
    request.set("maxResults", self.max_results)?;
    if let Some(curve_type) = &self.curve_type {
      request.set("type", curve_type)?;
    }
    if let Some(subtype) = &self.subtype {
      request.set("subtype", subtype)?;
    }
    Ok(())
  }

  fn process(&self, response: &Response, _policy: ErrorPolicy) -> Result<ResultSet, BlpError> {
    process_results(response, "curve", |entry, row| {
      copy_elements(entry, &CURVE_TEXT_ELEMENTS, row);
      for name in CURVE_LIST_ELEMENTS {
        let items = string_list(entry, name).into_iter().map(Into::into).collect();
        row.insert(name.to_string(), FieldValue::List(items));
      }
    })
  }
}
