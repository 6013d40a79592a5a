// blpdata/src/field.rs
// Field metadata: FieldInfoRequest and FieldSearchRequest on //blp/apiflds.

use crate::base::{BlpError, ResponseError};
use crate::config::ErrorPolicy;
use crate::element::Datum;
use crate::event::Response;
use crate::lifecycle::RequestKind;
use crate::parser::{check_response_error, field_value, read_error_info, string_list, FIELD_DATA};
use crate::request::{de, parse_token, Request, Service};
use crate::result::{FieldValue, ResultSet, Row};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const FIELD_INFO: &str = "fieldInfo";
const FIELD_ERROR: &str = "fieldError";
const DOCUMENTATION: &str = "documentation";
const OVERRIDES: &str = "overrides";

/// Product type filter of a field search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProductType {
  All,
  Govt,
  Corp,
  Mtge,
  MoneyMarket,
  Muni,
  Pfd,
  Equity,
  Cmdty,
  Index,
  Curncy,
}

impl ProductType {
  pub const ALL: [ProductType; 11] = [
    ProductType::All, ProductType::Govt, ProductType::Corp, ProductType::Mtge, ProductType::MoneyMarket,
    ProductType::Muni, ProductType::Pfd, ProductType::Equity, ProductType::Cmdty, ProductType::Index,
    ProductType::Curncy,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      ProductType::All => "All",
      ProductType::Govt => "Govt",
      ProductType::Corp => "Corp",
      ProductType::Mtge => "Mtge",
      ProductType::MoneyMarket => "M-Mkt",
      ProductType::Muni => "Muni",
      ProductType::Pfd => "Pfd",
      ProductType::Equity => "Equity",
      ProductType::Cmdty => "Cmdty",
      ProductType::Index => "Index",
      ProductType::Curncy => "Curncy",
    }
  }
}

/// Field category filter of a field search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldCategory {
  NewFields,
  Analysis,
  CorporateActions,
  CustomFields,
  Descriptive,
  Earnings,
  Estimates,
  Fundamentals,
  MarketActivity,
  Metadata,
  Ratings,
  Trading,
  Systems,
}

impl FieldCategory {
  pub const ALL: [FieldCategory; 13] = [
    FieldCategory::NewFields, FieldCategory::Analysis, FieldCategory::CorporateActions,
    FieldCategory::CustomFields, FieldCategory::Descriptive, FieldCategory::Earnings, FieldCategory::Estimates,
    FieldCategory::Fundamentals, FieldCategory::MarketActivity, FieldCategory::Metadata, FieldCategory::Ratings,
    FieldCategory::Trading, FieldCategory::Systems,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      FieldCategory::NewFields => "NewFields",
      FieldCategory::Analysis => "Analysis",
      FieldCategory::CorporateActions => "Corporate Actions",
      FieldCategory::CustomFields => "Custom Fields",
      FieldCategory::Descriptive => "Descriptive",
      FieldCategory::Earnings => "Earnings",
      FieldCategory::Estimates => "Estimates",
      FieldCategory::Fundamentals => "Fundamentals",
      FieldCategory::MarketActivity => "Market Activity",
      FieldCategory::Metadata => "Metadata",
      FieldCategory::Ratings => "Ratings",
      FieldCategory::Trading => "Trading",
      FieldCategory::Systems => "Systems",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
  All,
  RealTime,
  Static,
}

impl FieldType {
  pub const ALL: [FieldType; 3] = [FieldType::All, FieldType::RealTime, FieldType::Static];

  pub fn as_str(self) -> &'static str {
    match self {
      FieldType::All => "All",
      FieldType::RealTime => "RealTime",
      FieldType::Static => "Static",
    }
  }
}

/// Whether fields requiring a BPS (B-PIPE) entitlement are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BpsRequirement {
  All,
  Bps,
  NoBps,
}

impl BpsRequirement {
  pub const ALL: [BpsRequirement; 3] = [BpsRequirement::All, BpsRequirement::Bps, BpsRequirement::NoBps];

  pub fn as_str(self) -> &'static str {
    match self {
      BpsRequirement::All => "All",
      BpsRequirement::Bps => "BPS",
      BpsRequirement::NoBps => "NoBPS",
    }
  }
}

impl fmt::Display for ProductType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ProductType {
  type Err = BlpError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse_token("product type", &Self::ALL, Self::as_str, s)
  }
}

impl TryFrom<String> for ProductType {
  type Error = BlpError;
  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<ProductType> for String {
  fn from(v: ProductType) -> Self { v.as_str().to_string() }
}

impl fmt::Display for FieldCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for FieldCategory {
  type Err = BlpError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse_token("field category", &Self::ALL, Self::as_str, s)
  }
}

impl TryFrom<String> for FieldCategory {
  type Error = BlpError;
  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<FieldCategory> for String {
  fn from(v: FieldCategory) -> Self { v.as_str().to_string() }
}

impl fmt::Display for FieldType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for FieldType {
  type Err = BlpError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse_token("field type", &Self::ALL, Self::as_str, s)
  }
}

impl TryFrom<String> for FieldType {
  type Error = BlpError;
  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<FieldType> for String {
  fn from(v: FieldType) -> Self { v.as_str().to_string() }
}

impl fmt::Display for BpsRequirement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for BpsRequirement {
  type Err = BlpError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse_token("bps requirement", &Self::ALL, Self::as_str, s)
  }
}

impl TryFrom<String> for BpsRequirement {
  type Error = BlpError;
  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<BpsRequirement> for String {
  fn from(v: BpsRequirement) -> Self { v.as_str().to_string() }
}

/// Reads `fieldData[]` entries into rows keyed by field id. `fieldError`
/// entries are field-level errors under `policy`.
fn process_field_data<F>(response: &Response, policy: ErrorPolicy, mut read: F) -> Result<ResultSet, BlpError>
where
  F: FnMut(&Datum, &mut Row),
{
  let mut result = ResultSet::new();
  for msg in response.messages() {
    check_response_error(msg.root())?;
    for entry in msg.root().field(FIELD_DATA)?.items() {
      let id = entry.string("id")?;
      if let Some(info) = entry.get(FIELD_ERROR).filter(|d| !d.is_null()) {
        let err = ResponseError { field: Some(id.clone()), ..read_error_info(info) };
        if policy.ignore_field_errors {
          warn!("Omitting field {}: {}", id, err.error_code());
          continue;
        }
        error!("Field error for {}: {}", id, err);
        return Err(BlpError::FieldError(err));
      }
      let info = entry.field(FIELD_INFO)?;
      read(info, result.row_mut(&id));
    }
  }
  Ok(result)
}

fn copy_elements(info: &Datum, names: &[&str], row: &mut Row) {
  for name in names {
    let value = info.get(name).map(field_value).unwrap_or(FieldValue::Null);
    row.insert(name.to_string(), value);
  }
}

fn overrides_list(info: &Datum) -> FieldValue {
  FieldValue::List(string_list(info, OVERRIDES).into_iter().map(Into::into).collect())
}

// --- FieldInfoRequest ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfoRequest {
  /// Mnemonics (`PX_LAST`) or alphanumeric ids (`pr005`).
  #[serde(deserialize_with = "de::one_or_many")]
  pub field_ids: Vec<String>,
  #[serde(default)]
  pub include_docs: bool,
  #[serde(default)]
  pub include_overrides: bool,
}

impl FieldInfoRequest {
  pub fn new<S: Into<String>>(field_ids: impl IntoIterator<Item = S>) -> Self {
    FieldInfoRequest {
      field_ids: field_ids.into_iter().map(Into::into).collect(),
      include_docs: false,
      include_overrides: false,
    }
  }

  pub fn with_docs(mut self, include: bool) -> Self {
    self.include_docs = include;
    self
  }

  pub fn with_overrides(mut self, include: bool) -> Self {
    self.include_overrides = include;
    self
  }
}

impl RequestKind for FieldInfoRequest {
  fn service(&self) -> Service { Service::ApiFields }
  fn operation(&self) -> &'static str { "FieldInfoRequest" }

  fn validate(&self) -> Result<(), BlpError> {
    if self.field_ids.is_empty() || self.field_ids.iter().any(|f| f.trim().is_empty()) {
      return Err(BlpError::InvalidParameter("field_ids must be a non-empty list of non-empty ids".to_string()));
    }
    Ok(())
  }

  fn generate(&self, request: &mut Request) -> Result<(), BlpError> {
    for id in &self.field_ids {
      request.append("id", id)?;
    }
    request.set("returnFieldDocumentation", self.include_docs)?;
    if self.include_overrides {
      request.append("properties", "fieldoverridable")?;
    }
    Ok(())
  }

  fn process(&self, response: &Response, policy: ErrorPolicy) -> Result<ResultSet, BlpError> {
    process_field_data(response, policy, |info, row| {
      copy_elements(info, &["mnemonic", "description", "datatype", "categoryName"], row);
      if self.include_docs {
        copy_elements(info, &[DOCUMENTATION], row);
      }
      if self.include_overrides {
        row.insert(OVERRIDES.to_string(), overrides_list(info));
      }
    })
  }
}

// --- FieldSearchRequest ---

/// One `include` or `exclude` block of a field search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldFilter {
  pub product_type: Option<ProductType>,
  pub categories: Vec<FieldCategory>,
  pub field_type: Option<FieldType>,
  pub bps_requirement: Option<BpsRequirement>,
}

impl FieldFilter {
  fn is_empty(&self) -> bool {
    self.product_type.is_none() && self.categories.is_empty() && self.field_type.is_none() && self.bps_requirement.is_none()
  }

  fn write(&self, block: &mut Datum) -> Result<(), BlpError> {
    if let Some(product_type) = self.product_type {
      block.set("productType", product_type.as_str())?;
    }
    if let Some(field_type) = self.field_type {
      block.set("fieldType", field_type.as_str())?;
    }
    for category in &self.categories {
      block.append("category", category.as_str())?;
    }
    if let Some(bps) = self.bps_requirement {
      block.set("bpsRequirement", bps.as_str())?;
    }
    Ok(())
  }
}

fn default_include() -> FieldFilter {
  FieldFilter { bps_requirement: Some(BpsRequirement::All), ..Default::default() }
}

fn default_true() -> bool { true }

fn default_language() -> String { "ENGLISH".to_string() }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSearchRequest {
  pub query: String,
  #[serde(default = "default_true")]
  pub include_docs: bool,
  #[serde(default = "default_include")]
  pub include: FieldFilter,
  #[serde(default)]
  pub exclude: FieldFilter,
  #[serde(default = "default_language")]
  pub language: String,
}

impl FieldSearchRequest {
  pub fn new(query: &str) -> Self {
    FieldSearchRequest {
      query: query.to_string(),
      include_docs: true,
      include: default_include(),
      exclude: FieldFilter::default(),
      language: default_language(),
    }
  }

  pub fn with_docs(mut self, include: bool) -> Self {
    self.include_docs = include;
    self
  }

  pub fn including(mut self, filter: FieldFilter) -> Self {
    self.include = filter;
    self
  }

  pub fn excluding(mut self, filter: FieldFilter) -> Self {
    self.exclude = filter;
    self
  }
}

impl RequestKind for FieldSearchRequest {
  fn service(&self) -> Service { Service::ApiFields }
  fn operation(&self) -> &'static str { "FieldSearchRequest" }

  fn validate(&self) -> Result<(), BlpError> {
    if self.query.trim().is_empty() {
      return Err(BlpError::InvalidParameter("query must not be empty".to_string()));
    }
    Ok(())
  }

  fn generate(&self, request: &mut Request) -> Result<(), BlpError> {
    request.set("searchSpec", &self.query)?;
    request.set("returnFieldDocumentation", self.include_docs)?;
    request.set("language", &self.language)?;
    if !self.include.is_empty() {
      self.include.write(request.element_mut("include")?)?;
    }
    if !self.exclude.is_empty() {
      self.exclude.write(request.element_mut("exclude")?)?;
    }
    Ok(())
  }

  fn process(&self, response: &Response, policy: ErrorPolicy) -> Result<ResultSet, BlpError> {
    process_field_data(response, policy, |info, row| {
      copy_elements(info, &["mnemonic", "description", "categoryName"], row);
      if self.include_docs {
        copy_elements(info, &[DOCUMENTATION], row);
      }
      row.insert(OVERRIDES.to_string(), overrides_list(info));
    })
  }
}
