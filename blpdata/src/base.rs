// blpdata/src/base.rs
// Base types and error definitions for the terminal request layer

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Structured detail carried by a security, field or request error element.
///
/// Mirrors the `{source, code, category, message, subcategory}` block the
/// terminal attaches to `securityError`, `fieldExceptions[].errorInfo`,
/// `fieldError` and `responseError`, plus the identifier it was reported for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseError {
  pub source: String,
  pub code: i64,
  pub category: String,
  pub message: String,
  pub subcategory: String,
  /// Security the error was reported against, if any.
  pub security: Option<String>,
  /// Field the error was reported against, if any.
  pub field: Option<String>,
}

impl ResponseError {
  /// The code callers branch on, e.g. `INVALID_SECURITY` or `NOT_APPLICABLE_TO_HIST_DATA`.
  /// Uses the subcategory when present, otherwise the category.
  pub fn error_code(&self) -> &str {
    if self.subcategory.is_empty() { &self.category } else { &self.subcategory }
  }

  /// True if either the category or the subcategory equals `code`.
  pub fn is(&self, code: &str) -> bool {
    self.subcategory == code || self.category == code
  }
}

impl fmt::Display for ResponseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({}/{})", self.message, self.category, self.subcategory)?;
    if let Some(security) = &self.security {
      write!(f, " security={}", security)?;
    }
    if let Some(field) = &self.field {
      write!(f, " field={}", field)?;
    }
    write!(f, " source={} code={}", self.source, self.code)
  }
}

/// Errors that can occur while talking to the terminal
#[derive(Error, Debug, Clone)]
pub enum BlpError {
  #[error("Configuration error: {0}")]
  ConfigurationError(String),

  #[error("Connection failed: {0}")]
  ConnectionFailed(String),

  #[error("Service unavailable: {0}")]
  ServiceUnavailable(String),

  #[error("Invalid parameter: {0}")]
  InvalidParameter(String),

  #[error("Security error: {0}")]
  SecurityError(ResponseError),

  #[error("Field error: {0}")]
  FieldError(ResponseError),

  #[error("Request failed: {0}")]
  RequestFailed(ResponseError),

  #[error("Deadline of {0:?} exceeded waiting for response")]
  DeadlineExceeded(Duration),

  #[error("Session terminated: {0}")]
  SessionTerminated(String),

  #[error("Response parse error: {0}")]
  ParseError(String),

  #[error("Logging error: {0}")]
  LoggingError(String),

  #[error("Replay error: {0}")]
  ReplayError(String),

  #[error("Internal error: {0}")]
  InternalError(String),
}

impl BlpError {
  /// Structured detail for errors reported by the terminal in the response tree.
  pub fn response_error(&self) -> Option<&ResponseError> {
    match self {
      BlpError::SecurityError(e) | BlpError::FieldError(e) | BlpError::RequestFailed(e) => Some(e),
      _ => None,
    }
  }

  /// Shortcut for `response_error().map(ResponseError::error_code)`.
  pub fn error_code(&self) -> Option<&str> {
    self.response_error().map(ResponseError::error_code)
  }
}
