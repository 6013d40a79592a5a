// blpdata/src/config.rs
// Connection and per-request behaviour options

use crate::base::BlpError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8194;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 500;

/// Options shared by every request: where the terminal lives, how response
/// errors are treated and how long to wait for a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
  pub host: String,
  pub port: u16,
  /// Drop securities the terminal reports as invalid instead of failing.
  pub ignore_security_errors: bool,
  /// Omit invalid or inapplicable fields instead of failing.
  pub ignore_field_errors: bool,
  /// Wait per poll of the event queue. A poll that times out is retried.
  pub poll_timeout_ms: u64,
  /// Overall bound on the poll loop. `None` waits until a final response arrives.
  pub deadline_ms: Option<u64>,
}

impl Default for ClientOptions {
  fn default() -> Self {
    ClientOptions {
      host: DEFAULT_HOST.to_string(),
      port: DEFAULT_PORT,
      ignore_security_errors: false,
      ignore_field_errors: false,
      poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
      deadline_ms: None,
    }
  }
}

impl ClientOptions {
  pub fn new(host: &str, port: u16) -> Self {
    ClientOptions { host: host.to_string(), port, ..Default::default() }
  }

  pub fn with_host(mut self, host: &str) -> Self {
    self.host = host.to_string();
    self
  }

  pub fn with_port(mut self, port: u16) -> Self {
    self.port = port;
    self
  }

  pub fn ignore_security_errors(mut self, ignore: bool) -> Self {
    self.ignore_security_errors = ignore;
    self
  }

  pub fn ignore_field_errors(mut self, ignore: bool) -> Self {
    self.ignore_field_errors = ignore;
    self
  }

  pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
    self.poll_timeout_ms = timeout.as_millis() as u64;
    self
  }

  pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
    self.deadline_ms = deadline.map(|d| d.as_millis() as u64);
    self
  }

  pub fn poll_timeout(&self) -> Duration {
    Duration::from_millis(self.poll_timeout_ms)
  }

  pub fn deadline(&self) -> Option<Duration> {
    self.deadline_ms.map(Duration::from_millis)
  }

  pub fn error_policy(&self) -> ErrorPolicy {
    ErrorPolicy {
      ignore_security_errors: self.ignore_security_errors,
      ignore_field_errors: self.ignore_field_errors,
    }
  }

  pub fn validate(&self) -> Result<(), BlpError> {
    if self.host.trim().is_empty() {
      return Err(BlpError::ConfigurationError("host must not be empty".to_string()));
    }
    if self.port == 0 {
      return Err(BlpError::ConfigurationError("port must be non-zero".to_string()));
    }
    if self.poll_timeout_ms == 0 {
      return Err(BlpError::ConfigurationError("poll_timeout_ms must be positive".to_string()));
    }
    Ok(())
  }
}

/// Per-request overlay of the common configuration block. Unset entries keep
/// the client's value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsOverlay {
  pub host: Option<String>,
  pub port: Option<u16>,
  pub ignore_security_errors: Option<bool>,
  pub ignore_field_errors: Option<bool>,
  pub deadline_ms: Option<u64>,
}

impl OptionsOverlay {
  pub fn apply(&self, base: &ClientOptions) -> ClientOptions {
    let mut options = base.clone();
    if let Some(host) = &self.host { options.host = host.clone(); }
    if let Some(port) = self.port { options.port = port; }
    if let Some(flag) = self.ignore_security_errors { options.ignore_security_errors = flag; }
    if let Some(flag) = self.ignore_field_errors { options.ignore_field_errors = flag; }
    if self.deadline_ms.is_some() { options.deadline_ms = self.deadline_ms; }
    options
  }
}

/// How security-level and field-level error elements are treated while parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
  pub ignore_security_errors: bool,
  pub ignore_field_errors: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let options = ClientOptions::default();
    assert_eq!(options.host, "localhost");
    assert_eq!(options.port, 8194);
    assert_eq!(options.poll_timeout(), Duration::from_millis(500));
    assert_eq!(options.deadline(), None);
    assert!(options.validate().is_ok());
  }

  #[test]
  fn test_partial_json_uses_defaults() {
    let options: ClientOptions = serde_json::from_str(r#"{"port": 8195, "deadline_ms": 2000}"#).unwrap();
    assert_eq!(options.host, "localhost");
    assert_eq!(options.port, 8195);
    assert_eq!(options.deadline(), Some(Duration::from_secs(2)));
  }

  #[test]
  fn test_validate_rejects_bad_values() {
    assert!(matches!(ClientOptions::default().with_port(0).validate(), Err(BlpError::ConfigurationError(_))));
    let zero_poll = ClientOptions::default().with_poll_timeout(Duration::ZERO);
    assert!(matches!(zero_poll.validate(), Err(BlpError::ConfigurationError(_))));
  }

  #[test]
  fn test_overlay_only_touches_set_entries() {
    let base = ClientOptions::new("terminal", 9000).with_deadline(Some(Duration::from_secs(1)));
    let overlay = OptionsOverlay { ignore_security_errors: Some(true), ..Default::default() };
    let merged = overlay.apply(&base);
    assert_eq!(merged.host, "terminal");
    assert_eq!(merged.port, 9000);
    assert!(merged.ignore_security_errors);
    assert!(!merged.ignore_field_errors);
    assert_eq!(merged.deadline_ms, Some(1000));
  }
}
