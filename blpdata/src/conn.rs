// blpdata/src/conn.rs
// Capability traits standing in for the terminal's client library.
//
// The lifecycle and parsers only ever talk to a terminal through these two
// traits, so a real client binding, a recorder or a scripted mock can be
// swapped in without touching request logic.

use crate::base::BlpError;
use crate::event::{CorrelationId, Event};
use crate::request::Request;
use std::time::Duration;

/// One connection to a terminal process.
pub trait Session: Send {
  /// Start the session. Fails with `ConnectionFailed` if the terminal is unreachable.
  fn start(&mut self) -> Result<(), BlpError>;

  /// Open a named service. Fails with `ServiceUnavailable`.
  fn open_service(&mut self, service: &str) -> Result<(), BlpError>;

  /// Create an empty request for `operation` on an opened service.
  fn create_request(&self, service: &str, operation: &str) -> Result<Request, BlpError>;

  /// Send a populated request. Responses are delivered through `next_event`.
  fn send_request(&mut self, request: &Request, correlation_id: CorrelationId) -> Result<(), BlpError>;

  /// Wait up to `timeout` for the next event. `Ok(None)` means the poll timed out.
  fn next_event(&mut self, timeout: Duration) -> Result<Option<Event>, BlpError>;

  /// Stop the session and release its resources.
  fn stop(&mut self) -> Result<(), BlpError>;
}

/// Opens sessions against a host/port.
#[cfg_attr(test, mockall::automock)]
pub trait SessionProvider: Send + Sync {
  fn open_session(&self, host: &str, port: u16) -> Result<Box<dyn Session>, BlpError>;
}
