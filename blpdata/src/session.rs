// blpdata/src/session.rs
// Scoped session ownership: acquired per request, always stopped on drop.

use crate::base::BlpError;
use crate::config::ClientOptions;
use crate::conn::{Session, SessionProvider};
use crate::request::{Request, Service};
use log::{debug, info, warn};

pub struct SessionGuard {
  session: Box<dyn Session>,
  label: String,
  started: bool,
  services: Vec<Service>,
}

impl SessionGuard {
  /// Opens and starts a session. A session that fails to start is still stopped.
  pub fn open(provider: &dyn SessionProvider, options: &ClientOptions) -> Result<Self, BlpError> {
    let label = format!("{}:{}", options.host, options.port);
    info!("Opening session to {}", label);
    let session = provider.open_session(&options.host, options.port)?;
    let mut guard = SessionGuard { session, label, started: false, services: Vec::new() };
    guard.session.start().map_err(|e| match e {
      BlpError::ConnectionFailed(_) => e,
      other => BlpError::ConnectionFailed(format!("Failed to start session to {}: {}", guard.label, other)),
    })?;
    guard.started = true;
    debug!("Session to {} started", guard.label);
    Ok(guard)
  }

  /// Opens `service` once; later calls are no-ops.
  pub fn open_service(&mut self, service: Service) -> Result<(), BlpError> {
    if self.services.contains(&service) {
      return Ok(());
    }
    self.session.open_service(service.as_str()).map_err(|e| match e {
      BlpError::ServiceUnavailable(_) => e,
      other => BlpError::ServiceUnavailable(format!("Failed to open {}: {}", service, other)),
    })?;
    debug!("Service {} opened on {}", service, self.label);
    self.services.push(service);
    Ok(())
  }

  pub fn create_request(&self, service: Service, operation: &str) -> Result<Request, BlpError> {
    if !self.services.contains(&service) {
      return Err(BlpError::InternalError(format!("Service {} not opened before creating {}", service, operation)));
    }
    self.session.create_request(service.as_str(), operation)
  }

  pub fn session_mut(&mut self) -> &mut dyn Session {
    self.session.as_mut()
  }
}

impl Drop for SessionGuard {
  fn drop(&mut self) {
    // Also reached when start() failed.
    match self.session.stop() {
      Ok(()) => debug!("Session to {} stopped (started={})", self.label, self.started),
      Err(e) => warn!("Error stopping session to {}: {}", self.label, e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::conn_mock::ScriptedProvider;

  #[test]
  fn test_guard_stops_session_on_drop() {
    let provider = ScriptedProvider::new();
    {
      let mut guard = SessionGuard::open(&provider, &ClientOptions::default()).unwrap();
      guard.open_service(Service::RefData).unwrap();
      guard.open_service(Service::RefData).unwrap();
      assert!(guard.create_request(Service::RefData, "ReferenceDataRequest").is_ok());
      assert!(guard.create_request(Service::ApiFields, "FieldInfoRequest").is_err());
    }
    let journal = provider.journal();
    assert_eq!(journal.sessions_opened(), 1);
    assert_eq!(journal.sessions_stopped(), 1);
    assert_eq!(journal.services_opened(), vec!["//blp/refdata".to_string()]);
  }

  #[test]
  fn test_failed_start_is_connection_failure_and_released() {
    let provider = ScriptedProvider::new().fail_start();
    let err = SessionGuard::open(&provider, &ClientOptions::default()).err().unwrap();
    assert!(matches!(err, BlpError::ConnectionFailed(_)));
    assert_eq!(provider.journal().sessions_stopped(), 1);
  }

  #[test]
  fn test_failed_service_is_service_unavailable() {
    let provider = ScriptedProvider::new().fail_service("//blp/instruments");
    let mut guard = SessionGuard::open(&provider, &ClientOptions::default()).unwrap();
    let err = guard.open_service(Service::Instruments).unwrap_err();
    assert!(matches!(err, BlpError::ServiceUnavailable(_)));
  }
}
