// blpdata/src/lifecycle.rs
// The request template every kind runs through:
// open session -> open service -> create -> generate -> send/poll -> process.

use crate::base::BlpError;
use crate::config::{ClientOptions, ErrorPolicy};
use crate::conn::{Session, SessionProvider};
use crate::event::{CorrelationId, Event, EventType, Response};
use crate::parser::read_error_info;
use crate::request::{Request, Service};
use crate::result::ResultSet;
use crate::session::SessionGuard;
use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static NEXT_CORRELATION_ID: AtomicU64 = AtomicU64::new(1);

fn next_correlation_id() -> CorrelationId {
  CorrelationId(NEXT_CORRELATION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Which response events are kept for `process`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRetention {
  /// Only the final `Response` event.
  FinalOnly,
  /// Every partial response plus the final one, in arrival order.
  All,
}

/// One concrete request kind: where it goes, how it fills a request, and how
/// it reads the response.
pub trait RequestKind {
  fn service(&self) -> Service;
  fn operation(&self) -> &'static str;

  /// Checks parameters before any session is opened.
  fn validate(&self) -> Result<(), BlpError> {
    Ok(())
  }

  fn generate(&self, request: &mut Request) -> Result<(), BlpError>;

  fn process(&self, response: &Response, policy: ErrorPolicy) -> Result<ResultSet, BlpError>;

  fn retention(&self) -> EventRetention {
    EventRetention::FinalOnly
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestState {
  Created,
  Configured,
  Sent,
  Parsed,
}

/// Forward-only state of one request instance.
#[derive(Debug)]
pub struct RequestTracker {
  operation: &'static str,
  state: RequestState,
}

impl RequestTracker {
  pub fn new(operation: &'static str) -> Self {
    RequestTracker { operation, state: RequestState::Created }
  }

  pub fn state(&self) -> RequestState { self.state }

  pub fn advance(&mut self, next: RequestState) -> Result<(), BlpError> {
    let expected = match self.state {
      RequestState::Created => RequestState::Configured,
      RequestState::Configured => RequestState::Sent,
      RequestState::Sent => RequestState::Parsed,
      RequestState::Parsed => {
        return Err(BlpError::InternalError(format!("{} already parsed; requests are not reused", self.operation)));
      }
    };
    if next != expected {
      return Err(BlpError::InternalError(format!(
        "{}: invalid transition {:?} -> {:?}", self.operation, self.state, next)));
    }
    debug!("{}: {:?} -> {:?}", self.operation, self.state, next);
    self.state = next;
    Ok(())
  }
}

/// Sends `request` and polls until the final response arrives.
///
/// A poll that returns nothing is retried. With a `deadline` the whole loop is
/// bounded and overrunning it fails with `DeadlineExceeded`; without one the
/// loop waits indefinitely.
pub fn send_and_collect(
  session: &mut dyn Session,
  request: &Request,
  retention: EventRetention,
  poll_timeout: Duration,
  deadline: Option<Duration>,
) -> Result<Response, BlpError> {
  let cid = next_correlation_id();
  session.send_request(request, cid)?;
  info!("{} sent (cid={})", request.operation(), cid);

  let started = Instant::now();
  let mut kept: Vec<Event> = Vec::new();
  loop {
    let wait = match deadline {
      Some(limit) => {
        let elapsed = started.elapsed();
        if elapsed >= limit {
          warn!("{} (cid={}) gave up after {:?}", request.operation(), cid, elapsed);
          return Err(BlpError::DeadlineExceeded(limit));
        }
        poll_timeout.min(limit - elapsed)
      }
      None => poll_timeout,
    };

    let event = match session.next_event(wait)? {
      Some(event) => event,
      None => {
        trace!("{} (cid={}) poll timed out after {:?}, polling again", request.operation(), cid, wait);
        continue;
      }
    };
    if !event.concerns(cid) {
      debug!("Ignoring {} event for another request", event.event_type());
      continue;
    }

    match event.event_type() {
      EventType::PartialResponse => {
        debug!("{} (cid={}) partial response with {} messages", request.operation(), cid, event.messages().len());
        match retention {
          EventRetention::All => kept.push(event),
          EventRetention::FinalOnly => warn!(
            "{} (cid={}) discarding partial response with {} messages", request.operation(), cid, event.messages().len()),
        }
      }
      EventType::Response => {
        debug!("{} (cid={}) final response after {:?}", request.operation(), cid, started.elapsed());
        kept.push(event);
        return Ok(Response::new(kept));
      }
      EventType::RequestStatus => check_request_status(&event)?,
      EventType::SessionStatus => check_session_status(&event)?,
      other => trace!("Ignoring {} event", other),
    }
  }
}

fn check_request_status(event: &Event) -> Result<(), BlpError> {
  for msg in event.messages() {
    if msg.message_type() == "RequestFailure" {
      let detail = msg.root().get("reason").map(read_error_info).unwrap_or_default();
      return Err(BlpError::RequestFailed(detail));
    }
  }
  Ok(())
}

fn check_session_status(event: &Event) -> Result<(), BlpError> {
  for msg in event.messages() {
    if matches!(msg.message_type(), "SessionTerminated" | "SessionConnectionDown") {
      return Err(BlpError::SessionTerminated(msg.message_type().to_string()));
    }
  }
  Ok(())
}

/// Runs one request of `kind` on its own session, which is released on every
/// exit path. No partial result is returned alongside an error.
pub fn run<K: RequestKind + ?Sized>(
  provider: &dyn SessionProvider,
  options: &ClientOptions,
  kind: &K,
) -> Result<ResultSet, BlpError> {
  options.validate()?;
  kind.validate()?;

  let mut tracker = RequestTracker::new(kind.operation());
  let mut guard = SessionGuard::open(provider, options)?;
  guard.open_service(kind.service())?;
  let mut request = guard.create_request(kind.service(), kind.operation())?;

  kind.generate(&mut request)?;
  tracker.advance(RequestState::Configured)?;

  let response = send_and_collect(
    guard.session_mut(), &request, kind.retention(), options.poll_timeout(), options.deadline())?;
  tracker.advance(RequestState::Sent)?;

  let result = kind.process(&response, options.error_policy())?;
  tracker.advance(RequestState::Parsed)?;
  info!("{} parsed into {} rows", kind.operation(), result.len());
  Ok(result)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::conn_mock::{ScriptStep, ScriptedProvider};
  use crate::element::Value;
  use crate::event::Message;
  use serde_json::json;

  /// Minimal kind: echoes `securityData[].security` as row keys.
  struct Echo(EventRetention);

  impl RequestKind for Echo {
    fn service(&self) -> Service { Service::RefData }
    fn operation(&self) -> &'static str { "EchoRequest" }
    fn generate(&self, request: &mut Request) -> Result<(), BlpError> {
      request.set("tag", "echo")
    }
    fn process(&self, response: &Response, _policy: ErrorPolicy) -> Result<ResultSet, BlpError> {
      let mut rs = ResultSet::new();
      for (i, msg) in response.messages().enumerate() {
        rs.row_mut(&msg.root().string("security")?).insert("order".to_string(), Value::from(i as i64).into());
      }
      Ok(rs)
    }
    fn retention(&self) -> EventRetention { self.0 }
  }

  fn scripted() -> ScriptedProvider {
    ScriptedProvider::new().respond("EchoRequest", vec![
      ScriptStep::partial("EchoResponse", json!({"security": "A"})),
      ScriptStep::Silence,
      ScriptStep::partial("EchoResponse", json!({"security": "B"})),
      ScriptStep::response("EchoResponse", json!({"security": "C"})),
    ])
  }

  fn fast() -> ClientOptions {
    ClientOptions::default().with_poll_timeout(Duration::from_millis(5))
  }

  #[test]
  fn test_all_retention_keeps_partials_in_order() {
    let provider = scripted();
    let rs = run(&provider, &fast(), &Echo(EventRetention::All)).unwrap();
    assert_eq!(rs.keys().collect::<Vec<_>>(), vec!["A", "B", "C"]);
    assert_eq!(rs.value("C", "order").and_then(|v| v.value()), Some(&Value::Int(2)));
    let journal = provider.journal();
    assert_eq!(journal.sessions_opened(), 1);
    assert_eq!(journal.sessions_stopped(), 1);
    assert_eq!(journal.requests()[0].params().string("tag").unwrap(), "echo");
  }

  #[test]
  fn test_final_only_retention_drops_partials() {
    let rs = run(&scripted(), &fast(), &Echo(EventRetention::FinalOnly)).unwrap();
    assert_eq!(rs.keys().collect::<Vec<_>>(), vec!["C"]);
  }

  #[test]
  fn test_deadline_exceeded_and_session_released() {
    let provider = ScriptedProvider::new();
    let options = fast().with_deadline(Some(Duration::from_millis(30)));
    let err = run(&provider, &options, &Echo(EventRetention::FinalOnly)).unwrap_err();
    assert!(matches!(err, BlpError::DeadlineExceeded(d) if d == Duration::from_millis(30)));
    assert_eq!(provider.journal().sessions_stopped(), 1);
  }

  #[test]
  fn test_connection_failure_surfaces_before_send() {
    let provider = ScriptedProvider::new().fail_start();
    let err = run(&provider, &fast(), &Echo(EventRetention::FinalOnly)).unwrap_err();
    assert!(matches!(err, BlpError::ConnectionFailed(_)));
    assert!(provider.journal().requests().is_empty());
  }

  #[test]
  fn test_request_failure_status_is_fatal() {
    let provider = ScriptedProvider::new().respond("EchoRequest", vec![
      ScriptStep::event(EventType::RequestStatus, "RequestFailure", json!({
        "reason": {"source": "apitsvc", "code": -1, "category": "TIMEOUT", "message": "Request timed out", "subcategory": ""}
      })),
    ]);
    let err = run(&provider, &fast(), &Echo(EventRetention::FinalOnly)).unwrap_err();
    assert_eq!(err.error_code(), Some("TIMEOUT"));
  }

  #[test]
  fn test_session_terminated_is_fatal() {
    let provider = ScriptedProvider::new().respond("EchoRequest", vec![
      ScriptStep::event(EventType::SessionStatus, "SessionTerminated", json!({})),
    ]);
    let err = run(&provider, &fast(), &Echo(EventRetention::FinalOnly)).unwrap_err();
    assert!(matches!(err, BlpError::SessionTerminated(_)));
  }

  #[test]
  fn test_events_for_other_requests_are_ignored() {
    struct Foreign;
    impl Session for Foreign {
      fn start(&mut self) -> Result<(), BlpError> { Ok(()) }
      fn open_service(&mut self, _: &str) -> Result<(), BlpError> { Ok(()) }
      fn create_request(&self, s: &str, o: &str) -> Result<Request, BlpError> { Ok(Request::new(s, o)) }
      fn send_request(&mut self, _: &Request, _: CorrelationId) -> Result<(), BlpError> { Ok(()) }
      fn next_event(&mut self, _: Duration) -> Result<Option<Event>, BlpError> {
        let msg = Message::new("X", crate::element::Datum::Null, Some(CorrelationId(u64::MAX)));
        Ok(Some(Event::new(EventType::Response, vec![msg])))
      }
      fn stop(&mut self) -> Result<(), BlpError> { Ok(()) }
    }
    let mut session = Foreign;
    let err = send_and_collect(&mut session, &Request::new("s", "o"), EventRetention::FinalOnly,
                               Duration::from_millis(1), Some(Duration::from_millis(20))).unwrap_err();
    assert!(matches!(err, BlpError::DeadlineExceeded(_)));
  }

  #[test]
  fn test_tracker_is_forward_only() {
    let mut tracker = RequestTracker::new("op");
    assert!(tracker.advance(RequestState::Sent).is_err());
    tracker.advance(RequestState::Configured).unwrap();
    tracker.advance(RequestState::Sent).unwrap();
    tracker.advance(RequestState::Parsed).unwrap();
    assert_eq!(tracker.state(), RequestState::Parsed);
    assert!(tracker.advance(RequestState::Parsed).is_err());
  }
}
