// blpdata/src/event.rs
// Events delivered by a session's event queue.

use crate::element::{Datum, Element};
use std::fmt;
use std::str::FromStr;
use crate::base::BlpError;

/// Identifies the request an event's messages belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
  Admin,
  SessionStatus,
  ServiceStatus,
  RequestStatus,
  /// Part of a response; more events follow.
  PartialResponse,
  /// The request has been fully served.
  Response,
}

impl EventType {
  pub fn as_str(self) -> &'static str {
    match self {
      EventType::Admin => "ADMIN",
      EventType::SessionStatus => "SESSION_STATUS",
      EventType::ServiceStatus => "SERVICE_STATUS",
      EventType::RequestStatus => "REQUEST_STATUS",
      EventType::PartialResponse => "PARTIAL_RESPONSE",
      EventType::Response => "RESPONSE",
    }
  }
}

impl fmt::Display for EventType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EventType {
  type Err = BlpError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "ADMIN" => Ok(EventType::Admin),
      "SESSION_STATUS" => Ok(EventType::SessionStatus),
      "SERVICE_STATUS" => Ok(EventType::ServiceStatus),
      "REQUEST_STATUS" => Ok(EventType::RequestStatus),
      "PARTIAL_RESPONSE" => Ok(EventType::PartialResponse),
      "RESPONSE" => Ok(EventType::Response),
      _ => Err(BlpError::ParseError(format!("Unknown event type '{}'", s))),
    }
  }
}

/// One message of an event: a type name plus its element tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
  correlation_id: Option<CorrelationId>,
  element: Element,
}

impl Message {
  pub fn new(message_type: &str, datum: Datum, correlation_id: Option<CorrelationId>) -> Self {
    Message { correlation_id, element: Element::new(message_type, datum) }
  }

  pub fn message_type(&self) -> &str { self.element.name() }
  pub fn correlation_id(&self) -> Option<CorrelationId> { self.correlation_id }
  pub fn with_correlation_id(mut self, cid: CorrelationId) -> Self {
    self.correlation_id = Some(cid);
    self
  }

  /// Root of the message's element tree.
  pub fn element(&self) -> &Element { &self.element }
  pub fn root(&self) -> &Datum { self.element.datum() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
  event_type: EventType,
  messages: Vec<Message>,
}

impl Event {
  pub fn new(event_type: EventType, messages: Vec<Message>) -> Self {
    Event { event_type, messages }
  }

  pub fn event_type(&self) -> EventType { self.event_type }
  pub fn messages(&self) -> &[Message] { &self.messages }

  /// A terminal event ends the poll loop for a request.
  pub fn is_terminal(&self) -> bool {
    self.event_type == EventType::Response
  }

  /// True if any message is addressed to `cid`, or carries no correlation id at all.
  pub fn concerns(&self, cid: CorrelationId) -> bool {
    self.messages.is_empty()
      || self.messages.iter().any(|m| m.correlation_id.map_or(true, |c| c == cid))
  }
}

/// The accumulated response events of one request, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Response {
  events: Vec<Event>,
}

impl Response {
  pub fn new(events: Vec<Event>) -> Self {
    Response { events }
  }

  /// Every message of every event, in arrival order.
  pub fn messages(&self) -> impl Iterator<Item = &Message> {
    self.events.iter().flat_map(|e| e.messages.iter())
  }

  pub fn first_message(&self) -> Result<&Message, BlpError> {
    self.messages().next().ok_or_else(|| BlpError::ParseError("Response carried no messages".to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn msg(cid: Option<u64>) -> Message {
    Message::new("ReferenceDataResponse", Datum::from_json(&json!({"securityData": []})), cid.map(CorrelationId))
  }

  #[test]
  fn test_terminal_and_correlation() {
    let partial = Event::new(EventType::PartialResponse, vec![msg(Some(1))]);
    let last = Event::new(EventType::Response, vec![msg(Some(2))]);
    assert!(!partial.is_terminal());
    assert!(last.is_terminal());
    assert!(partial.concerns(CorrelationId(1)));
    assert!(!last.concerns(CorrelationId(1)));
    assert!(Event::new(EventType::Response, vec![msg(None)]).concerns(CorrelationId(7)));
  }

  #[test]
  fn test_response_messages_in_order() {
    let response = Response::new(vec![
      Event::new(EventType::PartialResponse, vec![msg(Some(1)), msg(Some(1))]),
      Event::new(EventType::Response, vec![msg(Some(1))]),
    ]);
    assert_eq!(response.messages().count(), 3);
    assert!(response.first_message().is_ok());
    assert!(Response::default().first_message().is_err());
  }

  #[test]
  fn test_event_type_names() {
    for t in [EventType::Admin, EventType::SessionStatus, EventType::ServiceStatus,
              EventType::RequestStatus, EventType::PartialResponse, EventType::Response] {
      assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
    }
  }
}
