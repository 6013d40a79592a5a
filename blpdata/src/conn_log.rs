// blpdata/src/conn_log.rs
// Records session traffic (sent requests, received events) to SQLite.

use crate::base::BlpError;
use crate::conn::{Session, SessionProvider};
use crate::element::Datum;
use crate::event::{CorrelationId, Event, EventType, Message};
use crate::request::Request;

use log::{debug, info, warn};
use parking_lot::Mutex;
use rusqlite::{params, Connection as DbConnection};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDirection {
  Send,
  Recv,
}

impl fmt::Display for LogDirection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LogDirection::Send => write!(f, "SEND"),
      LogDirection::Recv => write!(f, "RECV"),
    }
  }
}

impl FromStr for LogDirection {
  type Err = BlpError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "SEND" => Ok(LogDirection::Send),
      "RECV" => Ok(LogDirection::Recv),
      _ => Err(BlpError::ReplayError(format!("Invalid LogDirection string in log: {}", s))),
    }
  }
}

pub(crate) const SCHEMA: &str = "
  CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_name TEXT NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    created_at TEXT NOT NULL
  );
  CREATE TABLE IF NOT EXISTS session_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES sessions(id),
    direction TEXT NOT NULL,
    service TEXT,
    operation TEXT,
    event_type TEXT,
    payload_json TEXT NOT NULL,
    relative_timestamp_ms REAL NOT NULL
  );
  CREATE INDEX IF NOT EXISTS idx_session_messages_session ON session_messages(session_id);
";

struct LoggerState {
  db: DbConnection,
  session_id: i64,
  started: Instant,
}

/// Appends the traffic of one named recording to a SQLite database.
#[derive(Clone)]
pub struct SessionLogger {
  inner: Arc<Mutex<LoggerState>>,
}

impl SessionLogger {
  pub fn new<P: AsRef<Path>>(db_path: P, session_name: &str, host: &str, port: u16) -> Result<Self, BlpError> {
    info!("Recording session '{}' to {:?}", session_name, db_path.as_ref());
    let db = DbConnection::open(db_path)
      .map_err(|e| BlpError::LoggingError(format!("Failed to open log DB: {}", e)))?;
    db.execute_batch(SCHEMA)
      .map_err(|e| BlpError::LoggingError(format!("Failed to create log schema: {}", e)))?;
    db.execute(
      "INSERT INTO sessions (session_name, host, port, created_at) VALUES (?1, ?2, ?3, ?4)",
      params![session_name, host, port, chrono::Utc::now().to_rfc3339()],
    ).map_err(|e| BlpError::LoggingError(format!("Failed to insert session '{}': {}", session_name, e)))?;
    let session_id = db.last_insert_rowid();
    debug!("Log session_id={} for '{}'", session_id, session_name);
    Ok(SessionLogger {
      inner: Arc::new(Mutex::new(LoggerState { db, session_id, started: Instant::now() })),
    })
  }

  pub fn log_send(&self, request: &Request) -> Result<(), BlpError> {
    let payload = request.params().to_json().to_string();
    self.insert(LogDirection::Send, Some(request.service()), Some(request.operation()), None, &payload)
  }

  pub fn log_event(&self, event: &Event) -> Result<(), BlpError> {
    let payload = event_to_json(event).to_string();
    self.insert(LogDirection::Recv, None, None, Some(event.event_type().as_str()), &payload)
  }

  fn insert(
    &self,
    direction: LogDirection,
    service: Option<&str>,
    operation: Option<&str>,
    event_type: Option<&str>,
    payload: &str,
  ) -> Result<(), BlpError> {
    let state = self.inner.lock();
    let elapsed_ms = state.started.elapsed().as_secs_f64() * 1000.0;
    state.db.execute(
      "INSERT INTO session_messages (session_id, direction, service, operation, event_type, payload_json, relative_timestamp_ms)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      params![state.session_id, direction.to_string(), service, operation, event_type, payload, elapsed_ms],
    ).map_err(|e| BlpError::LoggingError(format!("Failed to log {} message: {}", direction, e)))?;
    Ok(())
  }
}

/// Messages of an event as a JSON array of `{type, correlation_id, data}`.
pub(crate) fn event_to_json(event: &Event) -> JsonValue {
  JsonValue::Array(event.messages().iter().map(|m| json!({
    "type": m.message_type(),
    "correlation_id": m.correlation_id().map(|c| c.0),
    "data": m.root().to_json(),
  })).collect())
}

pub(crate) fn event_from_json(event_type: EventType, payload: &JsonValue) -> Result<Event, BlpError> {
  let items = payload.as_array()
    .ok_or_else(|| BlpError::ReplayError("Logged event payload is not an array".to_string()))?;
  let mut messages = Vec::with_capacity(items.len());
  for item in items {
    let message_type = item.get("type").and_then(JsonValue::as_str)
      .ok_or_else(|| BlpError::ReplayError("Logged message missing 'type'".to_string()))?;
    let cid = item.get("correlation_id").and_then(JsonValue::as_u64).map(CorrelationId);
    let data = item.get("data").map(Datum::from_json).unwrap_or_default();
    messages.push(Message::new(message_type, data, cid));
  }
  Ok(Event::new(event_type, messages))
}

/// Wraps a provider so every session it opens is recorded.
pub struct RecordingProvider<P: SessionProvider> {
  inner: P,
  logger: SessionLogger,
}

impl<P: SessionProvider> RecordingProvider<P> {
  pub fn new(inner: P, logger: SessionLogger) -> Self {
    RecordingProvider { inner, logger }
  }
}

impl<P: SessionProvider> SessionProvider for RecordingProvider<P> {
  fn open_session(&self, host: &str, port: u16) -> Result<Box<dyn Session>, BlpError> {
    let inner = self.inner.open_session(host, port)?;
    Ok(Box::new(RecordingSession { inner, logger: self.logger.clone() }))
  }
}

struct RecordingSession {
  inner: Box<dyn Session>,
  logger: SessionLogger,
}

impl Session for RecordingSession {
  fn start(&mut self) -> Result<(), BlpError> { self.inner.start() }

  fn open_service(&mut self, service: &str) -> Result<(), BlpError> { self.inner.open_service(service) }

  fn create_request(&self, service: &str, operation: &str) -> Result<Request, BlpError> {
    self.inner.create_request(service, operation)
  }

  fn send_request(&mut self, request: &Request, correlation_id: CorrelationId) -> Result<(), BlpError> {
    self.logger.log_send(request)?;
    self.inner.send_request(request, correlation_id)
  }

  fn next_event(&mut self, timeout: Duration) -> Result<Option<Event>, BlpError> {
    let event = self.inner.next_event(timeout)?;
    if let Some(ev) = &event {
      if let Err(e) = self.logger.log_event(ev) {
        warn!("Failed to record {} event: {}", ev.event_type(), e);
      }
    }
    Ok(event)
  }

  fn stop(&mut self) -> Result<(), BlpError> { self.inner.stop() }
}
