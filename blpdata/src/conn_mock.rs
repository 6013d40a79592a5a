// blpdata/src/conn_mock.rs
// Sessions that never touch a terminal: scripted (for tests) and replayed
// from a recording made with `conn_log::RecordingProvider`.

use crate::base::BlpError;
use crate::conn::{Session, SessionProvider};
use crate::conn_log::{event_from_json, LogDirection};
use crate::element::Datum;
use crate::event::{CorrelationId, Event, EventType, Message};
use crate::request::Request;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rusqlite::{params, Connection as DbConnection, OpenFlags};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

// --- Scripted sessions ---

/// One thing the scripted terminal does after a request is sent.
#[derive(Debug, Clone)]
pub enum ScriptStep {
  Deliver(Event),
  /// Makes one poll return without an event.
  Silence,
}

impl ScriptStep {
  pub fn event(event_type: EventType, message_type: &str, data: JsonValue) -> Self {
    ScriptStep::Deliver(Event::new(event_type, vec![Message::new(message_type, Datum::from_json(&data), None)]))
  }

  pub fn partial(message_type: &str, data: JsonValue) -> Self {
    Self::event(EventType::PartialResponse, message_type, data)
  }

  pub fn response(message_type: &str, data: JsonValue) -> Self {
    Self::event(EventType::Response, message_type, data)
  }
}

#[derive(Debug, Default)]
struct JournalState {
  endpoints: Vec<(String, u16)>,
  sessions_stopped: usize,
  services_opened: Vec<String>,
  requests: Vec<Request>,
}

/// What scripted sessions were asked to do, shared by every session of a provider.
#[derive(Debug, Clone, Default)]
pub struct SessionJournal {
  inner: Arc<Mutex<JournalState>>,
}

impl SessionJournal {
  pub fn sessions_opened(&self) -> usize { self.inner.lock().endpoints.len() }
  pub fn sessions_stopped(&self) -> usize { self.inner.lock().sessions_stopped }
  pub fn endpoints(&self) -> Vec<(String, u16)> { self.inner.lock().endpoints.clone() }
  pub fn services_opened(&self) -> Vec<String> { self.inner.lock().services_opened.clone() }
  pub fn requests(&self) -> Vec<Request> { self.inner.lock().requests.clone() }
}

/// In-memory stand-in for the terminal. Each `respond` call scripts the
/// events for one send of an operation; the last script repeats.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
  scripts: Arc<Mutex<HashMap<String, Vec<Vec<ScriptStep>>>>>,
  sends: Arc<Mutex<HashMap<String, usize>>>,
  journal: SessionJournal,
  fail_start: bool,
  failing_services: Vec<String>,
}

impl ScriptedProvider {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(self, operation: &str, steps: Vec<ScriptStep>) -> Self {
    self.scripts.lock().entry(operation.to_string()).or_default().push(steps);
    self
  }

  pub fn fail_start(mut self) -> Self {
    self.fail_start = true;
    self
  }

  pub fn fail_service(mut self, service: &str) -> Self {
    self.failing_services.push(service.to_string());
    self
  }

  pub fn journal(&self) -> SessionJournal {
    self.journal.clone()
  }

  fn script_for(&self, operation: &str) -> Vec<ScriptStep> {
    let scripts = self.scripts.lock();
    let Some(list) = scripts.get(operation) else { return Vec::new() };
    let mut sends = self.sends.lock();
    let n = sends.entry(operation.to_string()).or_insert(0);
    let idx = (*n).min(list.len().saturating_sub(1));
    *n += 1;
    list.get(idx).cloned().unwrap_or_default()
  }
}

impl SessionProvider for ScriptedProvider {
  fn open_session(&self, host: &str, port: u16) -> Result<Box<dyn Session>, BlpError> {
    self.journal.inner.lock().endpoints.push((host.to_string(), port));
    let (tx, rx) = unbounded();
    Ok(Box::new(ScriptedSession {
      provider: self.clone(),
      services: Vec::new(),
      tx,
      rx,
    }))
  }
}

struct ScriptedSession {
  provider: ScriptedProvider,
  services: Vec<String>,
  tx: Sender<ScriptStep>,
  rx: Receiver<ScriptStep>,
}

impl Session for ScriptedSession {
  fn start(&mut self) -> Result<(), BlpError> {
    if self.provider.fail_start {
      return Err(BlpError::ConnectionFailed("Scripted session refused to start".to_string()));
    }
    Ok(())
  }

  fn open_service(&mut self, service: &str) -> Result<(), BlpError> {
    if self.provider.failing_services.iter().any(|s| s == service) {
      return Err(BlpError::ServiceUnavailable(format!("Scripted failure opening {}", service)));
    }
    self.provider.journal.inner.lock().services_opened.push(service.to_string());
    self.services.push(service.to_string());
    Ok(())
  }

  fn create_request(&self, service: &str, operation: &str) -> Result<Request, BlpError> {
    if !self.services.iter().any(|s| s == service) {
      return Err(BlpError::ServiceUnavailable(format!("{} is not open", service)));
    }
    Ok(Request::new(service, operation))
  }

  fn send_request(&mut self, request: &Request, correlation_id: CorrelationId) -> Result<(), BlpError> {
    self.provider.journal.inner.lock().requests.push(request.clone());
    for step in self.provider.script_for(request.operation()) {
      let step = match step {
        ScriptStep::Deliver(event) => ScriptStep::Deliver(stamp(event, correlation_id)),
        silence => silence,
      };
      self.tx.send(step)
        .map_err(|e| BlpError::InternalError(format!("Scripted queue closed: {}", e)))?;
    }
    Ok(())
  }

  fn next_event(&mut self, timeout: Duration) -> Result<Option<Event>, BlpError> {
    match self.rx.recv_timeout(timeout) {
      Ok(ScriptStep::Deliver(event)) => Ok(Some(event)),
      Ok(ScriptStep::Silence) | Err(RecvTimeoutError::Timeout) => Ok(None),
      Err(RecvTimeoutError::Disconnected) => Err(BlpError::SessionTerminated("Scripted queue disconnected".to_string())),
    }
  }

  fn stop(&mut self) -> Result<(), BlpError> {
    self.provider.journal.inner.lock().sessions_stopped += 1;
    Ok(())
  }
}

fn stamp(event: Event, cid: CorrelationId) -> Event {
  let event_type = event.event_type();
  let messages = event.messages().iter().cloned().map(|m| m.with_correlation_id(cid)).collect();
  Event::new(event_type, messages)
}

// --- Replay from a recording ---

#[derive(Debug, Clone)]
enum LoggedEntry {
  Send { operation: String },
  Recv(Event),
}

#[derive(Debug)]
struct ReplayState {
  entries: Vec<LoggedEntry>,
  cursor: usize,
}

/// Replays a session recorded by `RecordingProvider`. Sends must arrive in the
/// recorded order; each one releases the events recorded after it.
#[derive(Clone)]
pub struct ReplayProvider {
  state: Arc<Mutex<ReplayState>>,
}

impl ReplayProvider {
  /// Loads the most recent recording named `session_name`.
  pub fn new<P: AsRef<Path>>(db_path: P, session_name: &str) -> Result<Self, BlpError> {
    log::info!("Loading replay session '{}' from DB: {:?}", session_name, db_path.as_ref());
    let db = DbConnection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
      .map_err(|e| BlpError::ConfigurationError(format!("Replay: Failed to open DB: {}", e)))?;

    let session_id: i64 = db.query_row(
      "SELECT id FROM sessions WHERE session_name = ?1 ORDER BY id DESC LIMIT 1",
      params![session_name],
      |row| row.get(0),
    ).map_err(|e| match e {
      rusqlite::Error::QueryReturnedNoRows => BlpError::ConfigurationError(format!("Replay: Session '{}' not found in database.", session_name)),
      _ => BlpError::ReplayError(format!("Replay: Failed to query session '{}': {}", session_name, e)),
    })?;

    let rows: Vec<(String, Option<String>, Option<String>, String)> = {
      let mut stmt = db.prepare(
        "SELECT direction, operation, event_type, payload_json FROM session_messages WHERE session_id = ?1 ORDER BY id ASC"
      ).map_err(|e| BlpError::ReplayError(format!("Replay: Failed to prepare message query: {}", e)))?;
      let mapped = stmt.query_map(params![session_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
        .map_err(|e| BlpError::ReplayError(format!("Replay: Failed to query messages: {}", e)))?;
      mapped.collect::<Result<Vec<_>, _>>()
        .map_err(|e| BlpError::ReplayError(format!("Replay: Failed to read messages: {}", e)))?
    };

    let mut entries = Vec::with_capacity(rows.len());
    for (direction, operation, event_type, payload) in rows {
      match LogDirection::from_str(&direction)? {
        LogDirection::Send => entries.push(LoggedEntry::Send { operation: operation.unwrap_or_default() }),
        LogDirection::Recv => {
          let event_type = EventType::from_str(event_type.as_deref().unwrap_or_default())?;
          let json: JsonValue = serde_json::from_str(&payload)
            .map_err(|e| BlpError::ReplayError(format!("Replay: Bad payload JSON: {}", e)))?;
          entries.push(LoggedEntry::Recv(event_from_json(event_type, &json)?));
        }
      }
    }
    log::info!("Replay: Loaded {} messages for session '{}'", entries.len(), session_name);
    Ok(ReplayProvider { state: Arc::new(Mutex::new(ReplayState { entries, cursor: 0 })) })
  }

  /// Number of recorded entries not yet replayed.
  pub fn remaining(&self) -> usize {
    let state = self.state.lock();
    state.entries.len() - state.cursor
  }
}

impl SessionProvider for ReplayProvider {
  fn open_session(&self, _host: &str, _port: u16) -> Result<Box<dyn Session>, BlpError> {
    Ok(Box::new(ReplaySession { state: self.state.clone(), pending: VecDeque::new(), services: Vec::new() }))
  }
}

struct ReplaySession {
  state: Arc<Mutex<ReplayState>>,
  pending: VecDeque<Event>,
  services: Vec<String>,
}

impl Session for ReplaySession {
  fn start(&mut self) -> Result<(), BlpError> { Ok(()) }

  fn open_service(&mut self, service: &str) -> Result<(), BlpError> {
    self.services.push(service.to_string());
    Ok(())
  }

  fn create_request(&self, service: &str, operation: &str) -> Result<Request, BlpError> {
    if !self.services.iter().any(|s| s == service) {
      return Err(BlpError::ServiceUnavailable(format!("{} is not open", service)));
    }
    Ok(Request::new(service, operation))
  }

  fn send_request(&mut self, request: &Request, correlation_id: CorrelationId) -> Result<(), BlpError> {
    let mut state = self.state.lock();
    let cursor = state.cursor;
    match state.entries.get(cursor) {
      Some(LoggedEntry::Send { operation }) if operation == request.operation() => {}
      Some(LoggedEntry::Send { operation }) => {
        return Err(BlpError::ReplayError(format!(
          "Replay: Expected {} at entry {}, got {}", operation, cursor + 1, request.operation())));
      }
      Some(LoggedEntry::Recv(_)) => {
        return Err(BlpError::ReplayError(format!("Replay: Entry {} is not a send", cursor + 1)));
      }
      None => return Err(BlpError::ReplayError("Replay: Recording exhausted".to_string())),
    }
    state.cursor += 1;
    while let Some(LoggedEntry::Recv(event)) = state.entries.get(state.cursor) {
      self.pending.push_back(stamp(event.clone(), correlation_id));
      state.cursor += 1;
    }
    log::debug!("Replay: {} queued {} events", request.operation(), self.pending.len());
    Ok(())
  }

  fn next_event(&mut self, _timeout: Duration) -> Result<Option<Event>, BlpError> {
    self.pending.pop_front().map(Some)
      .ok_or_else(|| BlpError::ReplayError("Replay: No more recorded events for this request".to_string()))
  }

  fn stop(&mut self) -> Result<(), BlpError> { Ok(()) }
}
