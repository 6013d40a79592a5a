// blpdata/src/lib.rs
// Main entry point for the terminal request library

//! # blpdata
//!
//! Typed requests against a running market-data terminal, returned as
//! normalized result sets:
//!
//! - Reference, historical and portfolio data
//! - Field metadata and field search
//! - Government, security and curve lookup
//! - Equity screens and technical studies
//! - Recording and replay of sessions for offline use
//!
//! Every request runs the same lifecycle (open session, open service, build,
//! send, poll, parse) on a session that is released on every exit path. The
//! vendor client library is reached only through the `conn::Session` and
//! `conn::SessionProvider` traits.

mod base;
mod element;
mod event;
mod parser;
mod session;
pub mod config;
pub mod request;
pub mod conn;
pub mod conn_log;
pub mod conn_mock;
pub mod lifecycle;
pub mod result;
pub mod table;
pub mod reference;
pub mod field;
pub mod instrument;
pub mod screen;
pub mod study;
pub mod dispatch;
pub mod client;

pub use base::{BlpError, ResponseError};
pub use client::BlpClient;
pub use config::ClientOptions;
pub use dispatch::{AnyRequest, RequestType};
pub use element::{Datum, Element, Value};
pub use event::{CorrelationId, Event, EventType, Message, Response};
pub use result::{FieldValue, ResultSet, Row};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
