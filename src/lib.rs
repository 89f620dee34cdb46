//! roostd - Roost XMPP Daemon
//!
//! A stanza-processing and delivery engine: decoded stanzas arrive on a
//! session, the [`protocol::StanzaProcessor`] selects a handler, the handler
//! executes against a decorator-wrappable [`protocol::StanzaBroker`], and
//! responses and relayed traffic flow out through per-session serial
//! writers. Message archiving ships as the reference broker decorator.

pub mod archive;
pub mod config;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod network;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod telemetry;

pub use roost_proto as proto;
