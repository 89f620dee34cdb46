//! The stanza dispatch core.
//!
//! [`processor::StanzaProcessor`] is the entry point the transport layer
//! feeds: it verifies a decoded stanza, selects a handler from the
//! [`handler::HandlerRegistry`], builds a decorated [`broker::StanzaBroker`]
//! for the invocation, and applies the outcome to the session. The
//! per-session security/authentication phase lives in
//! [`state::SessionStateHolder`].

pub mod broker;
pub mod handler;
pub mod processor;
pub mod state;

pub use broker::{Binding, BrokerError, SimpleStanzaBroker, StanzaBroker, StanzaBrokerDecorator};
pub use handler::{HandlerOutcome, HandlerRegistry, StanzaHandler};
pub use processor::StanzaProcessor;
pub use state::{SessionState, SessionStateHolder, StateError};
