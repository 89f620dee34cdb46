//! The stanza dispatch loop.
//!
//! `StanzaProcessor` is what the transport layer hands decoded stanzas to.
//! It enforces the processing contract:
//!
//! - unroutable stanza kinds, missing handlers, and verification failures
//!   are programming/protocol violations and fail fatally;
//! - a handler's recoverable execution error is logged and swallowed so one
//!   bad stanza cannot take the session down;
//! - a successful outcome first advances the session state (if requested),
//!   then writes the response through the session's own writer, where a
//!   failure is fatal because the connection is presumed dead.
//!
//! `process_tls_established` is the one entry point driven by a transport
//! event instead of a stanza. Misusing it is a programming error and fails
//! loudly rather than silently no-opping.

use crate::error::ProcessingError;
use crate::protocol::state::{SessionState, SessionStateHolder};
use crate::server::runtime::ServerRuntimeContext;
use crate::server::session::SessionContext;
use crate::telemetry::StanzaTimer;
use roost_proto::{Stanza, ns};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stanza kinds the protocol layer routes to handlers: the three core
/// stanzas by name, plus the TLS and SASL negotiation namespaces.
fn is_routable(name: &str, namespace: &str) -> bool {
    matches!(name, "message" | "presence" | "iq")
        || namespace == ns::TLS
        || namespace == ns::SASL
}

/// The dispatch loop. Stateless; all state lives in the runtime context and
/// the per-session holders.
#[derive(Debug, Default, Clone, Copy)]
pub struct StanzaProcessor;

impl StanzaProcessor {
    /// Create a processor.
    pub fn new() -> Self {
        Self
    }

    /// Dispatch one stanza for one session.
    pub async fn process_stanza(
        &self,
        server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
        stanza: &Stanza,
        state: &mut SessionStateHolder,
    ) -> Result<(), ProcessingError> {
        let name = stanza.name().to_string();
        let namespace = stanza.namespace().to_string();

        if !is_routable(&name, &namespace) {
            return Err(ProcessingError::UnroutableStanza {
                name,
                ns: namespace,
            });
        }

        let Some(handler) = server.handlers().get(&name, &namespace) else {
            return Err(ProcessingError::NoHandler {
                name,
                ns: namespace,
            });
        };

        if !handler.verify(stanza) {
            return Err(ProcessingError::VerificationFailed {
                handler: handler.name(),
            });
        }

        crate::metrics::record_stanza(&name);
        let _timer = StanzaTimer::new(handler.name());

        // Fresh broker per invocation, wrapped by every registered outbound
        // decorator.
        let broker = server.outbound_broker(session);

        let outcome = match handler
            .execute(stanza, server, false, session, state, broker.as_ref())
            .await
        {
            Ok(outcome) => outcome,
            Err(err) if err.is_fatal() => {
                return Err(ProcessingError::Handler(err));
            }
            Err(err) => {
                // One malformed or failed stanza must not terminate the
                // session: no response, no state change.
                crate::metrics::record_handler_error(err.error_code());
                warn!(
                    handler = handler.name(),
                    session = %session.id(),
                    error = %err,
                    "Handler execution failed; stanza dropped"
                );
                return Ok(());
            }
        };

        if let Some(next) = outcome.next_state() {
            state.advance(next)?;
            debug!(session = %session.id(), state = ?state.state(), "Session state advanced");
        }

        if let Some(response) = outcome.into_response() {
            session
                .writer()
                .write(response)
                .await
                .map_err(ProcessingError::ResponseWrite)?;
        }

        Ok(())
    }

    /// Confirm a completed TLS handshake on the transport.
    ///
    /// Must be called exactly once per session, after a STARTTLS exchange
    /// negotiated by a registered handler. Calling it on a dispatch path
    /// with no STARTTLS handler, or outside the `Initiated` phase, is a
    /// programming error.
    pub fn process_tls_established(
        &self,
        server: &Arc<ServerRuntimeContext>,
        session: &Arc<SessionContext>,
        state: &mut SessionStateHolder,
    ) -> Result<(), ProcessingError> {
        if server.handlers().get("starttls", ns::TLS).is_none() {
            return Err(ProcessingError::TlsMisuse(
                "no STARTTLS handler registered on this dispatch path".to_string(),
            ));
        }
        if state.state() != SessionState::Initiated {
            return Err(ProcessingError::TlsMisuse(format!(
                "TLS establishment signaled in state {:?}",
                state.state()
            )));
        }
        state.advance(SessionState::EncryptionStarted)?;
        info!(session = %session.id(), "TLS established");
        Ok(())
    }
}
