//! Unified error handling for roostd.
//!
//! The processing pipeline distinguishes three tiers:
//!
//! - [`ProcessingError`]: fatal, session-terminating. Programming or
//!   protocol-layer violations (unroutable stanza kind, missing handler,
//!   verification failure, dead response writer, misused TLS entry point).
//! - [`HandlerError`]: raised by handler execution. Most variants are
//!   recoverable (logged and swallowed, the session continues); the ones
//!   `is_fatal` reports escalate into a `ProcessingError`.
//! - Delivery failures never surface here directly; they are handed to the
//!   `DeliveryFailureStrategy` supplied with the write.

use crate::protocol::broker::BrokerError;
use crate::protocol::state::StateError;
use crate::server::session::WriteError;
use roost_proto::AddressError;
use thiserror::Error;

// ============================================================================
// Processing errors (fatal to the session)
// ============================================================================

/// Fatal errors raised by the stanza processor.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("stanza kind ('{name}', '{ns}') is not routable")]
    UnroutableStanza { name: String, ns: String },

    #[error("no handler registered for ('{name}', '{ns}')")]
    NoHandler { name: String, ns: String },

    #[error("handler '{handler}' rejected the stanza during verification")]
    VerificationFailed { handler: &'static str },

    #[error("failed to write response to session: {0}")]
    ResponseWrite(#[from] WriteError),

    #[error("fatal handler error: {0}")]
    Handler(#[source] HandlerError),

    #[error("TLS establishment misuse: {0}")]
    TlsMisuse(String),

    #[error("illegal session state transition: {0}")]
    State(#[from] StateError),
}

impl ProcessingError {
    /// Static error code for metrics labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnroutableStanza { .. } => "unroutable_stanza",
            Self::NoHandler { .. } => "no_handler",
            Self::VerificationFailed { .. } => "verification_failed",
            Self::ResponseWrite(_) => "response_write",
            Self::Handler(_) => "fatal_handler_error",
            Self::TlsMisuse(_) => "tls_misuse",
            Self::State(_) => "illegal_transition",
        }
    }
}

// ============================================================================
// Handler errors (recoverable unless marked fatal)
// ============================================================================

/// Errors raised while executing a stanza handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The stanza violates protocol rules for this handler or session phase.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The stanza is structurally unusable for this handler.
    #[error("malformed stanza: {0}")]
    Malformed(String),

    /// An address attribute failed strict parsing.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// A broker operation failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// A required collaborator is missing or unusable.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl HandlerError {
    /// Whether this error must terminate the session instead of being
    /// logged and swallowed.
    ///
    /// Local write failures mean the connection is dead; configuration
    /// errors mean the server is wired wrong and silently continuing would
    /// hide it.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Protocol(_) | Self::Malformed(_) | Self::Address(_) => false,
            Self::Configuration(_) => true,
            Self::Broker(broker) => match broker {
                BrokerError::Delivery(_) | BrokerError::Data(_) => false,
                BrokerError::SessionWrite(_) | BrokerError::Configuration(_) => true,
            },
        }
    }

    /// Static error code for metrics labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol_violation",
            Self::Malformed(_) => "malformed_stanza",
            Self::Address(_) => "bad_address",
            Self::Configuration(_) => "configuration",
            Self::Broker(broker) => match broker {
                BrokerError::Delivery(_) => "delivery_failed",
                BrokerError::Data(_) => "stanza_data",
                BrokerError::SessionWrite(_) => "session_write",
                BrokerError::Configuration(_) => "broker_configuration",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryError, RelayError};
    use roost_proto::{StanzaBuilder, ns};

    #[test]
    fn fatality_split_matches_taxonomy() {
        assert!(!HandlerError::Protocol("bad".into()).is_fatal());
        assert!(!HandlerError::Malformed("bad".into()).is_fatal());
        assert!(HandlerError::Configuration("no provider".into()).is_fatal());
        assert!(
            HandlerError::Broker(BrokerError::SessionWrite(WriteError::QueueClosed)).is_fatal()
        );

        let delivery = DeliveryError {
            stanza: StanzaBuilder::new("message", ns::JABBER_CLIENT).build(),
            strategy: "ignore",
            cause: RelayError::NoRoute("bob@y.example".into()),
        };
        assert!(!HandlerError::Broker(BrokerError::Delivery(delivery)).is_fatal());
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            HandlerError::Protocol("x".into()).error_code(),
            "protocol_violation"
        );
        assert_eq!(
            ProcessingError::NoHandler {
                name: "message".into(),
                ns: ns::JABBER_CLIENT.into()
            }
            .error_code(),
            "no_handler"
        );
    }
}
