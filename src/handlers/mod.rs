//! Stanza handlers.
//!
//! One handler per routable stanza kind. Handlers implement
//! [`crate::protocol::StanzaHandler`]; [`default_registry`] wires up the set
//! a client-to-server dispatch path serves.

mod auth;
mod helpers;
mod iq;
mod message;
mod presence;
mod starttls;

pub use auth::SaslAuthHandler;
pub use helpers::{error_reply, extract_sender_jid, iq_result};
pub use iq::IqHandler;
pub use message::MessageHandler;
pub use presence::PresenceHandler;
pub use starttls::StartTlsHandler;

use crate::protocol::handler::HandlerRegistry;
use roost_proto::ns;
use std::sync::Arc;

/// Build the registry for a client-to-server dispatch path.
///
/// STARTTLS is only offered when the endpoint actually has an acceptor to
/// complete the handshake with.
pub fn default_registry(tls_available: bool) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    registry.register("message", ns::JABBER_CLIENT, Arc::new(MessageHandler));
    registry.register("presence", ns::JABBER_CLIENT, Arc::new(PresenceHandler));
    registry.register("iq", ns::JABBER_CLIENT, Arc::new(IqHandler));
    registry.register("auth", ns::SASL, Arc::new(SaslAuthHandler));

    if tls_available {
        registry.register("starttls", ns::TLS, Arc::new(StartTlsHandler));
    }

    registry
}
