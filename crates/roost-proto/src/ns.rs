//! Namespace URIs used on the XMPP wire.

/// Client-to-server stanza namespace.
pub const JABBER_CLIENT: &str = "jabber:client";
/// Server-to-server stanza namespace.
pub const JABBER_SERVER: &str = "jabber:server";
/// Stream framing namespace.
pub const STREAM: &str = "http://etherx.jabber.org/streams";
/// STARTTLS negotiation namespace.
pub const TLS: &str = "urn:ietf:params:xml:ns:xmpp-tls";
/// SASL negotiation namespace.
pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
/// Stanza error condition namespace.
pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
/// XMPP ping (XEP-0199).
pub const PING: &str = "urn:xmpp:ping";
/// Stable stanza ids (XEP-0359), used to stamp archived messages.
pub const STANZA_ID: &str = "urn:xmpp:sid:0";
