//! # roost-proto
//!
//! Protocol primitives for the Roost XMPP daemon.
//!
//! This crate holds everything the server core needs to talk about the wire
//! without owning the wire itself:
//!
//! - [`Entity`]: JID addressing with strict parsing and bare-JID derivation
//! - [`Stanza`]: an immutable XML element tree, built once via
//!   [`StanzaBuilder`] and rendered back through `Display`
//! - [`MessageStanza`]: the message refinement with its typed `type` attribute
//! - [`StreamDecoder`]: an incremental decoder that turns a byte stream into
//!   stream events and complete stanzas
//!
//! The decoder deliberately does not implement a general XML grammar. It
//! extracts complete top-level elements from the stream and hands them to
//! `minidom` for element parsing, then converts the result into [`Stanza`].

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod jid;
pub mod ns;
pub mod stanza;

pub use codec::{StreamDecoder, StreamEvent, StreamHeader};
pub use error::DecodeError;
pub use jid::{AddressError, Entity};
pub use stanza::{MessageStanza, MessageStanzaType, Stanza, StanzaBuilder};
