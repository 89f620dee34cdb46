//! Shared helpers for handler implementations.

use crate::server::session::SessionContext;
use roost_proto::{AddressError, Entity, Stanza, StanzaBuilder, ns};

/// The sender of a stanza: the `from` attribute when present (parsed
/// strictly), otherwise the entity the session authenticated as.
pub fn extract_sender_jid(
    stanza: &Stanza,
    session: &SessionContext,
) -> Result<Option<Entity>, AddressError> {
    if let Some(from) = stanza.attribute("from") {
        return Entity::parse(from).map(Some);
    }
    Ok(session.bound_entity())
}

/// Build the error variant of a stanza: same kind, `type='error'`, id
/// preserved, with a cancel-class condition from the stanza error
/// namespace.
pub fn error_reply(
    original: &Stanza,
    from: &Entity,
    to: Option<&Entity>,
    condition: &str,
) -> Stanza {
    let mut builder = StanzaBuilder::new(original.name(), original.namespace())
        .attribute("type", "error")
        .attribute("from", &from.to_string());
    if let Some(to) = to {
        builder = builder.attribute("to", &to.to_string());
    }
    builder = builder.attribute_opt("id", original.attribute("id"));
    builder
        .child(
            StanzaBuilder::new("error", original.namespace())
                .attribute("type", "cancel")
                .child(StanzaBuilder::new(condition, ns::STANZAS).build())
                .build(),
        )
        .build()
}

/// Build an empty `result` reply for an iq request.
pub fn iq_result(original: &Stanza, from: &Entity, to: Option<&Entity>) -> Stanza {
    let mut builder = StanzaBuilder::new("iq", original.namespace())
        .attribute("type", "result")
        .attribute("from", &from.to_string());
    if let Some(to) = to {
        builder = builder.attribute("to", &to.to_string());
    }
    builder.attribute_opt("id", original.attribute("id")).build()
}
