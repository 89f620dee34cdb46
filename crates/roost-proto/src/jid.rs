//! XMPP addressing (JIDs).
//!
//! An [`Entity`] is the parsed form of `local@domain/resource`. The bare
//! form (`local@domain`) identifies an account; the full form identifies one
//! connected resource of that account. Parsing is strict: anything that does
//! not round-trip cleanly is rejected with [`AddressError`]. For trusted
//! internal literals there is [`Entity::parse_unchecked`], which splits
//! without validating.

use std::fmt;
use thiserror::Error;

/// Errors raised by strict JID parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The input was empty.
    #[error("empty address")]
    Empty,

    /// The domain part was missing or empty.
    #[error("address '{0}' has no domain")]
    EmptyDomain(String),

    /// An `@` was present but the local part was empty.
    #[error("address '{0}' has an empty local part")]
    EmptyLocal(String),

    /// A `/` was present but the resource part was empty.
    #[error("address '{0}' has an empty resource")]
    EmptyResource(String),

    /// The domain contained a stray `@`.
    #[error("address '{0}' contains more than one '@'")]
    StrayAt(String),

    /// The address contained whitespace.
    #[error("address '{0}' contains whitespace")]
    Whitespace(String),
}

/// An XMPP entity: `local@domain/resource` with optional local and resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    local: Option<String>,
    domain: String,
    resource: Option<String>,
}

impl Entity {
    /// Strictly parse a JID from its wire form.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(AddressError::Whitespace(raw.to_string()));
        }

        let (local, domain, resource) = split(raw);

        if let Some(local) = &local {
            if local.is_empty() {
                return Err(AddressError::EmptyLocal(raw.to_string()));
            }
        }
        if domain.is_empty() {
            return Err(AddressError::EmptyDomain(raw.to_string()));
        }
        if domain.contains('@') {
            return Err(AddressError::StrayAt(raw.to_string()));
        }
        if let Some(resource) = &resource {
            if resource.is_empty() {
                return Err(AddressError::EmptyResource(raw.to_string()));
            }
        }

        Ok(Self {
            local,
            domain,
            resource,
        })
    }

    /// Split a trusted internal literal without validation.
    ///
    /// Intended for compile-time constants and values this server produced
    /// itself. Malformed input yields a best-effort entity rather than an
    /// error, so never feed it wire data.
    pub fn parse_unchecked(raw: &str) -> Self {
        let (local, domain, resource) = split(raw);
        Self {
            local,
            domain,
            resource,
        }
    }

    /// Build an entity from already-separated parts.
    pub fn new(local: Option<&str>, domain: &str, resource: Option<&str>) -> Self {
        Self {
            local: local.map(str::to_string),
            domain: domain.to_string(),
            resource: resource.map(str::to_string),
        }
    }

    /// The account-local part, if any.
    pub fn local(&self) -> Option<&str> {
        self.local.as_deref()
    }

    /// The domain part.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The resource part, if any.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// The bare form of this entity: resource dropped.
    pub fn bare(&self) -> Entity {
        Entity {
            local: self.local.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    /// Whether this entity is already bare.
    pub fn is_bare(&self) -> bool {
        self.resource.is_none()
    }

    /// A copy of this entity bound to the given resource.
    pub fn with_resource(&self, resource: &str) -> Entity {
        Entity {
            local: self.local.clone(),
            domain: self.domain.clone(),
            resource: Some(resource.to_string()),
        }
    }
}

fn split(raw: &str) -> (Option<String>, String, Option<String>) {
    let (head, resource) = match raw.split_once('/') {
        Some((head, resource)) => (head, Some(resource.to_string())),
        None => (raw, None),
    };
    let (local, domain) = match head.split_once('@') {
        Some((local, domain)) => (Some(local.to_string()), domain.to_string()),
        None => (None, head.to_string()),
    };
    (local, domain, resource)
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(local) = &self.local {
            write!(f, "{local}@")?;
        }
        write!(f, "{}", self.domain)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{resource}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Entity {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Entity::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_jid() {
        let jid = Entity::parse("alice@wonderland.example/rabbit-hole").unwrap();
        assert_eq!(jid.local(), Some("alice"));
        assert_eq!(jid.domain(), "wonderland.example");
        assert_eq!(jid.resource(), Some("rabbit-hole"));
    }

    #[test]
    fn parses_bare_and_domain_forms() {
        let bare = Entity::parse("alice@wonderland.example").unwrap();
        assert!(bare.is_bare());

        let domain = Entity::parse("wonderland.example").unwrap();
        assert_eq!(domain.local(), None);
        assert_eq!(domain.domain(), "wonderland.example");
    }

    #[test]
    fn bare_jid_round_trips() {
        let raw = "alice@wonderland.example";
        let jid = Entity::parse(raw).unwrap();
        assert_eq!(jid.to_string(), raw);
    }

    #[test]
    fn bare_derivation_is_idempotent() {
        let full = Entity::parse("alice@wonderland.example/den").unwrap();
        let bare = full.bare();
        assert_eq!(bare, bare.bare());
        assert_eq!(bare.to_string(), "alice@wonderland.example");
    }

    #[test]
    fn equality_is_structural() {
        let a = Entity::parse("a@b.example/c").unwrap();
        let b = Entity::new(Some("a"), "b.example", Some("c"));
        assert_eq!(a, b);
        assert_ne!(a, a.bare());
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(Entity::parse(""), Err(AddressError::Empty));
        assert!(matches!(
            Entity::parse("@domain.example"),
            Err(AddressError::EmptyLocal(_))
        ));
        assert!(matches!(
            Entity::parse("alice@"),
            Err(AddressError::EmptyDomain(_))
        ));
        assert!(matches!(
            Entity::parse("alice@b.example/"),
            Err(AddressError::EmptyResource(_))
        ));
        assert!(matches!(
            Entity::parse("a@b@c.example"),
            Err(AddressError::StrayAt(_))
        ));
        assert!(matches!(
            Entity::parse("alice smith@b.example"),
            Err(AddressError::Whitespace(_))
        ));
    }

    #[test]
    fn unchecked_splits_without_validating() {
        let jid = Entity::parse_unchecked("roost.example");
        assert_eq!(jid.domain(), "roost.example");
        assert_eq!(jid.local(), None);
    }
}
