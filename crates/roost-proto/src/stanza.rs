//! Immutable stanza trees.
//!
//! A [`Stanza`] is a single top-level protocol element: name, namespace,
//! ordered attributes, and ordered child nodes. Stanzas are built once with
//! [`StanzaBuilder`] and never mutated afterwards; every transformation in
//! the server (sender stamping, archive-id stamping) produces a new tree.
//!
//! Rendering via `Display` emits escaped XML. A child element only carries an
//! `xmlns` declaration when its namespace differs from its parent's, which
//! matches how the elements arrive on the wire.

use crate::jid::{AddressError, Entity};
use std::fmt;

/// A node inside a stanza: a child element or a text run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A nested element.
    Element(Stanza),
    /// Character data.
    Text(String),
}

/// An immutable protocol element tree, identified by `(name, namespace)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
    name: String,
    namespace: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Stanza {
    /// The element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The element namespace URI (may be empty).
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Look up an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All attributes in document order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// All child nodes in document order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.children.iter()
    }

    /// Child elements only, in document order.
    pub fn children(&self) -> impl Iterator<Item = &Stanza> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(child) => Some(child),
            Node::Text(_) => None,
        })
    }

    /// The first child element with the given name, any namespace.
    pub fn first_child(&self, name: &str) -> Option<&Stanza> {
        self.children().find(|child| child.name == name)
    }

    /// The first child element with the given name and namespace.
    pub fn first_child_in(&self, name: &str, namespace: &str) -> Option<&Stanza> {
        self.children()
            .find(|child| child.name == name && child.namespace == namespace)
    }

    /// Direct character data of this element, concatenated.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(text) = node {
                out.push_str(text);
            }
        }
        out
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, parent_ns: &str) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        if !self.namespace.is_empty() && self.namespace != parent_ns {
            write!(f, " xmlns='{}'", escape_attr(&self.namespace))?;
        }
        for (key, value) in &self.attributes {
            write!(f, " {}='{}'", key, escape_attr(value))?;
        }
        if self.children.is_empty() {
            return write!(f, "/>");
        }
        write!(f, ">")?;
        for node in &self.children {
            match node {
                Node::Element(child) => child.render(f, &self.namespace)?,
                Node::Text(text) => write!(f, "{}", escape_text(text))?,
            }
        }
        write!(f, "</{}>", self.name)
    }
}

impl fmt::Display for Stanza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, "")
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Builder for [`Stanza`] trees.
#[derive(Debug, Clone)]
pub struct StanzaBuilder {
    name: String,
    namespace: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl StanzaBuilder {
    /// Start a new element.
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Start from an existing stanza, copying name, namespace, attributes,
    /// and children. Used for transformations that stamp attributes or
    /// append children onto an otherwise unchanged tree.
    pub fn from_stanza(stanza: &Stanza) -> Self {
        Self {
            name: stanza.name.clone(),
            namespace: stanza.namespace.clone(),
            attributes: stanza.attributes.clone(),
            children: stanza.children.clone(),
        }
    }

    /// Append an attribute. Last write wins for duplicate names.
    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.set(name, value);
        self
    }

    /// Append an attribute when the value is present.
    pub fn attribute_opt(mut self, name: &str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.set(name, value);
        }
        self
    }

    fn set(&mut self, name: &str, value: &str) {
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| k == name) {
            slot.1 = value.to_string();
        } else {
            self.attributes.push((name.to_string(), value.to_string()));
        }
    }

    /// Append a text run.
    pub fn text(mut self, text: &str) -> Self {
        self.children.push(Node::Text(text.to_string()));
        self
    }

    /// Append a child element.
    pub fn child(mut self, child: Stanza) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Finish the tree.
    pub fn build(self) -> Stanza {
        Stanza {
            name: self.name,
            namespace: self.namespace,
            attributes: self.attributes,
            children: self.children,
        }
    }
}

/// The enumerated `type` attribute of a message stanza.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStanzaType {
    /// Standalone message (the default when the attribute is absent).
    Normal,
    /// One-to-one conversation message.
    Chat,
    /// Message sent within a multi-user room.
    Groupchat,
    /// Broadcast-style message that expects no reply.
    Headline,
    /// Error response to a previously sent message.
    Error,
}

impl MessageStanzaType {
    /// Parse the attribute value. Absent or unrecognized values map to
    /// `Normal`, which is how peers are told to treat them.
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value {
            Some("chat") => Self::Chat,
            Some("groupchat") => Self::Groupchat,
            Some("headline") => Self::Headline,
            Some("error") => Self::Error,
            _ => Self::Normal,
        }
    }

    /// The wire form of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Chat => "chat",
            Self::Groupchat => "groupchat",
            Self::Headline => "headline",
            Self::Error => "error",
        }
    }
}

/// A stanza known to be a `message` element.
///
/// Refinement wrapper: construction checks the element name, after which the
/// typed accessors (`message_type`, `to`, `from`, `body`) are meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageStanza(Stanza);

impl MessageStanza {
    /// Whether a stanza is a message element.
    pub fn is_message(stanza: &Stanza) -> bool {
        stanza.name() == "message"
    }

    /// Refine a stanza into a message. Returns the original stanza unchanged
    /// when it is not a message, so callers can pass it through.
    pub fn from_stanza(stanza: Stanza) -> Result<Self, Stanza> {
        if Self::is_message(&stanza) {
            Ok(Self(stanza))
        } else {
            Err(stanza)
        }
    }

    /// The typed `type` attribute.
    pub fn message_type(&self) -> MessageStanzaType {
        MessageStanzaType::from_attribute(self.0.attribute("type"))
    }

    /// The declared recipient, if any.
    pub fn to(&self) -> Result<Option<Entity>, AddressError> {
        self.0.attribute("to").map(Entity::parse).transpose()
    }

    /// The declared sender, if any.
    pub fn from(&self) -> Result<Option<Entity>, AddressError> {
        self.0.attribute("from").map(Entity::parse).transpose()
    }

    /// The first `body` child's text, if any.
    pub fn body(&self) -> Option<String> {
        self.0.first_child("body").map(Stanza::text)
    }

    /// Whether the message carries a body payload.
    pub fn has_body(&self) -> bool {
        self.0.first_child("body").is_some()
    }

    /// Borrow the underlying stanza.
    pub fn as_stanza(&self) -> &Stanza {
        &self.0
    }

    /// Unwrap into the underlying stanza.
    pub fn into_stanza(self) -> Stanza {
        self.0
    }
}
