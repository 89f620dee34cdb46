//! Incremental stream decoding.
//!
//! An XMPP session is one long-lived XML document: a `<stream:stream>` open
//! tag, followed by top-level stanzas, terminated by the matching close tag.
//! [`StreamDecoder`] consumes bytes as they arrive and emits a
//! [`StreamEvent`] whenever a complete unit is available.
//!
//! The decoder scans for element boundaries itself (depth tracking with
//! quote awareness) and hands each complete fragment to `minidom` for the
//! actual element grammar. Fragments are parsed inside a synthetic wrapper
//! carrying the stream's default namespace, so `<message/>` arriving without
//! an `xmlns` lands in the client namespace the way stream inheritance would
//! place it.

use crate::error::DecodeError;
use crate::stanza::{Stanza, StanzaBuilder};
use bytes::{Buf, BytesMut};

/// Attributes of the inbound stream open tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamHeader {
    /// Target domain the peer wants to reach.
    pub to: Option<String>,
    /// Domain the peer claims to be.
    pub from: Option<String>,
    /// Protocol version, "1.0" for RFC 6120 peers.
    pub version: Option<String>,
    /// Declared stream language.
    pub lang: Option<String>,
}

/// A decoded unit of the inbound stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The peer opened its side of the stream.
    StreamOpen(StreamHeader),
    /// A complete top-level stanza.
    Stanza(Stanza),
    /// The peer closed its side of the stream.
    StreamClose,
}

/// Incremental decoder for one direction of a stream.
#[derive(Debug)]
pub struct StreamDecoder {
    buf: BytesMut,
    default_ns: String,
    header_seen: bool,
}

impl StreamDecoder {
    /// Create a decoder. `default_ns` is applied to stanzas that do not
    /// declare their own namespace (stream inheritance).
    pub fn new(default_ns: &str) -> Self {
        Self {
            buf: BytesMut::with_capacity(8 * 1024),
            default_ns: default_ns.to_string(),
            header_seen: false,
        }
    }

    /// Append bytes read from the transport.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Whether the stream open tag has been consumed.
    pub fn header_seen(&self) -> bool {
        self.header_seen
    }

    /// Decode the next complete event, or `None` if more bytes are needed.
    pub fn next_event(&mut self) -> Result<Option<StreamEvent>, DecodeError> {
        self.discard_leading_noise()?;

        let data = match self.valid_str() {
            Some(data) if !data.is_empty() => data.to_string(),
            _ => return Ok(None),
        };

        if !self.header_seen {
            return self.decode_header(&data);
        }

        if data.starts_with("</stream") {
            return match data.find('>') {
                Some(end) => {
                    self.buf.advance(end + 1);
                    Ok(Some(StreamEvent::StreamClose))
                }
                None => Ok(None),
            };
        }

        match find_element_end(&data)? {
            Some(end) => {
                let stanza = self.parse_fragment(&data[..end])?;
                self.buf.advance(end);
                Ok(Some(StreamEvent::Stanza(stanza)))
            }
            None => Ok(None),
        }
    }

    /// Drop whitespace keep-alives and the optional XML prologue.
    fn discard_leading_noise(&mut self) -> Result<(), DecodeError> {
        loop {
            let Some(data) = self.valid_str() else {
                return Ok(());
            };
            let trimmed = data.len() - data.trim_start().len();
            if trimmed > 0 {
                self.buf.advance(trimmed);
                continue;
            }
            if data.starts_with("<?") {
                match data.find("?>") {
                    Some(end) => {
                        self.buf.advance(end + 2);
                        continue;
                    }
                    None => return Ok(()),
                }
            }
            return Ok(());
        }
    }

    fn decode_header(&mut self, data: &str) -> Result<Option<StreamEvent>, DecodeError> {
        if data.starts_with("<stream:stream") || data.starts_with("<stream ") {
            let Some((end, _)) = tag_end(data, 0) else {
                return Ok(None);
            };
            let tag = &data[..=end];
            let header = StreamHeader {
                to: extract_attribute(tag, "to"),
                from: extract_attribute(tag, "from"),
                version: extract_attribute(tag, "version"),
                lang: extract_attribute(tag, "xml:lang"),
            };
            self.buf.advance(end + 1);
            self.header_seen = true;
            return Ok(Some(StreamEvent::StreamOpen(header)));
        }
        if data.starts_with('<') && data.len() > "<stream:stream".len() {
            // A complete-looking element arrived before any stream header.
            return Err(DecodeError::HeaderMissing);
        }
        Ok(None)
    }

    /// Bytes of the buffer as a str, ignoring an incomplete UTF-8 tail.
    fn valid_str(&self) -> Option<&str> {
        match std::str::from_utf8(&self.buf) {
            Ok(data) => Some(data),
            Err(err) if err.error_len().is_none() => {
                // Multi-byte character split across reads.
                std::str::from_utf8(&self.buf[..err.valid_up_to()]).ok()
            }
            Err(_) => None,
        }
    }

    fn parse_fragment(&self, fragment: &str) -> Result<Stanza, DecodeError> {
        let wrapped = format!("<wrap xmlns='{}'>{}</wrap>", self.default_ns, fragment);
        let root: minidom::Element = wrapped
            .parse()
            .map_err(|err: minidom::Error| DecodeError::Xml(err.to_string()))?;
        let child = root
            .children()
            .next()
            .ok_or_else(|| DecodeError::Xml("empty fragment".to_string()))?;
        Ok(convert(child))
    }
}

fn convert(element: &minidom::Element) -> Stanza {
    let mut builder = StanzaBuilder::new(element.name(), &element.ns());
    for (key, value) in element.attrs() {
        builder = builder.attribute(key, value);
    }
    for node in element.nodes() {
        match node {
            minidom::Node::Element(child) => builder = builder.child(convert(child)),
            minidom::Node::Text(text) => builder = builder.text(text),
        }
    }
    builder.build()
}

/// Find the end (exclusive byte offset) of the complete top-level element
/// starting at offset 0, or `None` if the buffer does not hold it all yet.
fn find_element_end(data: &str) -> Result<Option<usize>, DecodeError> {
    let bytes = data.as_bytes();
    let mut depth = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        if bytes.len() > i + 1 && bytes[i + 1] == b'?' {
            match data[i..].find("?>") {
                Some(offset) => {
                    i += offset + 2;
                    continue;
                }
                None => return Ok(None),
            }
        }
        if bytes.len() > i + 1 && bytes[i + 1] == b'!' {
            match data[i..].find('>') {
                Some(offset) => {
                    i += offset + 1;
                    continue;
                }
                None => return Ok(None),
            }
        }

        let closing = bytes.len() > i + 1 && bytes[i + 1] == b'/';
        let Some((end, self_closing)) = tag_end(data, i) else {
            return Ok(None);
        };

        if closing {
            if depth == 0 {
                return Err(DecodeError::Unbalanced);
            }
            depth -= 1;
            if depth == 0 {
                return Ok(Some(end + 1));
            }
        } else if self_closing {
            if depth == 0 {
                return Ok(Some(end + 1));
            }
        } else {
            depth += 1;
        }
        i = end + 1;
    }

    Ok(None)
}

/// Locate the `>` terminating the tag that starts at `start`, honoring
/// quoted attribute values. Returns the offset of `>` and whether the tag is
/// self-closing.
fn tag_end(data: &str, start: usize) -> Option<(usize, bool)> {
    let bytes = data.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = start + 1;
    while i < bytes.len() {
        let byte = bytes[i];
        match quote {
            Some(open) => {
                if byte == open {
                    quote = None;
                }
            }
            None => match byte {
                b'"' | b'\'' => quote = Some(byte),
                b'>' => return Some((i, bytes[i - 1] == b'/')),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Pull one attribute value out of a raw tag slice. The stream open tag is
/// intentionally unclosed XML, so it never reaches the element parser.
fn extract_attribute(tag: &str, name: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let pattern = format!("{name}={quote}");
        if let Some(start) = tag.find(&pattern) {
            let value_start = start + pattern.len();
            if let Some(len) = tag[value_start..].find(quote) {
                return Some(tag[value_start..value_start + len].to_string());
            }
        }
    }
    None
}
