//! Error types for the protocol library.

use thiserror::Error;

/// Errors produced while decoding the inbound stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The stream contained bytes that are not valid UTF-8.
    #[error("stream is not valid UTF-8")]
    Utf8,

    /// A complete element was extracted but could not be parsed as XML.
    #[error("malformed element: {0}")]
    Xml(String),

    /// A close tag arrived for an element that was never opened.
    #[error("unbalanced close tag in stream")]
    Unbalanced,

    /// A stanza arrived before the stream header.
    #[error("stanza received before stream header")]
    HeaderMissing,
}
