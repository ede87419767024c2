//! Prefix/escape protocol for embedding typed payloads inside JSON strings.
//!
//! A [`PrefixCodec`] turns a typed payload into a plain string token of the
//! form `prefix + payload-text`, and escapes literal strings that would
//! otherwise be mistaken for tokens. Tag detection is anchored strictly at
//! the start of the string (or after an unbroken run of escape characters
//! from the start); any other occurrence of the prefix is left untouched.
//!
//! # Example
//!
//! ```
//! use json_graft_tag_codec::{Decoded, PrefixCodec};
//!
//! let codec: PrefixCodec<Vec<String>> = PrefixCodec::new("$ref:", '_');
//!
//! // Payloads become prefixed tokens.
//! let token = codec.encode_payload(&vec!["a".to_string()]).unwrap();
//! assert_eq!(token, "$ref:[\"a\"]");
//! assert_eq!(codec.decode(&token).unwrap(), Decoded::Payload(vec!["a".to_string()]));
//!
//! // Ordinary strings pass through unchanged.
//! assert_eq!(codec.encode_str("hello"), "hello");
//!
//! // A literal that looks like a token gains one escape level and
//! // round-trips back to itself.
//! let escaped = codec.encode_str("$ref:junk");
//! assert_eq!(escaped, "_$ref:junk");
//! assert_eq!(codec.decode(&escaped).unwrap(), Decoded::Literal("$ref:junk".to_string()));
//! ```

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TagCodecError {
    #[error("malformed tagged payload: {0}")]
    Payload(#[source] serde_json::Error),
}

/// Result of decoding one string token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    /// The string was an ordinary (possibly escaped) literal.
    Literal(String),
    /// The string carried a tagged payload.
    Payload(T),
}

/// A prefix/escape codec for one payload type.
///
/// Configured with a non-empty prefix and a single escape character; the
/// payload is written and read as JSON text via serde.
pub struct PrefixCodec<T> {
    prefix: String,
    escape: char,
    _payload: PhantomData<T>,
}

impl<T> PrefixCodec<T> {
    /// Creates a codec. The prefix must be non-empty.
    pub fn new(prefix: &str, escape: char) -> Self {
        debug_assert!(!prefix.is_empty(), "prefix must be non-empty");
        PrefixCodec {
            prefix: prefix.to_string(),
            escape,
            _payload: PhantomData,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn escape(&self) -> char {
        self.escape
    }

    /// Scans for the prefix at the start of the string or after an unbroken
    /// run of escape characters. Returns the escape-run length and the byte
    /// offset of the prefix.
    ///
    /// The prefix check runs before the escape check, so a prefix whose
    /// first character is the escape character is still detected.
    fn find_prefix(&self, s: &str) -> Option<(usize, usize)> {
        let mut run = 0;
        for (at, ch) in s.char_indices() {
            if s[at..].starts_with(&self.prefix) {
                return Some((run, at));
            }
            if ch != self.escape {
                return None;
            }
            run += 1;
        }
        None
    }

    /// Escapes a literal string so it can never be mistaken for a token.
    ///
    /// Strings that neither start with the prefix nor with an escape run
    /// followed by the prefix are returned unchanged.
    pub fn encode_str(&self, s: &str) -> String {
        match self.find_prefix(s) {
            None => s.to_string(),
            Some((run, at)) => {
                let mut out = String::with_capacity(s.len() + self.escape.len_utf8());
                for _ in 0..run + 1 {
                    out.push(self.escape);
                }
                out.push_str(&s[at..]);
                out
            }
        }
    }
}

impl<T: Serialize + DeserializeOwned> PrefixCodec<T> {
    /// Encodes a payload as a prefixed token.
    pub fn encode_payload(&self, payload: &T) -> Result<String, TagCodecError> {
        let text = serde_json::to_string(payload).map_err(TagCodecError::Payload)?;
        let mut out = String::with_capacity(self.prefix.len() + text.len());
        out.push_str(&self.prefix);
        out.push_str(&text);
        Ok(out)
    }

    /// Decodes a string token: a payload if the prefix anchors at the start,
    /// an unescaped literal if it anchors after an escape run, otherwise the
    /// string itself.
    pub fn decode(&self, s: &str) -> Result<Decoded<T>, TagCodecError> {
        match self.find_prefix(s) {
            None => Ok(Decoded::Literal(s.to_string())),
            Some((_, 0)) => {
                let payload =
                    serde_json::from_str(&s[self.prefix.len()..]).map_err(TagCodecError::Payload)?;
                Ok(Decoded::Payload(payload))
            }
            Some((run, at)) => {
                let mut out = String::with_capacity(s.len());
                for _ in 0..run - 1 {
                    out.push(self.escape);
                }
                out.push_str(&s[at..]);
                Ok(Decoded::Literal(out))
            }
        }
    }
}
