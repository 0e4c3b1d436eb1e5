//! XML source adapter.
//!
//! This module turns byte sources into tokenizer [`Session`]s for the
//! dispatch engine:
//!
//! - `encoding`: encoding detection and transcoding to UTF-8
//! - `entities`: entity declarations and reference resolution
//! - `tokenizer`: the pull tokenizer over `quick_xml::NsReader`
//!
//! [`XmlParserFactory`] is the entry point. It holds the tokenizer
//! configuration, shares it with every session it opens, and builds
//! [`XmlParser`]s that read through it.

mod encoding;
mod entities;
mod tokenizer;

use std::io::Read;
use std::sync::Arc;

pub use encoding::Encoding;
pub use tokenizer::{Attribute, Session, StartTag, XmlEvent, XML_NAMESPACE};

use crate::config::SourceConfig;
use crate::error::Result;
use crate::registry::XmlParser;
use crate::rule::Rule;

/// Creates tokenizer sessions and parsers sharing one configuration.
///
/// Cloning is cheap; clones share the configuration.
///
/// # Examples
/// ```
/// use xmlroute::{Rule, Traversal, XmlParserFactory};
///
/// let factory = XmlParserFactory::new();
/// let parser = factory
///     .new_parser([Rule::characters("/greeting", |text: &str, out: &mut String, _: &mut Traversal| {
///         out.push_str(text);
///     })
///     .unwrap()])
///     .unwrap();
///
/// let mut greeting = String::new();
/// parser.parse_str("<greeting> hello </greeting>", &mut greeting).unwrap();
/// assert_eq!(greeting, "hello");
/// ```
#[derive(Debug, Clone, Default)]
pub struct XmlParserFactory {
    config: Arc<SourceConfig>,
}

impl XmlParserFactory {
    /// Factory with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: SourceConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Factory configured from the environment, see [`SourceConfig::from_env`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_config(SourceConfig::from_env())
    }

    #[must_use]
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Open a tokenizer session over `reader`.
    ///
    /// Without an explicit `encoding` the encoding is detected from the
    /// first bytes. The reader is not closed when the session ends; pass
    /// `&mut reader` to keep using it afterwards.
    ///
    /// # Errors
    /// Returns `Source` if the first bytes cannot be read or the XML
    /// declaration names an unknown encoding.
    pub fn open<R: Read>(&self, reader: R, encoding: Option<Encoding>) -> Result<Session<R>> {
        let session = Session::open(reader, encoding, &self.config)?;
        tracing::trace!(encoding = %session.encoding(), "Opened tokenizer session");
        Ok(session)
    }

    /// Open a tokenizer session over an in-memory document.
    ///
    /// # Errors
    /// Never fails in practice; the signature matches [`Self::open`].
    pub fn open_str<'a>(&self, xml: &'a str) -> Result<Session<&'a [u8]>> {
        self.open(xml.as_bytes(), Some(Encoding::utf_8()))
    }

    /// Build a parser dispatching to `rules`, reading through this factory.
    ///
    /// # Errors
    /// Returns `NoRules` when `rules` is empty.
    pub fn new_parser<S>(&self, rules: impl IntoIterator<Item = Rule<S>>) -> Result<XmlParser<S>> {
        XmlParser::new(self, rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_config() {
        let config = SourceConfig::new().with_max_depth(7).unwrap();
        let factory = XmlParserFactory::with_config(config);
        let clone = factory.clone();

        assert!(Arc::ptr_eq(&factory.config, &clone.config));
        assert_eq!(clone.config().max_depth(), 7);
    }

    #[test]
    fn test_open_borrows_the_caller_reader() {
        let mut input: &[u8] = b"<a/>";
        {
            let mut session = XmlParserFactory::new().open(&mut input, None).unwrap();
            while session.next_event().unwrap() != XmlEvent::EndOfDocument {}
        }
        assert!(input.is_empty());
    }

    #[test]
    fn test_open_str() {
        let factory = XmlParserFactory::new();
        let mut session = factory.open_str("<a>x</a>").unwrap();
        assert_eq!(session.encoding(), Encoding::utf_8());
        assert!(matches!(session.next_event().unwrap(), XmlEvent::StartElement(t) if t.local_name() == "a"));
        assert_eq!(session.next_event().unwrap(), XmlEvent::Characters("x"));
    }
}
