//! Dispatch engine that drives a tokenizer session through the registry.

use std::fmt;
use std::io::Read;

use super::core::RuleRegistry;
use super::handler::Element;
use super::location::PathLocation;
use crate::error::Result;
use crate::rule::{Rule, RuleHandler, RuleType};
use crate::source::{Encoding, Session, StartTag, XmlEvent, XmlParserFactory};

/// Per-parse state handed to every handler.
///
/// Holds the current location and the stop flag. Each call to one of the
/// `parse_*` methods owns a fresh traversal, so concurrent parses with one
/// [`XmlParser`] never see each other's position.
#[derive(Debug, Default)]
pub struct Traversal {
    location: PathLocation,
    stopped: bool,
}

impl Traversal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stop the traversal once the current event has been dispatched.
    ///
    /// Handlers still registered for the current event run; no further
    /// event is read. The parse then returns [`ParseOutcome::Stopped`].
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Path of the element being processed, e.g. `/imdb/category`.
    #[must_use]
    pub fn path(&self) -> &str {
        self.location.as_str()
    }

    /// Nesting depth of the element being processed (the root is 1).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.location.depth()
    }

    #[must_use]
    pub fn location(&self) -> &PathLocation {
        &self.location
    }
}

/// How a traversal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The whole document was read.
    Completed,
    /// A handler called [`Traversal::stop`].
    Stopped,
}

impl ParseOutcome {
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, ParseOutcome::Stopped)
    }
}

/// Streaming parser dispatching document events to rules.
///
/// The parser is immutable once built and can be shared between threads
/// (for example in an `Arc`); every parse carries its own [`Traversal`] and
/// the caller's state object.
pub struct XmlParser<S> {
    registry: RuleRegistry<S>,
    factory: XmlParserFactory,
}

impl<S> XmlParser<S> {
    /// Create a parser reading through `factory`.
    ///
    /// # Errors
    /// Returns `NoRules` when `rules` is empty.
    pub fn new(
        factory: &XmlParserFactory,
        rules: impl IntoIterator<Item = Rule<S>>,
    ) -> Result<Self> {
        Ok(Self {
            registry: RuleRegistry::build(rules)?,
            factory: factory.clone(),
        })
    }

    /// Get a reference to the underlying registry.
    #[must_use]
    pub fn registry(&self) -> &RuleRegistry<S> {
        &self.registry
    }

    /// Parse an in-memory document.
    ///
    /// # Errors
    /// Returns `Source` if the document is malformed.
    pub fn parse_str(&self, xml: &str, state: &mut S) -> Result<ParseOutcome> {
        let session = self.factory.open_str(xml)?;
        self.run(session, state)
    }

    /// Parse a document from a byte source, detecting its encoding.
    ///
    /// The reader is consumed only as far as the traversal goes and is not
    /// closed; pass `&mut reader` to keep ownership.
    ///
    /// # Errors
    /// Returns `Source` for read failures and malformed documents.
    pub fn parse_reader<R: Read>(&self, reader: R, state: &mut S) -> Result<ParseOutcome> {
        let session = self.factory.open(reader, None)?;
        self.run(session, state)
    }

    /// Parse a document from a byte source in the given encoding.
    ///
    /// # Errors
    /// Returns `Source` for read failures and malformed documents.
    pub fn parse_reader_with_encoding<R: Read>(
        &self,
        reader: R,
        encoding: Encoding,
        state: &mut S,
    ) -> Result<ParseOutcome> {
        let session = self.factory.open(reader, Some(encoding))?;
        self.run(session, state)
    }

    /// Drive an already opened session to the end of its document.
    ///
    /// # Errors
    /// Returns `Source` for read failures and malformed documents.
    pub fn parse_session<R: Read>(&self, session: Session<R>, state: &mut S) -> Result<ParseOutcome> {
        self.run(session, state)
    }

    fn run<R: Read>(&self, mut session: Session<R>, state: &mut S) -> Result<ParseOutcome> {
        let mut traversal = Traversal::new();
        let mut events: u64 = 0;

        tracing::debug!(encoding = %session.encoding(), rules = self.registry.len(), "Starting traversal");

        let outcome = loop {
            match session.next_event()? {
                XmlEvent::StartElement(tag) => self.start_element(tag, state, &mut traversal),
                XmlEvent::Characters(text) => self.characters(text, state, &mut traversal),
                XmlEvent::EndElement => self.end_element(state, &mut traversal),
                XmlEvent::EndOfDocument => break ParseOutcome::Completed,
            }
            events += 1;

            if traversal.stopped {
                break ParseOutcome::Stopped;
            }
        };

        tracing::debug!(?outcome, events, "Traversal finished");
        Ok(outcome)
    }

    fn start_element(&self, tag: &StartTag, state: &mut S, traversal: &mut Traversal) {
        traversal.location.push(tag.local_name(), tag.namespace());

        let rules = self.registry.lookup(RuleType::Element, &traversal.location);
        if !rules.is_empty() {
            tracing::trace!(path = traversal.path(), rules = rules.len(), "Element start");
        }
        for rule in rules {
            if let RuleHandler::Element(handler) = rule.handler() {
                handler.handle(Element::Start, state, traversal);
            }
        }

        let rules = self.registry.lookup(RuleType::Attribute, &traversal.location);
        if !rules.is_empty() {
            tracing::trace!(path = traversal.path(), rules = rules.len(), "Attributes");
        }
        for rule in rules {
            if let RuleHandler::Attribute(handler, names) = rule.handler() {
                for name in names {
                    let value = tag.attribute(name.namespace(), name.local_name());
                    handler.handle(name.local_name(), value, state, traversal);
                }
            }
        }
    }

    fn characters(&self, text: &str, state: &mut S, traversal: &mut Traversal) {
        let rules = self.registry.lookup(RuleType::Characters, &traversal.location);
        if rules.is_empty() {
            return;
        }
        tracing::trace!(path = traversal.path(), rules = rules.len(), "Characters");

        let text = text.trim();
        for rule in rules {
            if let RuleHandler::Characters(handler) = rule.handler() {
                handler.handle(text, state, traversal);
            }
        }
    }

    fn end_element(&self, state: &mut S, traversal: &mut Traversal) {
        let rules = self.registry.lookup(RuleType::Element, &traversal.location);
        if !rules.is_empty() {
            tracing::trace!(path = traversal.path(), rules = rules.len(), "Element end");
        }
        for rule in rules {
            if let RuleHandler::Element(handler) = rule.handler() {
                handler.handle(Element::End, state, traversal);
            }
        }

        traversal.location.pop();
    }
}

impl<S> fmt::Debug for XmlParser<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlParser")
            .field("registry", &self.registry)
            .field("config", self.factory.config())
            .finish()
    }
}
