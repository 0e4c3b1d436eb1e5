//! Pull tokenizer turning a byte stream into document events.
//!
//! A [`Session`] reads one document and hands out one [`XmlEvent`] per call:
//! start tags with namespace-resolved names and attributes, coalesced
//! character data, end tags and finally the end of the document.
//!
//! Text, entity references and CDATA sections that follow each other are
//! merged into a single characters event. Comments, processing instructions
//! and the document type declaration produce no events; a comment or
//! processing instruction inside text ends the current text run.

use std::io::{self, BufReader, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use super::encoding::{utf8_input, Encoding, Utf8Input};
use super::entities::{normalize_attribute, push_text, Entities};
use crate::config::SourceConfig;
use crate::error::SourceError;

/// Namespace bound to the `xml` prefix in every document.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

type SourceResult<T> = std::result::Result<T, SourceError>;

/// Attribute of a start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    local_name: String,
    namespace: Option<String>,
    value: String,
}

impl Attribute {
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Namespace URI, `None` for unprefixed attributes.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Value with references decoded and whitespace normalized.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Start tag of an element.
///
/// Namespace declarations (`xmlns`, `xmlns:*`) are applied while reading the
/// tag and are not listed among the attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartTag {
    local_name: String,
    namespace: Option<String>,
    attributes: Vec<Attribute>,
}

impl StartTag {
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Namespace URI of the element, `None` when it is in no namespace.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Value of the attribute with the given name.
    ///
    /// Without a namespace the first attribute with `local_name` matches,
    /// whatever its namespace.
    #[must_use]
    pub fn attribute(&self, namespace: Option<&str>, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| {
                a.local_name == local_name
                    && (namespace.is_none() || a.namespace.as_deref() == namespace)
            })
            .map(|a| a.value.as_str())
    }
}

/// One step through a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEvent<'a> {
    StartElement(&'a StartTag),
    /// A complete text run, exactly as decoded (not trimmed).
    Characters(&'a str),
    EndElement,
    /// Returned once the document is complete, and for every call after that.
    EndOfDocument,
}

/// What a run of reader events amounted to.
enum Step {
    Start,
    End,
    Eof,
    /// Markup that ends a text run without producing an event.
    Break,
}

fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn source_io(err: io::Error, offset: u64) -> SourceError {
    if err.kind() == io::ErrorKind::InvalidData {
        SourceError::encoding(err.to_string(), offset)
    } else {
        SourceError::Io(err)
    }
}

fn reader_error(err: quick_xml::Error, offset: u64) -> SourceError {
    match err {
        quick_xml::Error::Io(err) => source_io(io::Error::new(err.kind(), err.to_string()), offset),
        other => SourceError::syntax(other.to_string(), offset),
    }
}

fn utf8<'a>(bytes: &'a [u8], offset: u64, what: &str) -> SourceResult<&'a str> {
    std::str::from_utf8(bytes).map_err(|e| {
        SourceError::encoding(
            format!("Invalid UTF-8 in {what}"),
            offset + e.valid_up_to() as u64,
        )
    })
}

/// Namespace URI of a resolved name; an empty URI means no namespace.
fn namespace_uri(resolved: ResolveResult<'_>, offset: u64) -> SourceResult<Option<String>> {
    match resolved {
        ResolveResult::Bound(ns) if ns.as_ref().is_empty() => Ok(None),
        ResolveResult::Bound(ns) => Ok(Some(utf8(ns.as_ref(), offset, "namespace name")?.to_string())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(SourceError::syntax(
            format!(
                "Unbound namespace prefix '{}'",
                String::from_utf8_lossy(&prefix)
            ),
            offset,
        )),
    }
}

/// Tokenizer session over one document.
///
/// Sessions are created by [`XmlParserFactory`](crate::XmlParserFactory).
/// The byte source is borrowed or owned as the caller decides, and is never
/// closed by the session.
pub struct Session<R: Read> {
    reader: NsReader<BufReader<Utf8Input<R>>>,
    encoding: Encoding,
    max_depth: usize,
    buf: Vec<u8>,
    entities: Entities,
    /// Qualified names of the open elements.
    open: Vec<String>,
    current: StartTag,
    text: String,
    text_delivered: bool,
    pending: Option<Step>,
    seen_root: bool,
    finished: bool,
}

impl<R: Read> Session<R> {
    pub(crate) fn open(
        reader: R,
        encoding: Option<Encoding>,
        config: &SourceConfig,
    ) -> SourceResult<Self> {
        let (input, encoding) = utf8_input(reader, encoding).map_err(|e| source_io(e, 0))?;

        let mut reader = NsReader::from_reader(BufReader::with_capacity(config.buffer_size(), input));
        let settings = reader.config_mut();
        settings.trim_text(false);
        settings.expand_empty_elements = true;
        // End tags are matched here so the errors name both tags.
        settings.check_end_names = false;
        settings.allow_unmatched_ends = true;

        Ok(Self {
            reader,
            encoding,
            max_depth: config.max_depth(),
            buf: Vec::new(),
            entities: Entities::default(),
            open: Vec::new(),
            current: StartTag::default(),
            text: String::new(),
            text_delivered: false,
            pending: None,
            seen_root: false,
            finished: false,
        })
    }

    /// Encoding the document is read in.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Offset of the tokenizer in the UTF-8 form of the document.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.reader.buffer_position()
    }

    /// Read the next event.
    ///
    /// # Errors
    /// Returns a `SourceError` for I/O failures, malformed input and
    /// documents nested deeper than the configured limit. The session must
    /// not be used after an error.
    pub fn next_event(&mut self) -> SourceResult<XmlEvent<'_>> {
        if self.text_delivered {
            self.text.clear();
            self.text_delivered = false;
        }

        loop {
            if self.finished {
                return Ok(XmlEvent::EndOfDocument);
            }
            let step = match self.pending.take() {
                Some(step) => step,
                None => self.read_step()?,
            };

            // Text collected so far is complete: deliver it first.
            if !self.text.is_empty() {
                if !matches!(step, Step::Break) {
                    self.pending = Some(step);
                }
                self.text_delivered = true;
                return Ok(XmlEvent::Characters(&self.text));
            }

            match step {
                Step::Start => return Ok(XmlEvent::StartElement(&self.current)),
                Step::End => return Ok(XmlEvent::EndElement),
                Step::Eof => {
                    self.finished = true;
                    return Ok(XmlEvent::EndOfDocument);
                }
                Step::Break => {}
            }
        }
    }

    /// Read reader events until one of them ends the current text run.
    fn read_step(&mut self) -> SourceResult<Step> {
        let mut buf = std::mem::take(&mut self.buf);
        let step = loop {
            buf.clear();
            let offset = self.reader.buffer_position();
            let event = match self.reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(err) => break Err(reader_error(err, self.reader.error_position())),
            };
            if let Some(step) = self.apply(event, offset).transpose() {
                break step;
            }
        };
        self.buf = buf;
        step
    }

    fn apply(&mut self, event: Event<'_>, offset: u64) -> SourceResult<Option<Step>> {
        match event {
            Event::Start(start) => {
                self.start_element(&start, offset)?;
                Ok(Some(Step::Start))
            }
            Event::End(end) => {
                let name = utf8(end.name().into_inner(), offset + 2, "end tag")?;
                match self.open.pop() {
                    Some(open) if open == name => Ok(Some(Step::End)),
                    Some(open) => Err(SourceError::syntax(
                        format!("Mismatched end tag: expected </{open}>, found </{name}>"),
                        offset,
                    )),
                    None => Err(SourceError::syntax(
                        format!("Unexpected end tag </{name}>"),
                        offset,
                    )),
                }
            }
            Event::Text(text) => {
                let raw = utf8(&text, offset, "text content")?;
                if self.open.is_empty() {
                    if raw.chars().all(is_xml_whitespace) {
                        return Ok(None);
                    }
                    return Err(SourceError::syntax(
                        "Text content outside the root element",
                        offset,
                    ));
                }
                let decoded = self
                    .entities
                    .unescape(raw)
                    .map_err(|e| SourceError::syntax(e.to_string(), offset))?;
                push_text(&mut self.text, &decoded);
                Ok(None)
            }
            Event::CData(cdata) => {
                self.require_root("CDATA section", offset)?;
                let raw = utf8(&cdata, offset + 9, "CDATA section")?;
                push_text(&mut self.text, raw);
                Ok(None)
            }
            Event::GeneralRef(reference) => {
                self.require_root("Entity reference", offset)?;
                let name = utf8(&reference, offset + 1, "entity reference")?;
                let reference = format!("&{name};");
                let value = self
                    .entities
                    .unescape(&reference)
                    .map_err(|e| SourceError::syntax(e.to_string(), offset))?;
                push_text(&mut self.text, &value);
                Ok(None)
            }
            Event::DocType(doctype) => {
                if self.seen_root {
                    return Err(SourceError::syntax(
                        "Document type declaration after the root element",
                        offset,
                    ));
                }
                let content = utf8(&doctype, offset, "document type declaration")?;
                self.entities
                    .declare(content)
                    .map_err(|reason| SourceError::syntax(reason, offset))?;
                Ok(None)
            }
            Event::Eof => {
                if let Some(open) = self.open.last() {
                    return Err(SourceError::syntax(
                        format!("Unexpected end of document, <{open}> is not closed"),
                        offset,
                    ));
                }
                if !self.seen_root {
                    return Err(SourceError::syntax("Document has no root element", offset));
                }
                Ok(Some(Step::Eof))
            }
            // Declaration, comments and processing instructions.
            _ => Ok((!self.text.is_empty()).then_some(Step::Break)),
        }
    }

    fn require_root(&self, what: &str, offset: u64) -> SourceResult<()> {
        if self.open.is_empty() {
            return Err(SourceError::syntax(
                format!("{what} outside the root element"),
                offset,
            ));
        }
        Ok(())
    }

    fn start_element(&mut self, start: &BytesStart<'_>, offset: u64) -> SourceResult<()> {
        if self.open.is_empty() && self.seen_root {
            return Err(SourceError::syntax(
                "Document has more than one root element",
                offset,
            ));
        }
        if self.open.len() >= self.max_depth {
            return Err(SourceError::DepthExceeded {
                limit: self.max_depth,
                offset,
            });
        }

        let qname = utf8(start.name().into_inner(), offset + 1, "start tag")?.to_string();
        let (resolved, local) = self.reader.resolve_element(start.name());
        let namespace = namespace_uri(resolved, offset)?;
        let local_name = utf8(local.into_inner(), offset + 1, "start tag")?;

        let mut attributes: Vec<Attribute> = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| {
                SourceError::syntax(format!("{e} in start tag <{qname}>"), offset)
            })?;
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }

            let (resolved, local) = self.reader.resolve_attribute(attr.key);
            let namespace = namespace_uri(resolved, offset)?;
            let local = utf8(local.into_inner(), offset, "attribute name")?;
            if attributes
                .iter()
                .any(|a| a.local_name == local && a.namespace == namespace)
            {
                return Err(SourceError::syntax(
                    format!("Duplicate attribute '{local}' in start tag <{qname}>"),
                    offset,
                ));
            }

            let raw = utf8(&attr.value, offset, "attribute value")?;
            let value = self
                .entities
                .unescape(&normalize_attribute(raw))
                .map_err(|e| SourceError::syntax(format!("Attribute '{local}': {e}"), offset))?
                .into_owned();
            attributes.push(Attribute {
                local_name: local.to_string(),
                namespace,
                value,
            });
        }

        self.current.local_name.clear();
        self.current.local_name.push_str(local_name);
        self.current.namespace = namespace;
        self.current.attributes = attributes;

        self.open.push(qname);
        self.seen_root = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, PartialEq)]
    enum Ev {
        Start(String, Option<String>),
        Text(String),
        End,
    }

    fn start(name: &str) -> Ev {
        Ev::Start(name.to_string(), None)
    }

    fn start_ns(name: &str, ns: &str) -> Ev {
        Ev::Start(name.to_string(), Some(ns.to_string()))
    }

    fn text(text: &str) -> Ev {
        Ev::Text(text.to_string())
    }

    fn session<'a>(xml: &'a str, config: &SourceConfig) -> Session<&'a [u8]> {
        Session::open(xml.as_bytes(), None, config).unwrap()
    }

    fn events_with(xml: &str, config: &SourceConfig) -> Vec<Ev> {
        let mut session = session(xml, config);
        let mut events = Vec::new();
        loop {
            match session.next_event().unwrap() {
                XmlEvent::StartElement(tag) => events.push(Ev::Start(
                    tag.local_name().to_string(),
                    tag.namespace().map(str::to_string),
                )),
                XmlEvent::Characters(t) => events.push(Ev::Text(t.to_string())),
                XmlEvent::EndElement => events.push(Ev::End),
                XmlEvent::EndOfDocument => break,
            }
        }
        events
    }

    fn events(xml: &str) -> Vec<Ev> {
        events_with(xml, &SourceConfig::default())
    }

    fn error(xml: &str) -> SourceError {
        let mut session = session(xml, &SourceConfig::default());
        loop {
            match session.next_event() {
                Ok(XmlEvent::EndOfDocument) => panic!("expected an error for {xml:?}"),
                Ok(_) => {}
                Err(e) => return e,
            }
        }
    }

    fn first_tag(xml: &str) -> StartTag {
        let mut session = session(xml, &SourceConfig::default());
        loop {
            if let XmlEvent::StartElement(tag) = session.next_event().unwrap() {
                return tag.clone();
            }
        }
    }

    #[test]
    fn test_basic_document() {
        assert_eq!(
            events("<a>\n  <b>x</b>\n  <c/>\n</a>\n"),
            vec![
                start("a"),
                text("\n  "),
                start("b"),
                text("x"),
                Ev::End,
                text("\n  "),
                start("c"),
                Ev::End,
                text("\n"),
                Ev::End,
            ]
        );
    }

    #[test]
    fn test_text_entities_and_cdata_coalesce() {
        assert_eq!(
            events("<a>x &amp; <![CDATA[<y> & ]]>z&#33;</a>"),
            vec![start("a"), text("x & <y> & z!"), Ev::End]
        );
        assert_eq!(
            events("<a><![CDATA[one]]><![CDATA[two]]></a>"),
            vec![start("a"), text("onetwo"), Ev::End]
        );
    }

    #[test]
    fn test_comment_ends_text_run() {
        assert_eq!(
            events("<a>x<!-- note -->y<?pi data?>z</a>"),
            vec![start("a"), text("x"), text("y"), text("z"), Ev::End]
        );
    }

    #[test]
    fn test_prolog_is_skipped() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE a [
  <!ENTITY e "x">
  <!ELEMENT a (#PCDATA)>
]>
<!-- leading comment -->
<a/>
<!-- trailing comment -->
"#;
        assert_eq!(events(xml), vec![start("a"), Ev::End]);
    }

    #[test]
    fn test_namespaces() {
        let xml = r#"<feed xmlns="urn:atom" xmlns:x="urn:x">
<x:entry><title/></x:entry><plain xmlns=""><inner/></plain></feed>"#;
        assert_eq!(
            events(xml),
            vec![
                start_ns("feed", "urn:atom"),
                text("\n"),
                start_ns("entry", "urn:x"),
                start_ns("title", "urn:atom"),
                Ev::End,
                Ev::End,
                start("plain"),
                start("inner"),
                Ev::End,
                Ev::End,
                Ev::End,
            ]
        );
    }

    #[test]
    fn test_prefix_scope_ends_with_element() {
        let err = error(r#"<a><b xmlns:p="urn:p"><p:c/></b><p:d/></a>"#);
        assert!(err.to_string().contains("Unbound namespace prefix 'p'"), "{err}");
    }

    #[test]
    fn test_attributes() {
        let tag = first_tag(
            r#"<movie xmlns:l="http://www.w3.org/1999/xlink" id = '1234' l:href="a &amp; b" title="T2
 Judgment" xml:lang="en">"#,
        );
        assert_eq!(tag.local_name(), "movie");
        assert_eq!(tag.attributes().len(), 4);
        assert_eq!(tag.attribute(None, "id"), Some("1234"));
        assert_eq!(
            tag.attribute(Some("http://www.w3.org/1999/xlink"), "href"),
            Some("a & b")
        );
        assert_eq!(tag.attribute(None, "href"), Some("a & b"));
        assert_eq!(tag.attribute(Some("urn:other"), "href"), None);
        assert_eq!(tag.attribute(None, "title"), Some("T2  Judgment"));
        assert_eq!(tag.attribute(Some(XML_NAMESPACE), "lang"), Some("en"));
        assert_eq!(tag.attribute(None, "xmlns"), None);
        assert_eq!(tag.attribute(None, "l"), None);
    }

    #[test]
    fn test_greater_than_inside_attribute_value() {
        let tag = first_tag(r#"<a expr="x > y"/>"#);
        assert_eq!(tag.attribute(None, "expr"), Some("x > y"));
    }

    #[test]
    fn test_tiny_buffer() {
        let config = SourceConfig::new().with_buffer_size(1).unwrap();
        assert_eq!(
            events_with(r#"<root attr="value"><child>some longer text</child></root>"#, &config),
            vec![start("root"), start("child"), text("some longer text"), Ev::End, Ev::End]
        );
    }

    #[test]
    fn test_end_of_document_repeats() {
        let mut session = session("<a/>", &SourceConfig::default());
        assert!(matches!(session.next_event().unwrap(), XmlEvent::StartElement(_)));
        assert_eq!(session.next_event().unwrap(), XmlEvent::EndElement);
        assert_eq!(session.next_event().unwrap(), XmlEvent::EndOfDocument);
        assert_eq!(session.next_event().unwrap(), XmlEvent::EndOfDocument);
    }

    #[test]
    fn test_malformed_documents() {
        let cases = [
            ("<a><b></a>", "Mismatched end tag"),
            ("<a><b>", "not closed"),
            ("", "no root element"),
            ("text<a/>", "outside the root"),
            ("<a/><b/>", "more than one root"),
            ("<a></a></b>", "Unexpected end tag"),
        ];
        for (xml, expected) in cases {
            let err = error(xml);
            assert!(
                matches!(err, SourceError::Syntax { .. }),
                "{xml:?} gave {err:?}"
            );
            assert!(
                err.to_string().contains(expected),
                "{xml:?} gave '{err}', expected '{expected}'"
            );
        }

        for xml in [r#"<a x="1" x="2"/>"#, "<a x=1/>", "<a><!-- open", "<a"] {
            let err = error(xml);
            assert!(
                matches!(err, SourceError::Syntax { .. }),
                "{xml:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_declared_entities_expand() {
        assert_eq!(
            events(r#"<!DOCTYPE a [<!ENTITY e "expanded">]><a>&e;</a>"#),
            vec![start("a"), text("expanded"), Ev::End]
        );

        let xml = r#"<!DOCTYPE a [
  <!ENTITY co "ACME">
  <!ENTITY name "&co; Corp">
]><a by="&name;">&lt;&name;&gt;</a>"#;
        assert_eq!(events(xml), vec![start("a"), text("<ACME Corp>"), Ev::End]);
        assert_eq!(first_tag(xml).attribute(None, "by"), Some("ACME Corp"));
    }

    #[test]
    fn test_bracket_inside_entity_value() {
        assert_eq!(
            events(r#"<!DOCTYPE a [<!ENTITY e "]">]><a>x</a>"#),
            vec![start("a"), text("x"), Ev::End]
        );
    }

    #[test]
    fn test_unresolvable_references_fail() {
        for xml in [
            "<a>fish & chips &nbsp;</a>",
            "<a>&nbsp;</a>",
            r#"<a x="&undeclared;"/>"#,
        ] {
            let err = error(xml);
            assert!(
                matches!(err, SourceError::Syntax { .. }),
                "{xml:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_error_offset_points_at_markup() {
        let err = error("<a><b></c></a>");
        assert_eq!(err.offset(), Some(6));
    }

    #[test]
    fn test_depth_limit() {
        let config = SourceConfig::new().with_max_depth(2).unwrap();
        assert_eq!(events_with("<a><b/></a>", &config).len(), 4);

        let mut session = session("<a><b><c/></b></a>", &config);
        let err = loop {
            match session.next_event() {
                Ok(_) => {}
                Err(e) => break e,
            }
        };
        assert!(matches!(err, SourceError::DepthExceeded { limit: 2, .. }));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut session =
            Session::open(&b"<a>\xFF</a>"[..], Some(Encoding::utf_8()), &SourceConfig::default())
                .unwrap();
        assert!(matches!(session.next_event().unwrap(), XmlEvent::StartElement(_)));
        let err = session.next_event().unwrap_err();
        assert!(matches!(err, SourceError::Encoding { offset: 3, .. }), "{err:?}");
    }

    #[test]
    fn test_utf16_document() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<a>é</a>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let mut session = Session::open(&bytes[..], None, &SourceConfig::default()).unwrap();
        assert_eq!(session.encoding(), Encoding::utf_16le());
        assert!(matches!(session.next_event().unwrap(), XmlEvent::StartElement(_)));
        assert_eq!(session.next_event().unwrap(), XmlEvent::Characters("é"));
    }
}
