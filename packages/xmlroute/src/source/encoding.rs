//! Input encodings.
//!
//! The tokenizer only ever reads UTF-8. A session decides on the encoding of
//! the raw bytes (caller hint, byte order mark, UTF-16 without a mark, then
//! the `encoding` of the XML declaration) and transcodes anything else to
//! UTF-8 in front of the tokenizer.

use std::fmt;
use std::io::{self, Chain, Cursor, Read};
use std::str::FromStr;

use encoding_rs_io::{DecodeReaderBytes, DecodeReaderBytesBuilder};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Longest prolog inspected for an XML declaration.
const PROLOG_LIMIT: usize = 1024;

/// Character encoding of an input document.
///
/// Any label from the WHATWG Encoding Standard is accepted, e.g. `utf-8`,
/// `utf-16le`, `iso-8859-1` or `shift_jis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding(&'static encoding_rs::Encoding);

impl Encoding {
    #[must_use]
    pub fn utf_8() -> Self {
        Self(encoding_rs::UTF_8)
    }

    #[must_use]
    pub fn utf_16le() -> Self {
        Self(encoding_rs::UTF_16LE)
    }

    #[must_use]
    pub fn utf_16be() -> Self {
        Self(encoding_rs::UTF_16BE)
    }

    /// ISO-8859-1, decoded as its windows-1252 superset.
    #[must_use]
    pub fn latin1() -> Self {
        Self(encoding_rs::WINDOWS_1252)
    }

    /// Look up an encoding by label, ignoring case and surrounding whitespace.
    ///
    /// # Examples
    /// ```
    /// use xmlroute::Encoding;
    ///
    /// assert_eq!(Encoding::for_label("UTF-16LE"), Some(Encoding::utf_16le()));
    /// assert_eq!(Encoding::for_label("latin1"), Some(Encoding::latin1()));
    /// assert_eq!(Encoding::for_label("ebcdic"), None);
    /// ```
    #[must_use]
    pub fn for_label(label: &str) -> Option<Self> {
        encoding_rs::Encoding::for_label_no_replacement(label.trim().as_bytes()).map(Self)
    }

    /// Canonical name, e.g. `UTF-8` or `windows-1252`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    fn is_utf16(self) -> bool {
        self.0 == encoding_rs::UTF_16LE || self.0 == encoding_rs::UTF_16BE
    }
}

impl Default for Encoding {
    fn default() -> Self {
        Self::utf_8()
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::for_label(s).ok_or_else(|| format!("Unknown encoding '{s}'"))
    }
}

/// Input bytes as handed to the tokenizer: the inspected prolog followed by
/// the rest of the source, transcoded to UTF-8.
pub(crate) type Utf8Input<R> = DecodeReaderBytes<Chain<Cursor<Vec<u8>>, R>, Vec<u8>>;

/// Wrap `source` so that it yields UTF-8, and report the encoding used.
///
/// UTF-8 input is passed through unchecked; the tokenizer validates it.
/// A byte order mark is removed.
///
/// # Errors
/// Read failures, and `InvalidData` when the XML declaration names an
/// unknown encoding.
pub(crate) fn utf8_input<R: Read>(
    mut source: R,
    hint: Option<Encoding>,
) -> io::Result<(Utf8Input<R>, Encoding)> {
    let mut prolog = read_prolog(&mut source)?;

    let bom = encoding_rs::Encoding::for_bom(&prolog);
    if let Some((_, len)) = bom {
        prolog.drain(..len);
    }

    let encoding = match (hint, bom) {
        (Some(hint), _) => hint,
        (None, Some((encoding, _))) => Encoding(encoding),
        (None, None) => sniff(&prolog)?,
    };

    let input = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding.0))
        .utf8_passthru(true)
        .bom_sniffing(false)
        .build(Cursor::new(prolog).chain(source));

    Ok((input, encoding))
}

/// Read until the encoding can be decided: past the XML declaration if the
/// document starts with one, otherwise a few bytes.
fn read_prolog<R: Read>(source: &mut R) -> io::Result<Vec<u8>> {
    let mut prolog = Vec::new();
    let mut chunk = [0u8; 256];

    while prolog.len() < PROLOG_LIMIT && !prolog_complete(&prolog) {
        match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => prolog.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(prolog)
}

fn prolog_complete(prolog: &[u8]) -> bool {
    let text = prolog.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(prolog);
    if text.len() < 5 {
        return false;
    }
    !text.starts_with(b"<?xml") || text.windows(2).any(|w| w == b"?>")
}

/// Encoding of input without a byte order mark.
fn sniff(prolog: &[u8]) -> io::Result<Encoding> {
    if prolog.starts_with(b"<\0") {
        return Ok(Encoding::utf_16le());
    }
    if prolog.starts_with(b"\0<") {
        return Ok(Encoding::utf_16be());
    }
    Ok(declared_encoding(prolog)?.unwrap_or_default())
}

/// The `encoding` pseudo-attribute of the XML declaration, if any.
fn declared_encoding(prolog: &[u8]) -> io::Result<Option<Encoding>> {
    let mut reader = Reader::from_reader(prolog);
    let mut buf = Vec::new();
    let Ok(Event::Decl(decl)) = reader.read_event_into(&mut buf) else {
        return Ok(None);
    };
    let Some(Ok(label)) = decl.encoding() else {
        return Ok(None);
    };

    let label = String::from_utf8_lossy(&label);
    match Encoding::for_label(&label) {
        // The declaration was readable as ASCII, so the bytes are not UTF-16.
        Some(encoding) if encoding.is_utf16() => Ok(None),
        Some(encoding) => Ok(Some(encoding)),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Unsupported encoding '{label}' in the XML declaration"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8], hint: Option<Encoding>) -> (String, Encoding) {
        let (mut input, encoding) = utf8_input(bytes, hint).unwrap();
        let mut text = String::new();
        input.read_to_string(&mut text).unwrap();
        (text, encoding)
    }

    fn utf16(text: &str, big_endian: bool) -> Vec<u8> {
        text.encode_utf16()
            .flat_map(|unit| {
                if big_endian {
                    unit.to_be_bytes()
                } else {
                    unit.to_le_bytes()
                }
            })
            .collect()
    }

    #[test]
    fn test_labels() {
        assert_eq!("utf8".parse::<Encoding>().unwrap(), Encoding::utf_8());
        assert_eq!(" ISO-8859-1 ".parse::<Encoding>().unwrap(), Encoding::latin1());
        assert_eq!(Encoding::utf_16be().to_string(), "UTF-16BE");
        assert_eq!(
            "ebcdic".parse::<Encoding>().unwrap_err(),
            "Unknown encoding 'ebcdic'"
        );
    }

    #[test]
    fn test_plain_utf8_passes_through() {
        let (text, encoding) = decode(b"<a>caf\xC3\xA9</a>", None);
        assert_eq!(text, "<a>caf\u{e9}</a>");
        assert_eq!(encoding, Encoding::utf_8());
    }

    #[test]
    fn test_utf8_bom_is_removed() {
        let (text, encoding) = decode(b"\xEF\xBB\xBF<a/>", None);
        assert_eq!(text, "<a/>");
        assert_eq!(encoding, Encoding::utf_8());
    }

    #[test]
    fn test_utf16_with_and_without_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(utf16("<a>\u{65e5}</a>", false));
        assert_eq!(decode(&bytes, None), ("<a>\u{65e5}</a>".to_string(), Encoding::utf_16le()));

        let bytes = utf16("<a/>", true);
        assert_eq!(decode(&bytes, None), ("<a/>".to_string(), Encoding::utf_16be()));
    }

    #[test]
    fn test_declared_encoding_is_honored() {
        let xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>caf\xE9</a>";
        let (text, encoding) = decode(xml, None);
        assert_eq!(encoding, Encoding::latin1());
        assert!(text.ends_with("<a>caf\u{e9}</a>"), "{text}");
    }

    #[test]
    fn test_declared_utf16_over_ascii_bytes_is_ignored() {
        let (text, encoding) = decode(b"<?xml version='1.0' encoding='UTF-16'?><a/>", None);
        assert_eq!(encoding, Encoding::utf_8());
        assert!(text.ends_with("<a/>"));
    }

    #[test]
    fn test_unknown_declared_encoding() {
        let err = utf8_input(&b"<?xml version=\"1.0\" encoding=\"x-klingon\"?><a/>"[..], None)
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("x-klingon"));
    }

    #[test]
    fn test_hint_wins_over_declaration() {
        let xml = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><a>\xE9</a>";
        let (text, encoding) = decode(xml, Some(Encoding::latin1()));
        assert_eq!(encoding, Encoding::latin1());
        assert!(text.ends_with("<a>\u{e9}</a>"));
    }

    #[test]
    fn test_long_prolog_is_not_lost() {
        let mut xml = b"<?xml version=\"1.0\"?><a>".to_vec();
        xml.extend(std::iter::repeat(b'x').take(5000));
        xml.extend_from_slice(b"</a>");

        let (text, _) = decode(&xml, None);
        assert_eq!(text.len(), xml.len());
    }
}
