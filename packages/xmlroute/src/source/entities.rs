//! Entity resolution and whitespace normalization.
//!
//! References resolve to the predefined entities, to character references,
//! or to general entities declared in the internal subset of the document
//! type declaration. Anything else is an error. An entity's replacement text
//! is inserted as character data; markup inside it is not parsed.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

use quick_xml::escape::{resolve_predefined_entity, unescape_with, EscapeError};
use regex::Regex;

/// Internal general entity declaration with a quoted literal value.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ENTITY_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<!ENTITY\s+([^\s%"'<>]+)\s+(?:"([^"]*)"|'([^']*)')\s*>"#).expect("valid regex")
});

/// General entities known to a session.
#[derive(Debug, Default)]
pub(crate) struct Entities {
    declared: HashMap<String, String>,
}

impl Entities {
    /// Record the internal entities of a document type declaration.
    ///
    /// The first declaration of a name is binding. Values may refer to
    /// entities declared before them.
    ///
    /// # Errors
    /// Returns a reason when a value contains an unresolvable reference.
    pub(crate) fn declare(&mut self, doctype: &str) -> Result<(), String> {
        for decl in ENTITY_DECL.captures_iter(doctype) {
            let name = &decl[1];
            if self.declared.contains_key(name) {
                continue;
            }
            let raw = decl.get(2).or_else(|| decl.get(3)).map_or("", |m| m.as_str());
            let value = self
                .unescape(raw)
                .map_err(|e| format!("Invalid value for entity '{name}': {e}"))?
                .into_owned();
            self.declared.insert(name.to_string(), value);
        }
        Ok(())
    }

    /// Replacement text of a named entity.
    pub(crate) fn resolve(&self, name: &str) -> Option<&str> {
        resolve_predefined_entity(name).or_else(|| self.declared.get(name).map(String::as_str))
    }

    /// Replace every reference in `raw`.
    ///
    /// # Errors
    /// Unknown entities, malformed character references and a `&` that does
    /// not start a reference.
    pub(crate) fn unescape<'a>(&self, raw: &'a str) -> Result<Cow<'a, str>, EscapeError> {
        unescape_with(raw, |name| self.resolve(name))
    }
}

/// Append character data to `out` with line endings normalized to `\n`.
pub(crate) fn push_text(out: &mut String, text: &str) {
    if text.contains('\r') {
        out.push_str(&text.replace("\r\n", "\n").replace('\r', "\n"));
    } else {
        out.push_str(text);
    }
}

/// Turn literal line ends and tabs of a raw attribute value into spaces.
///
/// Runs before references are replaced, so `&#10;` still yields a newline.
pub(crate) fn normalize_attribute(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['\t', '\n', '\r']) {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(raw.replace("\r\n", " ").replace(['\t', '\n', '\r'], " "))
}
