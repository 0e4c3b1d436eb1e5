//! The parser's position inside a document, as a single comparable key.
//!
//! A [`PathLocation`] is a string-shaped stack: entering an element appends
//! `/name` (or `/[namespace]name`) to one growable buffer and remembers the
//! previous length, leaving an element truncates back to it. Rule lookup
//! uses [`PathLocation::key`], which is the same hash that [`path_hash`]
//! computes for the literal path text of a rule.

use std::cell::Cell;

use crate::config::LOCATION_INITIAL_CAPACITY;

/// Hash of a location path.
///
/// Same arithmetic as `java.lang.String#hashCode` (`h = 31 * h + unit` over
/// UTF-16 code units, wrapping `i32`), so keys produced from path text and
/// keys produced incrementally by a [`PathLocation`] agree.
///
/// # Examples
/// ```
/// use xmlroute::path_hash;
///
/// assert_eq!(path_hash(""), 0);
/// assert_eq!(path_hash("/a"), 47 * 31 + 97);
/// ```
#[must_use]
pub fn path_hash(path: &str) -> i32 {
    path.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Current nesting path from the document root.
#[derive(Debug, Clone)]
pub struct PathLocation {
    path: String,
    lengths: Vec<usize>,
    key: Cell<Option<i32>>,
}

impl PathLocation {
    /// Create an empty location (the position before the root element).
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: String::with_capacity(LOCATION_INITIAL_CAPACITY),
            lengths: Vec::with_capacity(16),
            key: Cell::new(None),
        }
    }

    /// Enter an element.
    ///
    /// An empty namespace is treated as no namespace, matching how rule
    /// paths are written.
    pub fn push(&mut self, local_name: &str, namespace: Option<&str>) {
        self.key.set(None);
        self.lengths.push(self.path.len());

        self.path.push('/');
        if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
            self.path.push('[');
            self.path.push_str(ns);
            self.path.push(']');
        }
        self.path.push_str(local_name);
    }

    /// Leave the innermost element.
    ///
    /// Returns `false` (and leaves the location untouched) when the location
    /// is already empty.
    pub fn pop(&mut self) -> bool {
        match self.lengths.pop() {
            Some(len) => {
                self.key.set(None);
                self.path.truncate(len);
                true
            }
            None => false,
        }
    }

    /// Reset to the empty location.
    pub fn clear(&mut self) {
        self.key.set(None);
        self.path.clear();
        self.lengths.clear();
    }

    /// Lookup key of the current path, memoized until the next push or pop.
    #[must_use]
    pub fn key(&self) -> i32 {
        if let Some(key) = self.key.get() {
            return key;
        }
        let key = path_hash(&self.path);
        self.key.set(Some(key));
        key
    }

    /// Text form of the current path, e.g. `/imdb/[urn:x]category`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Number of open elements.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.lengths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}

impl Default for PathLocation {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PathLocation {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for PathLocation {}
