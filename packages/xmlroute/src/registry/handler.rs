//! Handler trait definitions.
//!
//! Each rule type has its own handler trait. All three receive the
//! caller-owned state object and the [`Traversal`] handle of the running
//! parse, through which a handler can stop the traversal.
//!
//! Closures with a matching signature implement the traits directly, so
//! most callers never name them. Handler types of their own go through
//! [`RuleBuilder`](crate::RuleBuilder).
//!
//! ```
//! use xmlroute::{Element, Rule};
//!
//! let rule = Rule::element("/movie", |element, count: &mut usize, _| {
//!     if element == Element::Start {
//!         *count += 1;
//!     }
//! })
//! .unwrap();
//! assert_eq!(rule.path(), "/movie");
//! ```

use super::engine::Traversal;

/// Marker passed to element handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    /// The start tag of a matched element was read.
    Start,
    /// The end tag of a matched element was read. The location still points
    /// at the element being closed.
    End,
}

/// Handler for element rules: notified on start and end tags.
pub trait ElementHandler<S>: Send + Sync {
    /// React to the start or end of a matched element.
    ///
    /// # Arguments
    /// * `element` - Whether the start or the end tag was read
    /// * `state` - Caller-owned state of the running parse
    /// * `traversal` - Current location, and the handle to stop the parse
    fn handle(&self, element: Element, state: &mut S, traversal: &mut Traversal);
}

/// Handler for attribute rules.
///
/// Called once per declared attribute name, in declaration order. `value` is
/// `None` when the start tag does not carry the attribute.
pub trait AttributeHandler<S>: Send + Sync {
    /// React to one attribute of a matched start tag.
    ///
    /// # Arguments
    /// * `name` - The attribute name as declared on the rule
    /// * `value` - The attribute value, `None` if the tag does not carry it
    /// * `state` - Caller-owned state of the running parse
    /// * `traversal` - Current location, and the handle to stop the parse
    fn handle(&self, name: &str, value: Option<&str>, state: &mut S, traversal: &mut Traversal);
}

/// Handler for characters rules.
///
/// Receives one coalesced text run (text and CDATA merged) with leading and
/// trailing whitespace removed.
pub trait CharactersHandler<S>: Send + Sync {
    /// React to the text content of a matched element.
    ///
    /// # Arguments
    /// * `text` - The trimmed text run
    /// * `state` - Caller-owned state of the running parse
    /// * `traversal` - Current location, and the handle to stop the parse
    fn handle(&self, text: &str, state: &mut S, traversal: &mut Traversal);
}

impl<S, F> ElementHandler<S> for F
where
    F: Fn(Element, &mut S, &mut Traversal) + Send + Sync,
{
    fn handle(&self, element: Element, state: &mut S, traversal: &mut Traversal) {
        self(element, state, traversal);
    }
}

impl<S, F> AttributeHandler<S> for F
where
    F: Fn(&str, Option<&str>, &mut S, &mut Traversal) + Send + Sync,
{
    fn handle(&self, name: &str, value: Option<&str>, state: &mut S, traversal: &mut Traversal) {
        self(name, value, state, traversal);
    }
}

impl<S, F> CharactersHandler<S> for F
where
    F: Fn(&str, &mut S, &mut Traversal) + Send + Sync,
{
    fn handle(&self, text: &str, state: &mut S, traversal: &mut Traversal) {
        self(text, state, traversal);
    }
}
