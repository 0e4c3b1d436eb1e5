//! Rule registry and dispatch engine for streaming XML.
//!
//! This module routes the events of a document to caller-supplied handlers
//! by location path. Rules are grouped per rule type and looked up by the
//! hash of the current path; the engine keeps that path up to date while it
//! walks the document.

mod core;
mod engine;
mod handler;
mod location;

pub use core::RuleRegistry;
pub use engine::{ParseOutcome, Traversal, XmlParser};
pub use handler::{AttributeHandler, CharactersHandler, Element, ElementHandler};
pub use location::{path_hash, PathLocation};
