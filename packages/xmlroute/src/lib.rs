//! xmlroute - Path-addressed event router for streaming XML.
//!
//! Callers register rules that bind a location path such as
//! `/imdb/category/movie` to a handler. The parser streams the document once
//! and invokes the handlers whose path equals the current location, passing
//! along a caller-owned state object. No tree is ever built.
//!
//! # Example
//!
//! ```
//! use xmlroute::{Element, Rule, Traversal, XmlParserFactory};
//!
//! #[derive(Default)]
//! struct Movies {
//!     count: usize,
//!     titles: Vec<String>,
//! }
//!
//! let rules = vec![
//!     Rule::element("/imdb/movie", |element: Element, movies: &mut Movies, _: &mut Traversal| {
//!         if element == Element::Start {
//!             movies.count += 1;
//!         }
//!     })
//!     .unwrap(),
//!     Rule::characters("/imdb/movie/title", |text: &str, movies: &mut Movies, _: &mut Traversal| {
//!         movies.titles.push(text.to_string());
//!     })
//!     .unwrap(),
//! ];
//!
//! let parser = XmlParserFactory::new().new_parser(rules).unwrap();
//! let mut movies = Movies::default();
//! parser
//!     .parse_str(
//!         "<imdb><movie><title>Terminator 2</title></movie><movie><title>Tommy Boy</title></movie></imdb>",
//!         &mut movies,
//!     )
//!     .unwrap();
//!
//! assert_eq!(movies.count, 2);
//! assert_eq!(movies.titles, ["Terminator 2", "Tommy Boy"]);
//! ```
//!
//! # Architecture
//!
//! The router is organized into several modules:
//!
//! - [`config`]: Configuration constants, source configuration and path validation
//! - [`error`]: Error types and Result alias
//! - [`rule`]: Rules, rule types and attribute-name specifiers
//! - [`registry`]: Location tracking, rule registry and dispatch engine
//! - [`source`]: Parser factory and the streaming tokenizer
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod error;
pub mod registry;
pub mod rule;
pub mod source;

// Re-export commonly used items
pub use config::SourceConfig;
pub use error::{Result, RouterError, SourceError};
pub use registry::{
    path_hash, AttributeHandler, CharactersHandler, Element, ElementHandler, ParseOutcome,
    PathLocation, RuleRegistry, Traversal, XmlParser,
};
pub use rule::{AttributeName, Rule, RuleBuilder, RuleType};
pub use source::{Attribute, Encoding, Session, StartTag, XmlEvent, XmlParserFactory};
