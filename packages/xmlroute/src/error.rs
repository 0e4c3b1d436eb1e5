//! Error types for the router.
//!
//! Uses the dual-error pattern: `RouterError` for library consumers
//! with detailed error context, and `SourceError` for failures raised by the
//! XML tokenizer underneath the dispatch engine.

use thiserror::Error;

/// Main error type for the router library.
///
/// Every failure aborts the current traversal. Callers that only care about
/// pass/fail can treat any `Err` as "parsing failed"; callers that want the
/// cause can match on the variant or walk `std::error::Error::source`.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A parser was requested without any rules.
    #[error("At least one rule is required, otherwise parsing would do nothing")]
    NoRules,

    /// The location path of a rule is not valid.
    #[error("Invalid rule path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// An attribute rule was declared without attribute names.
    #[error("Attribute rule for '{path}' needs at least one attribute name")]
    EmptyAttributeNames { path: String },

    /// An attribute-name specifier could not be parsed.
    #[error("Malformed attribute name '{name}' for {rule}: {reason}")]
    MalformedAttributeName {
        rule: String,
        name: String,
        reason: &'static str,
    },

    /// The handler required by the rule type was not supplied.
    #[error("The {rule_type} handler for {rule} is missing")]
    MissingHandler { rule: String, rule_type: String },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Writing JSON output failed.
    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or tokenizing the XML input failed.
    #[error("XML source error: {0}")]
    Source(#[from] SourceError),
}

impl RouterError {
    /// True for errors caused by the caller's rules or configuration.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RouterError::NoRules
                | RouterError::InvalidPath { .. }
                | RouterError::EmptyAttributeNames { .. }
                | RouterError::MalformedAttributeName { .. }
                | RouterError::MissingHandler { .. }
                | RouterError::InvalidConfig(_)
        )
    }

    /// True for errors raised while opening or reading the XML input.
    #[must_use]
    pub fn is_source(&self) -> bool {
        matches!(self, RouterError::Source(_))
    }
}

/// Errors raised by a tokenizer session.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The underlying reader failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not well-formed.
    #[error("{message} at byte {offset}")]
    Syntax { message: String, offset: u64 },

    /// The input bytes are not valid in the selected encoding.
    #[error("{message} at byte {offset}")]
    Encoding { message: String, offset: u64 },

    /// Elements are nested deeper than the configured limit.
    #[error("Element nesting exceeds the limit of {limit} at byte {offset}")]
    DepthExceeded { limit: usize, offset: u64 },
}

impl SourceError {
    pub(crate) fn syntax(message: impl Into<String>, offset: u64) -> Self {
        SourceError::Syntax {
            message: message.into(),
            offset,
        }
    }

    pub(crate) fn encoding(message: impl Into<String>, offset: u64) -> Self {
        SourceError::Encoding {
            message: message.into(),
            offset,
        }
    }

    /// Byte offset in the (UTF-8) input where the error was detected, if known.
    #[must_use]
    pub fn offset(&self) -> Option<u64> {
        match self {
            SourceError::Io(_) => None,
            SourceError::Syntax { offset, .. }
            | SourceError::Encoding { offset, .. }
            | SourceError::DepthExceeded { offset, .. } => Some(*offset),
        }
    }
}

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_invalid_path_display() {
        let err = RouterError::InvalidPath {
            path: "/movie/".to_string(),
            reason: "path cannot end in a trailing slash",
        };
        assert_eq!(
            err.to_string(),
            "Invalid rule path '/movie/': path cannot end in a trailing slash"
        );
        assert!(err.is_configuration());
        assert!(!err.is_source());
    }

    #[test]
    fn test_source_error_wraps_cause() {
        let err: RouterError = SourceError::syntax("Unexpected end tag </b>", 12).into();
        assert!(err.is_source());
        assert_eq!(
            err.to_string(),
            "XML source error: Unexpected end tag </b> at byte 12"
        );

        let cause = err.source().map(|e| e.to_string());
        assert_eq!(cause.as_deref(), Some("Unexpected end tag </b> at byte 12"));
    }

    #[test]
    fn test_io_error_has_no_offset() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "boom");
        let err = SourceError::from(io);
        assert_eq!(err.offset(), None);

        let depth = SourceError::DepthExceeded {
            limit: 4,
            offset: 99,
        };
        assert_eq!(depth.offset(), Some(99));
    }
}
