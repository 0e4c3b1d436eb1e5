//! Configuration constants, source configuration and rule-path validation.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, RouterError};

/// Capacity of the read buffer of a tokenizer session (8 KiB).
///
/// Tokens longer than the buffer are still read whole; the event buffer
/// grows to fit them.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Default maximum element nesting depth.
///
/// Guards the location buffer and the namespace scope stack against
/// pathological documents. Real schemas rarely exceed a few dozen levels.
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Initial capacity of each rule table in the registry.
pub const REGISTRY_INITIAL_CAPACITY: usize = 64;

/// Initial capacity of the location path buffer.
pub const LOCATION_INITIAL_CAPACITY: usize = 256;

/// Environment variable overriding [`DEFAULT_BUFFER_SIZE`].
pub const ENV_BUFFER_SIZE: &str = "XMLROUTE_BUFFER_SIZE";

/// Environment variable overriding [`DEFAULT_MAX_DEPTH`].
pub const ENV_MAX_DEPTH: &str = "XMLROUTE_MAX_DEPTH";

/// Segment syntax of a location path: `/name` or `/[namespace]name`, repeated.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:/(?:\[[^\[\]]+\])?[^/\[\]]+)+$").expect("valid regex")
});

/// Tokenizer configuration shared by every session a factory opens.
///
/// Text coalescing is not configurable: the dispatch engine relies on one
/// logical text run arriving as exactly one characters event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    buffer_size: usize,
    max_depth: usize,
}

impl SourceConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Load configuration from `XMLROUTE_BUFFER_SIZE` and `XMLROUTE_MAX_DEPTH`.
    ///
    /// Missing, unparsable or zero values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let buffer_size = std::env::var(ENV_BUFFER_SIZE)
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v: &usize| *v > 0)
            .unwrap_or(DEFAULT_BUFFER_SIZE);

        let max_depth = std::env::var(ENV_MAX_DEPTH)
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v: &usize| *v > 0)
            .unwrap_or(DEFAULT_MAX_DEPTH);

        Self {
            buffer_size,
            max_depth,
        }
    }

    /// Set the initial read buffer size in bytes.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a zero size.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Result<Self> {
        if buffer_size == 0 {
            return Err(RouterError::InvalidConfig(
                "buffer size must be greater than zero".to_string(),
            ));
        }
        self.buffer_size = buffer_size;
        Ok(self)
    }

    /// Set the maximum element nesting depth.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a zero depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Result<Self> {
        if max_depth == 0 {
            return Err(RouterError::InvalidConfig(
                "max depth must be greater than zero".to_string(),
            ));
        }
        self.max_depth = max_depth;
        Ok(self)
    }

    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Always true, see the type documentation.
    #[must_use]
    pub fn is_coalescing(&self) -> bool {
        true
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate the location path of a rule.
///
/// # Arguments
/// * `path` - Location path such as `/imdb/category/movie` or `/[urn:x]a/b`
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(RouterError::InvalidPath)` naming the first problem found
///
/// # Examples
/// ```
/// use xmlroute::config::validate_rule_path;
///
/// assert!(validate_rule_path("/library/book").is_ok());
/// assert!(validate_rule_path("/[http://example.com/ns]library/book").is_ok());
/// assert!(validate_rule_path("/library/").is_err());
/// assert!(validate_rule_path("").is_err());
/// ```
pub fn validate_rule_path(path: &str) -> Result<()> {
    let invalid = |reason| {
        Err(RouterError::InvalidPath {
            path: path.to_string(),
            reason,
        })
    };

    if path.is_empty() {
        return invalid("the path to match cannot be empty");
    }
    if path.ends_with('/') {
        return invalid("path cannot end in a trailing slash (/), please remove it");
    }
    if !path.starts_with('/') {
        return invalid("path must start at the document root with a slash (/)");
    }
    if !PATH_PATTERN.is_match(path) {
        return invalid("every segment must be 'name' or '[namespace]name'");
    }

    Ok(())
}
