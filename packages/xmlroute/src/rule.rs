//! Rules: bindings from a location path to a handler.
//!
//! A rule is validated completely when it is built. A rule that exists is
//! therefore always dispatchable: the path is well-formed, the handler for its
//! type is present and, for attribute rules, every attribute-name specifier
//! has already been split into namespace and local name.

use std::fmt;
use std::sync::Arc;

use crate::config::validate_rule_path;
use crate::error::{Result, RouterError};
use crate::registry::{
    path_hash, AttributeHandler, CharactersHandler, Element, ElementHandler, Traversal,
};

/// Which events a rule is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
    /// Start and end tags of the matching element. Handy when no data is
    /// needed, only the fact that the path occurred (e.g. counting).
    Element,
    /// One or more attribute values of the matching element.
    Attribute,
    /// The character data directly inside the matching element.
    Characters,
}

impl RuleType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Element => "Element",
            RuleType::Attribute => "Attribute",
            RuleType::Characters => "Characters",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute-name specifier of an attribute rule.
///
/// Written either as a bare local name (`id`) or with a bracketed namespace
/// URI (`[http://www.w3.org/1999/xlink]href`). A bare name matches the
/// attribute with that local name in any namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeName {
    namespace: Option<String>,
    local_name: String,
}

impl AttributeName {
    /// Parse a specifier.
    ///
    /// # Errors
    /// Returns a short reason when the closing bracket is missing, the
    /// namespace is empty or the local name is missing.
    ///
    /// # Examples
    /// ```
    /// use xmlroute::AttributeName;
    ///
    /// let name = AttributeName::parse("[urn:x]id").unwrap();
    /// assert_eq!(name.namespace(), Some("urn:x"));
    /// assert_eq!(name.local_name(), "id");
    ///
    /// assert!(AttributeName::parse("[urn:x").is_err());
    /// ```
    pub fn parse(raw: &str) -> std::result::Result<Self, &'static str> {
        let (namespace, local_name) = match raw.strip_prefix('[') {
            Some(rest) => {
                let end = rest
                    .find(']')
                    .ok_or("namespace URI is incomplete, closing bracket ']' is missing")?;
                if end == 0 {
                    return Err("namespace URI between the brackets is empty");
                }
                (Some(rest[..end].to_string()), &rest[end + 1..])
            }
            None => (None, raw),
        };

        if local_name.is_empty() {
            return Err("local name is missing");
        }
        if local_name.contains(['[', ']']) {
            return Err("local name cannot contain brackets");
        }

        Ok(Self {
            namespace,
            local_name: local_name.to_string(),
        })
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "[{ns}]{}", self.local_name),
            None => f.write_str(&self.local_name),
        }
    }
}

/// Handler of a rule, tagged by rule type.
pub(crate) enum RuleHandler<S> {
    Element(Arc<dyn ElementHandler<S>>),
    Attribute(Arc<dyn AttributeHandler<S>>, Vec<AttributeName>),
    Characters(Arc<dyn CharactersHandler<S>>),
}

impl<S> Clone for RuleHandler<S> {
    fn clone(&self) -> Self {
        match self {
            RuleHandler::Element(h) => RuleHandler::Element(Arc::clone(h)),
            RuleHandler::Attribute(h, names) => RuleHandler::Attribute(Arc::clone(h), names.clone()),
            RuleHandler::Characters(h) => RuleHandler::Characters(Arc::clone(h)),
        }
    }
}

/// Immutable binding of a location path to a handler.
///
/// Rules are cheap to clone and can be shared between parsers and threads.
pub struct Rule<S> {
    path: Arc<str>,
    key: i32,
    handler: RuleHandler<S>,
}

impl<S> Rule<S> {
    /// Create an element rule.
    ///
    /// # Errors
    /// Returns `InvalidPath` if the path is not a valid location path.
    pub fn element<F>(path: impl Into<String>, handler: F) -> Result<Self>
    where
        F: Fn(Element, &mut S, &mut Traversal) + Send + Sync + 'static,
    {
        RuleBuilder::new(RuleType::Element, path)
            .on_element(handler)
            .build()
    }

    /// Create an attribute rule for the given attribute names.
    ///
    /// # Errors
    /// Returns `InvalidPath`, `EmptyAttributeNames` or `MalformedAttributeName`.
    pub fn attributes<F, I, N>(path: impl Into<String>, handler: F, names: I) -> Result<Self>
    where
        F: Fn(&str, Option<&str>, &mut S, &mut Traversal) + Send + Sync + 'static,
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        RuleBuilder::new(RuleType::Attribute, path)
            .on_attribute(handler)
            .attribute_names(names)
            .build()
    }

    /// Create a characters rule.
    ///
    /// # Errors
    /// Returns `InvalidPath` if the path is not a valid location path.
    pub fn characters<F>(path: impl Into<String>, handler: F) -> Result<Self>
    where
        F: Fn(&str, &mut S, &mut Traversal) + Send + Sync + 'static,
    {
        RuleBuilder::new(RuleType::Characters, path)
            .on_characters(handler)
            .build()
    }

    /// Start building a rule whose handler is supplied separately.
    #[must_use]
    pub fn builder(rule_type: RuleType, path: impl Into<String>) -> RuleBuilder<S> {
        RuleBuilder::new(rule_type, path)
    }

    #[must_use]
    pub fn rule_type(&self) -> RuleType {
        match self.handler {
            RuleHandler::Element(_) => RuleType::Element,
            RuleHandler::Attribute(..) => RuleType::Attribute,
            RuleHandler::Characters(_) => RuleType::Characters,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Hash of the declared path, see [`path_hash`](crate::path_hash).
    #[must_use]
    pub fn key(&self) -> i32 {
        self.key
    }

    /// Attribute-name specifiers, empty for non-attribute rules.
    #[must_use]
    pub fn attribute_names(&self) -> &[AttributeName] {
        match &self.handler {
            RuleHandler::Attribute(_, names) => names,
            _ => &[],
        }
    }

    pub(crate) fn handler(&self) -> &RuleHandler<S> {
        &self.handler
    }
}

impl<S> Clone for Rule<S> {
    fn clone(&self) -> Self {
        Self {
            path: Arc::clone(&self.path),
            key: self.key,
            handler: self.handler.clone(),
        }
    }
}

impl<S> fmt::Display for Rule<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule{{path='{}', type={}}}", self.path, self.rule_type())
    }
}

impl<S> fmt::Debug for Rule<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("path", &self.path)
            .field("type", &self.rule_type())
            .field("attribute_names", &self.attribute_names())
            .finish()
    }
}

/// Builder for rules whose type and handler are decided at runtime.
///
/// Handlers for a type other than the declared one are ignored.
///
/// ```
/// use xmlroute::{Element, ElementHandler, Rule, RuleType, Traversal};
///
/// struct CountMovies;
///
/// impl ElementHandler<usize> for CountMovies {
///     fn handle(&self, element: Element, count: &mut usize, _: &mut Traversal) {
///         if element == Element::End {
///             *count += 1;
///         }
///     }
/// }
///
/// let rule = Rule::builder(RuleType::Element, "/imdb/category/movie")
///     .on_element(CountMovies)
///     .build()
///     .unwrap();
/// assert_eq!(rule.rule_type(), RuleType::Element);
///
/// let missing = Rule::<usize>::builder(RuleType::Characters, "/imdb").build();
/// assert!(missing.is_err());
/// ```
pub struct RuleBuilder<S> {
    rule_type: RuleType,
    path: String,
    element: Option<Arc<dyn ElementHandler<S>>>,
    attribute: Option<Arc<dyn AttributeHandler<S>>>,
    characters: Option<Arc<dyn CharactersHandler<S>>>,
    attribute_names: Vec<String>,
}

impl<S> RuleBuilder<S> {
    #[must_use]
    pub fn new(rule_type: RuleType, path: impl Into<String>) -> Self {
        Self {
            rule_type,
            path: path.into(),
            element: None,
            attribute: None,
            characters: None,
            attribute_names: Vec::new(),
        }
    }

    #[must_use]
    pub fn on_element(mut self, handler: impl ElementHandler<S> + 'static) -> Self {
        self.element = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn on_attribute(mut self, handler: impl AttributeHandler<S> + 'static) -> Self {
        self.attribute = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn on_characters(mut self, handler: impl CharactersHandler<S> + 'static) -> Self {
        self.characters = Some(Arc::new(handler));
        self
    }

    /// Add one attribute-name specifier.
    #[must_use]
    pub fn attribute_name(mut self, name: impl Into<String>) -> Self {
        self.attribute_names.push(name.into());
        self
    }

    /// Add attribute-name specifiers, keeping their order.
    #[must_use]
    pub fn attribute_names<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.attribute_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Validate and build the rule.
    ///
    /// # Errors
    /// * `InvalidPath` if the path is empty, has a trailing slash or bad segments
    /// * `MissingHandler` if no handler for the declared type was supplied
    /// * `EmptyAttributeNames` / `MalformedAttributeName` for attribute rules
    pub fn build(self) -> Result<Rule<S>> {
        validate_rule_path(&self.path)?;

        let describe = || format!("Rule{{path='{}', type={}}}", self.path, self.rule_type);
        let missing = || RouterError::MissingHandler {
            rule: describe(),
            rule_type: self.rule_type.to_string(),
        };

        let handler = match self.rule_type {
            RuleType::Element => RuleHandler::Element(self.element.clone().ok_or_else(missing)?),
            RuleType::Characters => {
                RuleHandler::Characters(self.characters.clone().ok_or_else(missing)?)
            }
            RuleType::Attribute => {
                let handler = self.attribute.clone().ok_or_else(missing)?;
                if self.attribute_names.is_empty() {
                    return Err(RouterError::EmptyAttributeNames {
                        path: self.path.clone(),
                    });
                }
                let names = self
                    .attribute_names
                    .iter()
                    .map(|raw| {
                        AttributeName::parse(raw).map_err(|reason| {
                            RouterError::MalformedAttributeName {
                                rule: describe(),
                                name: raw.clone(),
                                reason,
                            }
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                RuleHandler::Attribute(handler, names)
            }
        };

        Ok(Rule {
            key: path_hash(&self.path),
            path: Arc::from(self.path),
            handler,
        })
    }
}
