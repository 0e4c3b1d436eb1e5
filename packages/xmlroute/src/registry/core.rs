//! Rule registry mapping location paths to rules.

use std::collections::HashMap;
use std::fmt;

use super::location::PathLocation;
use super::path_hash;
use crate::config::REGISTRY_INITIAL_CAPACITY;
use crate::error::{Result, RouterError};
use crate::rule::{Rule, RuleType};

/// Rules sharing one declared path within one rule type.
struct Bucket<S> {
    path: Box<str>,
    rules: Vec<Rule<S>>,
}

type RuleTable<S> = HashMap<i32, Vec<Bucket<S>>>;

/// Registry of rules, one table per rule type.
///
/// Tables are keyed by the path hash for cheap lookup from a
/// [`PathLocation`]. Each hash slot keeps the declared path text next to its
/// rules and lookups compare it, so two different paths with the same hash
/// never fire each other's handlers.
///
/// Within a path the rules keep registration order, which is the dispatch
/// order. The registry is immutable after [`RuleRegistry::build`].
pub struct RuleRegistry<S> {
    element: RuleTable<S>,
    attribute: RuleTable<S>,
    characters: RuleTable<S>,
    len: usize,
}

impl<S> RuleRegistry<S> {
    /// Build a registry from rules.
    ///
    /// Rules are fully validated on construction (see [`Rule`]), so the only
    /// check left here is that there is something to dispatch.
    ///
    /// # Errors
    /// Returns `NoRules` when `rules` is empty.
    pub fn build(rules: impl IntoIterator<Item = Rule<S>>) -> Result<Self> {
        let rules: Vec<Rule<S>> = rules.into_iter().collect();
        if rules.is_empty() {
            return Err(RouterError::NoRules);
        }

        let capacity = REGISTRY_INITIAL_CAPACITY.max(rules.len() * 2);
        let mut registry = Self {
            element: HashMap::with_capacity(capacity),
            attribute: HashMap::with_capacity(capacity),
            characters: HashMap::with_capacity(capacity),
            len: rules.len(),
        };

        for rule in rules {
            let buckets = registry.table_mut(rule.rule_type()).entry(rule.key()).or_default();
            match buckets.iter_mut().find(|b| *b.path == *rule.path()) {
                Some(bucket) => bucket.rules.push(rule),
                None => buckets.push(Bucket {
                    path: rule.path().into(),
                    rules: vec![rule],
                }),
            }
        }

        tracing::debug!(
            rules = registry.len,
            element = registry.count(RuleType::Element),
            attribute = registry.count(RuleType::Attribute),
            characters = registry.count(RuleType::Characters),
            "Rule registry built"
        );

        Ok(registry)
    }

    fn table(&self, rule_type: RuleType) -> &RuleTable<S> {
        match rule_type {
            RuleType::Element => &self.element,
            RuleType::Attribute => &self.attribute,
            RuleType::Characters => &self.characters,
        }
    }

    fn table_mut(&mut self, rule_type: RuleType) -> &mut RuleTable<S> {
        match rule_type {
            RuleType::Element => &mut self.element,
            RuleType::Attribute => &mut self.attribute,
            RuleType::Characters => &mut self.characters,
        }
    }

    fn find(&self, rule_type: RuleType, key: i32, path: &str) -> &[Rule<S>] {
        self.table(rule_type)
            .get(&key)
            .and_then(|buckets| buckets.iter().find(|b| &*b.path == path))
            .map(|b| b.rules.as_slice())
            .unwrap_or(&[])
    }

    /// Rules of `rule_type` matching the current location, in registration order.
    #[must_use]
    pub fn lookup(&self, rule_type: RuleType, location: &PathLocation) -> &[Rule<S>] {
        self.find(rule_type, location.key(), location.as_str())
    }

    /// Rules of `rule_type` declared for the literal `path`.
    #[must_use]
    pub fn lookup_path(&self, rule_type: RuleType, path: &str) -> &[Rule<S>] {
        self.find(rule_type, path_hash(path), path)
    }

    /// Check if any rule of `rule_type` is declared for `path`.
    #[must_use]
    pub fn has_rules(&self, rule_type: RuleType, path: &str) -> bool {
        !self.lookup_path(rule_type, path).is_empty()
    }

    /// Declared paths of `rule_type`, sorted.
    #[must_use]
    pub fn paths(&self, rule_type: RuleType) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .table(rule_type)
            .values()
            .flatten()
            .map(|b| &*b.path)
            .collect();
        paths.sort_unstable();
        paths
    }

    /// Number of rules of `rule_type`.
    #[must_use]
    pub fn count(&self, rule_type: RuleType) -> usize {
        self.table(rule_type)
            .values()
            .flatten()
            .map(|b| b.rules.len())
            .sum()
    }

    /// Total number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: a registry holds at least one rule.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<S> fmt::Debug for RuleRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("element", &self.paths(RuleType::Element))
            .field("attribute", &self.paths(RuleType::Attribute))
            .field("characters", &self.paths(RuleType::Characters))
            .finish()
    }
}
