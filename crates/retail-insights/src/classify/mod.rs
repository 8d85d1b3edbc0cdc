//! Threshold classification as ordered rule data.
//!
//! A [`RuleSet`] is a list of `(predicate, label)` pairs checked top to
//! bottom; the first predicate that holds picks the label, otherwise the
//! fallback applies. The concrete rule sets in [`rules`] are built from
//! [`Thresholds`](crate::config::Thresholds), so changing a boundary is a
//! configuration change rather than a code change.

pub mod rules;

pub use rules::{
    Classifiers, CorrelationStrength, OverstockAction, OverstockInput, ReorderInput,
    RETURN_BANDS, ReorderPriority, StockLevel, StockPosition, StockReturnPattern,
    correlation_direction,
};

use std::fmt;

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// One rule: the label it assigns and when.
pub struct Rule<T, L> {
    pub label: L,
    predicate: Predicate<T>,
}

impl<T, L> Rule<T, L> {
    pub fn matches(&self, input: &T) -> bool {
        (self.predicate)(input)
    }
}

/// Ordered rules with a fallback label.
pub struct RuleSet<T, L> {
    name: &'static str,
    rules: Vec<Rule<T, L>>,
    fallback: L,
}

impl<T, L: Copy> RuleSet<T, L> {
    /// Start an empty rule set; every input gets `fallback` until rules are added.
    pub fn new(name: &'static str, fallback: L) -> Self {
        Self {
            name,
            rules: Vec::new(),
            fallback,
        }
    }

    /// Append a rule. Earlier rules take precedence.
    pub fn rule(
        mut self,
        label: L,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(Rule {
            label,
            predicate: Box::new(predicate),
        });
        self
    }

    /// Label of the first matching rule, or the fallback.
    pub fn classify(&self, input: &T) -> L {
        self.rules
            .iter()
            .find(|rule| rule.matches(input))
            .map(|rule| rule.label)
            .unwrap_or(self.fallback)
    }

    /// Every label in evaluation order, fallback last.
    pub fn labels(&self) -> Vec<L> {
        self.rules
            .iter()
            .map(|rule| rule.label)
            .chain(std::iter::once(self.fallback))
            .collect()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T, L: fmt::Debug> fmt::Debug for RuleSet<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("name", &self.name)
            .field(
                "labels",
                &self.rules.iter().map(|r| &r.label).collect::<Vec<_>>(),
            )
            .field("fallback", &self.fallback)
            .finish()
    }
}
