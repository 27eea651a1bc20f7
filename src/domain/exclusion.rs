//! Caller exclusion rules.
//!
//! Excluded callers are pruned before they become tree nodes, so neither they
//! nor anything that only reaches the target through them shows up in a trace.

use crate::domain::symbol::SymbolRef;

/// Marker applied to qualified-name traces unless disabled.
pub const DEFAULT_TEST_EXCLUSION: &str = "::tests";

/// A substring checked against a symbol's display name and namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionRule {
    pattern: String,
}

impl ExclusionRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

pub fn excluded(symbol: &SymbolRef, rule: &ExclusionRule) -> bool {
    if rule.pattern.is_empty() {
        return false;
    }
    symbol.display_name().contains(&rule.pattern) || symbol.namespace().contains(&rule.pattern)
}

/// Set of rules; a symbol matching any rule is excluded.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    rules: Vec<ExclusionRule>,
}

impl ExclusionFilter {
    pub fn new(rules: Vec<ExclusionRule>) -> Self {
        Self { rules }
    }

    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(patterns.into_iter().map(ExclusionRule::new).collect())
    }

    pub fn push(&mut self, rule: ExclusionRule) {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    pub fn excludes(&self, symbol: &SymbolRef) -> bool {
        self.rules.iter().any(|rule| excluded(symbol, rule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_display_name() {
        let sym = SymbolRef::new("k", "app::Service::run_tests_helper", "app");
        assert!(excluded(&sym, &ExclusionRule::new("tests_helper")));
        assert!(!excluded(&sym, &ExclusionRule::new("bench")));
    }

    #[test]
    fn test_matches_namespace_only() {
        // display name does not carry the module, namespace does
        let sym = SymbolRef::new("k", "check_login", "app::auth::tests");
        assert!(excluded(&sym, &ExclusionRule::new(DEFAULT_TEST_EXCLUSION)));
    }

    #[test]
    fn test_empty_pattern_never_excludes() {
        let sym = SymbolRef::from_path("app::run");
        assert!(!excluded(&sym, &ExclusionRule::new("")));
    }

    #[test]
    fn test_filter_any_rule() {
        let mut filter = ExclusionFilter::from_patterns(["::tests", "::benches"]);
        filter.push(ExclusionRule::new("::tests"));
        assert_eq!(filter.rules().len(), 2);

        assert!(filter.excludes(&SymbolRef::from_path("app::benches::hot_loop")));
        assert!(filter.excludes(&SymbolRef::from_path("app::tests::it_works")));
        assert!(!filter.excludes(&SymbolRef::from_path("app::server::start")));
        assert!(!ExclusionFilter::default().excludes(&SymbolRef::from_path("app::tests::x")));
    }
}
