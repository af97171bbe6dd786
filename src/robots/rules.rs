use std::collections::BTreeSet;
use std::ops::Bound;

/// Sorted set of path prefixes with redundant entries removed
///
/// No stored rule is ever a prefix of another stored rule. Because of that, the
/// only candidate prefix of a path is the greatest rule that sorts before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: BTreeSet<String>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, returning false when an existing rule already covers it
    ///
    /// Rules that the new one covers are removed.
    pub fn add(&mut self, rule: &str) -> bool {
        if self.preceding(rule).is_some_and(|prev| rule.starts_with(prev)) {
            return false;
        }

        let inserted = self.rules.insert(rule.to_string());

        let covered: Vec<String> = self
            .rules
            .range::<str, _>((Bound::Excluded(rule), Bound::Unbounded))
            .take_while(|candidate| candidate.starts_with(rule))
            .cloned()
            .collect();
        for candidate in covered {
            self.rules.remove(&candidate);
        }

        inserted
    }

    /// Returns true if some stored rule is a prefix of `path`
    pub fn contains_prefix_of(&self, path: &str) -> bool {
        self.matching_prefix(path).is_some()
    }

    /// The stored rule that is a prefix of `path`, if any
    pub fn matching_prefix(&self, path: &str) -> Option<&str> {
        if let Some(exact) = self.rules.get(path) {
            return Some(exact.as_str());
        }
        self.preceding(path).filter(|prev| path.starts_with(prev))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(String::as_str)
    }

    fn preceding(&self, path: &str) -> Option<&str> {
        self.rules
            .range::<str, _>((Bound::Unbounded, Bound::Excluded(path)))
            .next_back()
            .map(String::as_str)
    }
}

/// Path prefixes kept exactly as added, for longest-match lookups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixList {
    rules: BTreeSet<String>,
}

impl PrefixList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rule: &str) -> bool {
        self.rules.insert(rule.to_string())
    }

    /// The longest stored rule that is a prefix of `path`
    pub fn longest_prefix_of(&self, path: &str) -> Option<&str> {
        path.char_indices()
            .map(|(idx, _)| idx)
            .skip(1)
            .chain(std::iter::once(path.len()))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .find_map(|end| self.rules.get(&path[..end]).map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
