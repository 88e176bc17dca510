//! Coverage signals: sets of branch identifiers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Branches observed during one execution.
///
/// Signals compose by union. The novelty of a signal is what it covers
/// beyond an accepted union.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageSignal {
    branches: BTreeSet<String>,
}

impl CoverageSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, branch: impl Into<String>) -> bool {
        self.branches.insert(branch.into())
    }

    pub fn contains(&self, branch: &str) -> bool {
        self.branches.contains(branch)
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.branches.iter().map(String::as_str)
    }

    /// Add every branch of `other` to this signal.
    pub fn extend_with(&mut self, other: &CoverageSignal) {
        self.branches.extend(other.branches.iter().cloned());
    }

    /// The union of two signals.
    pub fn union(&self, other: &CoverageSignal) -> CoverageSignal {
        let mut out = self.clone();
        out.extend_with(other);
        out
    }

    /// Branches of this signal that `accepted` does not contain.
    pub fn novelty(&self, accepted: &CoverageSignal) -> CoverageSignal {
        Self {
            branches: self
                .branches
                .difference(&accepted.branches)
                .cloned()
                .collect(),
        }
    }

    pub fn is_subset(&self, other: &CoverageSignal) -> bool {
        self.branches.is_subset(&other.branches)
    }
}

impl<S: Into<String>> FromIterator<S> for CoverageSignal {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            branches: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_novelty() {
        let accepted: CoverageSignal = ["a", "b"].into_iter().collect();
        let candidate: CoverageSignal = ["b", "c"].into_iter().collect();

        let novel = candidate.novelty(&accepted);
        assert_eq!(novel.len(), 1);
        assert!(novel.contains("c"));
        assert!(!candidate.is_subset(&accepted));
    }

    #[test]
    fn test_union_contains_both() {
        let a: CoverageSignal = ["a"].into_iter().collect();
        let b: CoverageSignal = ["b"].into_iter().collect();
        let u = a.union(&b);
        assert!(a.is_subset(&u) && b.is_subset(&u));
        assert_eq!(u.len(), 2);
    }

    #[test]
    fn test_empty_signal_is_subset_of_anything() {
        let empty = CoverageSignal::new();
        assert!(empty.is_subset(&CoverageSignal::new()));
        assert!(empty.novelty(&CoverageSignal::new()).is_empty());
    }

    #[test]
    fn test_serializes_as_list() {
        let signal: CoverageSignal = ["Foo.java:12:T"].into_iter().collect();
        assert_eq!(serde_json::to_string(&signal).unwrap(), r#"["Foo.java:12:T"]"#);
    }
}
