//! Relation candidate generation
//!
//! Relation classification is directional, so every ordered pair of distinct
//! spans is a candidate: `(i, j)` and `(j, i)` are scored independently.

use serde::{Deserialize, Serialize};

use sentinel_core::EntitySpan;

/// Ordered pair of indices into a span list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationCandidate {
    pub source_index: usize,
    pub target_index: usize,
}

impl RelationCandidate {
    pub fn new(source_index: usize, target_index: usize) -> Self {
        Self {
            source_index,
            target_index,
        }
    }

    /// Resolve both ends against `spans`
    pub fn resolve<'a>(&self, spans: &'a [EntitySpan]) -> Option<(&'a EntitySpan, &'a EntitySpan)> {
        Some((spans.get(self.source_index)?, spans.get(self.target_index)?))
    }
}

/// Iterator over all `n * (n - 1)` ordered pairs, outer index ascending,
/// inner index ascending, self-pairs excluded
#[derive(Debug, Clone)]
pub struct CandidateIter {
    n: usize,
    i: usize,
    j: usize,
    remaining: usize,
}

impl CandidateIter {
    pub fn new(n: usize) -> Self {
        let mut iter = Self {
            n,
            i: 0,
            j: 0,
            remaining: n.saturating_mul(n.saturating_sub(1)),
        };
        iter.skip_self_pair();
        iter
    }

    fn skip_self_pair(&mut self) {
        if self.i == self.j {
            self.j += 1;
        }
        if self.j >= self.n {
            self.i += 1;
            self.j = 0;
            if self.i == self.j {
                self.j += 1;
            }
        }
    }
}

impl Iterator for CandidateIter {
    type Item = RelationCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let candidate = RelationCandidate::new(self.i, self.j);
        self.remaining -= 1;
        self.j += 1;
        self.skip_self_pair();
        Some(candidate)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for CandidateIter {}

/// All directed candidates over `spans`
pub fn generate_candidates(spans: &[EntitySpan]) -> Vec<RelationCandidate> {
    CandidateIter::new(spans.len()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spans(n: usize) -> Vec<EntitySpan> {
        (0..n)
            .map(|i| EntitySpan::new(i * 10, i * 10 + 5, "TOOL", format!("tool{i}")))
            .collect()
    }

    #[test]
    fn test_no_candidates_for_fewer_than_two_spans() {
        assert!(generate_candidates(&[]).is_empty());
        assert!(generate_candidates(&spans(1)).is_empty());
    }

    #[test]
    fn test_both_orderings_are_generated() {
        let pairs: Vec<(usize, usize)> = generate_candidates(&spans(2))
            .into_iter()
            .map(|c| (c.source_index, c.target_index))
            .collect();
        assert_eq!(pairs, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_deterministic_order_for_three_spans() {
        let pairs: Vec<(usize, usize)> = generate_candidates(&spans(3))
            .into_iter()
            .map(|c| (c.source_index, c.target_index))
            .collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 0), (1, 2), (2, 0), (2, 1)]);
    }

    #[test]
    fn test_resolve() {
        let spans = spans(2);
        let (source, target) = RelationCandidate::new(1, 0).resolve(&spans).unwrap();
        assert_eq!(source.text, "tool1");
        assert_eq!(target.text, "tool0");
        assert!(RelationCandidate::new(0, 5).resolve(&spans).is_none());
    }

    proptest! {
        #[test]
        fn prop_candidate_count_and_order(n in 0usize..30) {
            let iter = CandidateIter::new(n);
            prop_assert_eq!(iter.len(), n * n.saturating_sub(1));

            let candidates: Vec<RelationCandidate> = iter.collect();
            prop_assert_eq!(candidates.len(), n * n.saturating_sub(1));
            prop_assert!(candidates.iter().all(|c| c.source_index != c.target_index));
            prop_assert!(candidates.iter().all(|c| c.source_index < n && c.target_index < n));
            prop_assert!(candidates.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
