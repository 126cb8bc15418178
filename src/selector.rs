//! Best-match selection over a target's scored candidates.

use crate::profile::ScoredCandidate;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("no candidates to select from")]
    NoCandidates,
}

/// Ranking order: higher composite first, then lower avatar distance.
/// `Ordering::Less` means `a` ranks ahead of `b`.
pub fn rank(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.composite_score
        .total_cmp(&a.composite_score)
        .then_with(|| a.avatar_distance.total_cmp(&b.avatar_distance))
}

/// Pick the best candidate. Full ties go to the earliest entry.
pub fn select(candidates: &[ScoredCandidate]) -> Result<&ScoredCandidate, SelectError> {
    candidates.iter().min_by(|a, b| rank(a, b)).ok_or(SelectError::NoCandidates)
}
