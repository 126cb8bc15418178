//! Candidate scoring.
//!
//! Each of the three signals is reduced to pass/fail against its threshold,
//! and the composite is the sum of the weights of the passing signals. A near
//! miss scores exactly like a total mismatch.

use crate::config::{SignalThresholds, SignalWeights};
use crate::profile::{Profile, ScoredCandidate};
use crate::similarity::{self, Histogram, SENTINEL_DISTANCE};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Which signals passed their gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalGates {
    pub avatar: bool,
    pub name: bool,
    pub bio: bool,
}

impl SignalGates {
    pub fn passed_count(&self) -> usize {
        [self.avatar, self.name, self.bio].iter().filter(|&&g| g).count()
    }
}

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    thresholds: SignalThresholds,
    weights: SignalWeights,
    avatar_dir: PathBuf,
    /// Avatar filenames that must be treated as absent
    excluded: HashSet<String>,
}

impl ScoringEngine {
    pub fn new(thresholds: SignalThresholds, weights: SignalWeights, avatar_dir: impl Into<PathBuf>) -> Self {
        Self {
            thresholds,
            weights,
            avatar_dir: avatar_dir.into(),
            excluded: HashSet::new(),
        }
    }

    /// Treat the given avatar files as missing, e.g. files whose name was
    /// claimed by a different download.
    pub fn exclude_avatars<I>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.excluded.extend(names);
        self
    }

    pub fn thresholds(&self) -> &SignalThresholds {
        &self.thresholds
    }

    pub fn weights(&self) -> &SignalWeights {
        &self.weights
    }

    pub fn avatar_path(&self, profile: &Profile) -> Option<PathBuf> {
        if !profile.has_avatar() || self.excluded.contains(&profile.avatar_local_name) {
            return None;
        }
        Some(self.avatar_dir.join(&profile.avatar_local_name))
    }

    pub fn gates(&self, avatar_distance: f64, name_similarity: u8, bio_similarity: u8) -> SignalGates {
        SignalGates {
            avatar: avatar_distance <= self.thresholds.avatar,
            name: name_similarity >= self.thresholds.name,
            bio: bio_similarity >= self.thresholds.bio,
        }
    }

    pub fn composite(&self, gates: SignalGates) -> f64 {
        let mut score = 0.0;
        if gates.avatar {
            score += self.weights.avatar;
        }
        if gates.name {
            score += self.weights.name;
        }
        if gates.bio {
            score += self.weights.bio;
        }
        score
    }

    /// Score one candidate against its target
    pub fn score(&self, target: &Profile, candidate: &Profile) -> ScoredCandidate {
        let avatar_distance = match (self.avatar_path(target), self.avatar_path(candidate)) {
            (Some(a), Some(b)) => similarity::image_dissimilarity(&a, &b),
            _ => SENTINEL_DISTANCE,
        };
        self.finish(target, candidate, avatar_distance)
    }

    /// Score a whole candidate set, decoding the target's avatar only once
    pub fn score_all(&self, target: &Profile, candidates: &[Profile]) -> Vec<ScoredCandidate> {
        let target_histogram = self.avatar_path(target).and_then(|p| load_histogram(&p));

        candidates
            .iter()
            .map(|candidate| {
                let avatar_distance = match &target_histogram {
                    Some(t) => match self.avatar_path(candidate).and_then(|p| load_histogram(&p)) {
                        Some(c) => similarity::histogram_distance(t, &c),
                        None => SENTINEL_DISTANCE,
                    },
                    None => SENTINEL_DISTANCE,
                };
                self.finish(target, candidate, avatar_distance)
            })
            .collect()
    }

    fn finish(&self, target: &Profile, candidate: &Profile, avatar_distance: f64) -> ScoredCandidate {
        let name_similarity = similarity::string_similarity(&target.display_name, &candidate.display_name);
        let bio_similarity = similarity::string_similarity(&target.bio, &candidate.bio);
        let gates = self.gates(avatar_distance, name_similarity, bio_similarity);

        ScoredCandidate {
            profile: candidate.clone(),
            avatar_distance,
            name_similarity,
            bio_similarity,
            composite_score: self.composite(gates),
        }
    }
}

fn load_histogram(path: &Path) -> Option<Histogram> {
    similarity::grayscale_histogram(path).ok()
}
