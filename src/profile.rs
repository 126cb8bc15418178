//! Profile data model shared by every pipeline stage.
//!
//! A [`Profile`] describes either a target account or one of its candidates.
//! Scoring turns a candidate into a [`ScoredCandidate`], and selection turns a
//! target's scored candidates into one [`MatchResult`].

use serde::{Deserialize, Serialize};

/// Extension used for every locally stored avatar.
pub const AVATAR_EXTENSION: &str = "jpeg";

/// Handle written in place of a match when a target had nothing to choose from.
pub const NO_MATCH_PLACEHOLDER: &str = "no-candidates-found";

/// Derive the local avatar filename for a handle.
///
/// The name is the bare handle plus extension, so two handles that only
/// differ by case collide on case-insensitive filesystems. The fetch stage
/// rejects the second claimant of a filename instead of overwriting it.
pub fn avatar_file_name(handle: &str) -> String {
    format!("{}.{}", handle, AVATAR_EXTENSION)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Profile {
    pub handle: String,
    pub display_name: String,
    pub bio: String,
    pub avatar_url: String,
    /// Filename under the avatar directory; fixed at construction.
    pub avatar_local_name: String,
    #[serde(default)]
    pub follower_count: u64,
}

impl Profile {
    pub fn new(
        handle: impl Into<String>,
        display_name: impl Into<String>,
        bio: impl Into<String>,
        avatar_url: impl Into<String>,
    ) -> Self {
        let handle = handle.into();
        let avatar_local_name = avatar_file_name(&handle);
        Self {
            handle,
            display_name: display_name.into(),
            bio: bio.into(),
            avatar_url: avatar_url.into(),
            avatar_local_name,
            follower_count: 0,
        }
    }

    pub fn with_follower_count(mut self, follower_count: u64) -> Self {
        self.follower_count = follower_count;
        self
    }

    pub fn has_avatar(&self) -> bool {
        !self.avatar_url.is_empty()
    }
}

/// A candidate profile together with its three similarity signals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub profile: Profile,
    /// Histogram distance between avatars, 0 = identical.
    pub avatar_distance: f64,
    pub name_similarity: u8,
    pub bio_similarity: u8,
    /// Sum of the weights of every signal that passed its gate.
    pub composite_score: f64,
}

impl ScoredCandidate {
    pub fn handle(&self) -> &str {
        &self.profile.handle
    }
}

/// Terminal output for one target account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    pub target_handle: String,
    pub matched_handle: String,
    pub composite_score: f64,
    pub is_suspected_fake: bool,
}

impl MatchResult {
    pub fn from_candidate(target_handle: &str, best: &ScoredCandidate, min_fake_score: f64) -> Self {
        Self {
            target_handle: target_handle.to_string(),
            matched_handle: best.profile.handle.clone(),
            composite_score: best.composite_score,
            is_suspected_fake: best.composite_score >= min_fake_score,
        }
    }

    /// Result row for a target whose candidate set came back empty.
    pub fn no_candidates(target_handle: &str) -> Self {
        Self {
            target_handle: target_handle.to_string(),
            matched_handle: NO_MATCH_PLACEHOLDER.to_string(),
            composite_score: 0.0,
            is_suspected_fake: false,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.matched_handle == NO_MATCH_PLACEHOLDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avatar_name_derived_from_handle() {
        let profile = Profile::new("alice", "Alice A", "hi", "https://cdn.example.com/a.jpeg");
        assert_eq!(profile.avatar_local_name, "alice.jpeg");
        assert!(profile.has_avatar());
    }

    #[test]
    fn test_profile_without_avatar() {
        let profile = Profile::new("bob", "", "", "");
        assert!(!profile.has_avatar());
        assert_eq!(profile.avatar_local_name, "bob.jpeg");
    }

    #[test]
    fn test_scored_candidate_serializes_flat() {
        let scored = ScoredCandidate {
            profile: Profile::new("alice2", "Alice A", "hi", ""),
            avatar_distance: 12.5,
            name_similarity: 100,
            bio_similarity: 100,
            composite_score: 2.0,
        };
        let value = serde_json::to_value(&scored).unwrap();
        assert_eq!(value["handle"], "alice2");
        assert_eq!(value["composite_score"], 2.0);

        let back: ScoredCandidate = serde_json::from_value(value).unwrap();
        assert_eq!(back, scored);
    }

    #[test]
    fn test_match_result_status_uses_min_fake_score() {
        let scored = ScoredCandidate {
            profile: Profile::new("alice2", "Alice A", "hi", ""),
            avatar_distance: 0.0,
            name_similarity: 100,
            bio_similarity: 100,
            composite_score: 2.0,
        };
        assert!(MatchResult::from_candidate("alice", &scored, 2.0).is_suspected_fake);
        assert!(!MatchResult::from_candidate("alice", &scored, 2.5).is_suspected_fake);
    }

    #[test]
    fn test_no_candidates_result() {
        let result = MatchResult::no_candidates("carol");
        assert_eq!(result.composite_score, 0.0);
        assert!(!result.is_suspected_fake);
        assert!(result.is_placeholder());
    }
}
