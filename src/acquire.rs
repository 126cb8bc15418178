//! Candidate acquisition: resolve a target's profile, run the name and
//! handle searches, and merge the results into one deduplicated set.

use crate::api::{ApiError, DirectoryClient};
use crate::profile::Profile;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AcquireError {
    /// The lookup call itself failed
    #[error("profile lookup for @{handle} failed: {source}")]
    Lookup {
        handle: String,
        #[source]
        source: ApiError,
    },

    /// The lookup succeeded but carried no user object
    #[error("profile not found for @{handle}")]
    ProfileNotFound { handle: String },
}

pub struct CandidateAcquirer {
    client: Arc<DirectoryClient>,
}

impl CandidateAcquirer {
    pub fn new(client: Arc<DirectoryClient>) -> Self {
        Self { client }
    }

    /// Resolve `handle` and collect its candidate set.
    ///
    /// A failed search only costs that search's candidates; only a failed or
    /// empty profile lookup fails the account.
    pub async fn acquire(&self, handle: &str) -> Result<(Profile, Vec<Profile>), AcquireError> {
        let info = self
            .client
            .lookup_profile(handle)
            .await
            .map_err(|source| AcquireError::Lookup {
                handle: handle.to_string(),
                source,
            })?;

        let user = info.user.ok_or_else(|| AcquireError::ProfileNotFound {
            handle: handle.to_string(),
        })?;
        let profile = user.into_profile(handle, info.stats.as_ref());

        let mut merged = Vec::new();
        if !profile.display_name.is_empty() {
            merged.extend(self.search_or_empty(&profile.display_name).await);
        }
        merged.extend(self.search_or_empty(handle).await);

        let found = merged.len();
        let mut candidates = dedupe_candidates(merged, handle);
        if profile.handle != handle {
            candidates.retain(|c| c.handle != profile.handle);
        }

        info!(
            handle,
            found,
            unique = candidates.len(),
            "Collected candidate profiles"
        );
        Ok((profile, candidates))
    }

    async fn search_or_empty(&self, keyword: &str) -> Vec<Profile> {
        match self.client.search_profiles(keyword, self.client.page_size(), 0).await {
            Ok(profiles) => {
                debug!(keyword, count = profiles.len(), "Search returned profiles");
                profiles
            }
            Err(e) => {
                warn!(keyword, error = %e, "Search failed, continuing without its results");
                Vec::new()
            }
        }
    }
}

/// Keep the first occurrence of each handle, in order, and drop the target's own handle.
pub fn dedupe_candidates(candidates: Vec<Profile>, target_handle: &str) -> Vec<Profile> {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(target_handle.to_string());

    candidates
        .into_iter()
        .filter(|c| seen.insert(c.handle.clone()))
        .collect()
}
