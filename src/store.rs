// store.rs - Per-account intermediate state
//
// Each target account gets one JSON document holding its resolved profile,
// its candidate set and, once scored, the scored candidates. Later stages
// read these documents instead of re-fetching, so an interrupted run can be
// re-invoked and skip any account whose document already satisfies a stage.
//
// Documents are partitioned by handle. Workers of one stage only ever touch
// their own account's document and stages never overlap, so no locking is
// needed across or within accounts.

use crate::config::{SignalThresholds, SignalWeights};
use crate::profile::{Profile, ScoredCandidate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current document format version - bump when making breaking changes
pub const STATE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("State document {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Incompatible state version in {path}: file has {found}, expected {expected}")]
    IncompatibleVersion { path: PathBuf, found: u32, expected: u32 },
}

/// Everything the pipeline knows about one target account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountState {
    pub version: u32,

    /// UTC timestamp when the candidate set was acquired
    pub created_at: DateTime<Utc>,

    /// The target account's own profile
    pub profile: Profile,

    /// Deduplicated candidate set
    pub candidates: Vec<Profile>,

    /// Scored candidates, empty until the score stage has run
    #[serde(default)]
    pub scored_candidates: Vec<ScoredCandidate>,

    /// Hash of thresholds and weights the scores were computed with
    #[serde(default)]
    pub settings_hash: Option<String>,

    /// Set once a report has been written from this document. A reported
    /// document is kept for inspection only and is never resumed from.
    #[serde(default)]
    pub reported: bool,
}

impl AccountState {
    pub fn new(profile: Profile, candidates: Vec<Profile>) -> Self {
        Self {
            version: STATE_VERSION,
            created_at: Utc::now(),
            profile,
            candidates,
            scored_candidates: Vec::new(),
            settings_hash: None,
            reported: false,
        }
    }

    /// Local avatar filenames the scores of this account depend on
    pub fn avatar_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(&self.profile)
            .chain(self.candidates.iter())
            .filter(|p| p.has_avatar())
            .map(|p| p.avatar_local_name.as_str())
    }

    /// True when a run can pick this document up where it left off
    pub fn is_resumable(&self) -> bool {
        !self.reported
    }

    /// Replace the candidate set, dropping any scores computed for the old one
    pub fn set_candidates(&mut self, candidates: Vec<Profile>) {
        self.candidates = candidates;
        self.clear_scores();
    }

    pub fn record_scores(&mut self, scored: Vec<ScoredCandidate>, settings_hash: String) {
        self.scored_candidates = scored;
        self.settings_hash = Some(settings_hash);
    }

    pub fn clear_scores(&mut self) {
        self.scored_candidates.clear();
        self.settings_hash = None;
    }

    /// True when every candidate was scored with the given settings
    pub fn is_scored_with(&self, settings_hash: &str) -> bool {
        self.settings_hash.as_deref() == Some(settings_hash)
            && self.scored_candidates.len() == self.candidates.len()
    }
}

/// Directory of per-account state documents
#[derive(Debug, Clone)]
pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    /// Open (and create if needed) a state directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Document path for an account
    pub fn state_path(&self, handle: &str) -> PathBuf {
        self.dir.join(format!("{}.json", handle))
    }

    pub fn exists(&self, handle: &str) -> bool {
        self.state_path(handle).exists()
    }

    pub fn load(&self, handle: &str) -> Result<AccountState, StoreError> {
        let path = self.state_path(handle);
        let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let state: AccountState = serde_json::from_str(&content).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        if state.version != STATE_VERSION {
            return Err(StoreError::IncompatibleVersion {
                path,
                found: state.version,
                expected: STATE_VERSION,
            });
        }
        Ok(state)
    }

    /// Save a document using atomic write
    /// (write to temp file, then rename so readers never see a partial document)
    pub fn save(&self, handle: &str, state: &AccountState) -> Result<(), StoreError> {
        let path = self.state_path(handle);
        let temp_path = self.dir.join(format!(".{}.json.tmp", handle));
        let content = serde_json::to_string_pretty(state).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        {
            let mut file = std::fs::File::create(&temp_path).map_err(io_err)?;
            io::Write::write_all(&mut file, content.as_bytes()).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        std::fs::rename(&temp_path, &path).map_err(io_err)?;

        Ok(())
    }

    /// Delete an account's document (called on successful completion)
    pub fn delete(&self, handle: &str) -> Result<(), StoreError> {
        let path = self.state_path(handle);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|source| StoreError::Io { path, source })?;
        }
        Ok(())
    }
}

/// Generate a settings hash so resumed runs re-score when gates or weights change
pub fn generate_settings_hash(thresholds: &SignalThresholds, weights: &SignalWeights) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    thresholds.avatar.to_bits().hash(&mut hasher);
    thresholds.name.hash(&mut hasher);
    thresholds.bio.hash(&mut hasher);
    weights.avatar.to_bits().hash(&mut hasher);
    weights.name.to_bits().hash(&mut hasher);
    weights.bio.to_bits().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
