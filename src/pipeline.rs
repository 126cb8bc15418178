//! Stage coordinator.
//!
//! A run moves every account through
//! `Init -> Acquire -> Dedupe -> FetchAvatars -> Score -> Select -> Report -> Done`.
//! Each fan-out stage submits one task per account (per avatar for
//! `FetchAvatars`) to the worker pool and waits for all of them before the
//! next stage starts, so no two stages of one account ever run at once and
//! the per-account state documents need no locking.
//!
//! An account that fails a stage is dropped from the later stages and
//! recorded as an [`AccountDiagnostic`]; the batch carries on.

use crate::acquire::{dedupe_candidates, CandidateAcquirer};
use crate::api::DirectoryClient;
use crate::avatar::{AvatarFetcher, FetchOutcome};
use crate::batch::dedupe_handles;
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::export::export_csv;
use crate::logger::AnalysisLogger;
use crate::pool::WorkerPool;
use crate::profile::{MatchResult, Profile};
use crate::scoring::ScoringEngine;
use crate::selector::select;
use crate::store::{generate_settings_hash, AccountState, RunStore};
use anyhow::Context;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Init,
    Acquire,
    Dedupe,
    FetchAvatars,
    Score,
    Select,
    Report,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "Init",
            Stage::Acquire => "Acquire",
            Stage::Dedupe => "Dedupe",
            Stage::FetchAvatars => "FetchAvatars",
            Stage::Score => "Score",
            Stage::Select => "Select",
            Stage::Report => "Report",
            Stage::Done => "Done",
        };
        f.write_str(name)
    }
}

/// Why an account has no (or only a degenerate) result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountDiagnostic {
    pub handle: String,
    pub stage: Stage,
    pub error: PipelineError,
}

/// Avatar download counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchTally {
    /// Distinct avatar files the run needed
    pub planned: usize,
    pub downloaded: usize,
    /// Already on disk from an earlier run
    pub reused: usize,
    pub failed: usize,
    /// Profiles with no avatar URL
    pub without_url: usize,
    /// Same file requested by more than one account
    pub duplicates: usize,
    /// Filename already claimed by a different profile
    pub conflicts: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// One row per account that reached `Select`, in input order
    pub results: Vec<MatchResult>,
    pub diagnostics: Vec<AccountDiagnostic>,
    pub avatars: FetchTally,
}

impl RunOutcome {
    pub fn suspected_fakes(&self) -> usize {
        self.results.iter().filter(|r| r.is_suspected_fake).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarJob {
    pub url: String,
    pub file_name: String,
}

/// What the `FetchAvatars` stage hands to `Score`
struct FetchedAvatars {
    /// Accounts still in the run, input order
    accounts: Vec<String>,
    /// Filenames that lost a collision
    rejected: HashSet<String>,
    /// Filenames downloaded or failed during this run
    changed: HashSet<String>,
}

/// Download plan for the `FetchAvatars` stage
#[derive(Debug, Default)]
pub struct AvatarPlan {
    pub jobs: Vec<AvatarJob>,
    pub without_url: usize,
    pub duplicates: usize,
    /// Filenames that lost a case-insensitive collision; scored as missing
    pub rejected: HashSet<String>,
}

/// Collapse every profile's avatar into one job per file.
///
/// Filenames are compared case-insensitively so two handles differing only
/// by case never write the same path on a case-insensitive filesystem. The
/// first claimant keeps the file and later claimants are rejected.
pub fn plan_avatar_jobs<'a>(profiles: impl IntoIterator<Item = &'a Profile>) -> AvatarPlan {
    let mut plan = AvatarPlan::default();
    let mut claimed: HashMap<String, String> = HashMap::new();

    for profile in profiles {
        if !profile.has_avatar() {
            plan.without_url += 1;
            continue;
        }

        let key = profile.avatar_local_name.to_lowercase();
        match claimed.get(&key) {
            None => {
                claimed.insert(key, profile.avatar_local_name.clone());
                plan.jobs.push(AvatarJob {
                    url: profile.avatar_url.clone(),
                    file_name: profile.avatar_local_name.clone(),
                });
            }
            Some(owner) if *owner == profile.avatar_local_name => plan.duplicates += 1,
            Some(owner) => {
                warn!(
                    file = %profile.avatar_local_name,
                    claimed_by = %owner,
                    "Avatar filename collides with another profile, treating avatar as missing"
                );
                plan.rejected.insert(profile.avatar_local_name.clone());
            }
        }
    }

    plan
}

pub struct Pipeline {
    acquirer: CandidateAcquirer,
    fetcher: AvatarFetcher,
    engine: ScoringEngine,
    store: RunStore,
    pool: WorkerPool,
    logger: AnalysisLogger,
    min_fake_score: f64,
    settings_hash: String,
    resume: bool,
}

impl Pipeline {
    pub fn new(config: &AppConfig, logger: AnalysisLogger) -> anyhow::Result<Self> {
        let client = DirectoryClient::new(&config.api, &config.http)
            .context("Failed to build directory API client")?;
        let fetcher = AvatarFetcher::new(
            config.output.avatar_dir(),
            config.http.request_timeout(),
            &config.http.user_agent,
        )
        .context("Failed to prepare avatar directory")?;
        let store = RunStore::open(config.output.json_dir()).context("Failed to prepare state directory")?;

        Ok(Self {
            acquirer: CandidateAcquirer::new(Arc::new(client)),
            fetcher,
            engine: ScoringEngine::new(config.thresholds, config.weights, config.output.avatar_dir()),
            store,
            pool: WorkerPool::new(config.analysis.worker_count),
            logger,
            min_fake_score: config.analysis.min_fake_score,
            settings_hash: generate_settings_hash(&config.thresholds, &config.weights),
            resume: true,
        })
    }

    /// Resume from existing state documents and avatars (default), or redo everything
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// Run every stage up to `Select` for the given handles.
    pub async fn run(&self, handles: &[String]) -> RunOutcome {
        let mut outcome = RunOutcome::default();

        let accounts = dedupe_handles(handles.to_vec());
        info!(stage = %Stage::Init, accounts = accounts.len(), resume = self.resume, "Pipeline starting");

        let accounts = self.acquire_stage(&accounts, &mut outcome.diagnostics).await;
        let accounts = self.dedupe_stage(&accounts, &mut outcome.diagnostics).await;
        let fetched = self
            .fetch_stage(&accounts, &mut outcome.avatars, &mut outcome.diagnostics)
            .await;
        let accounts = self.score_stage(fetched, &mut outcome.diagnostics).await;
        outcome.results = self.select_stage(&accounts, &mut outcome.diagnostics).await;

        info!(
            results = outcome.results.len(),
            dropped = outcome.diagnostics.len(),
            "Pipeline finished"
        );
        outcome
    }

    /// `Report`: write the CSV, then delete the reported accounts' state
    /// documents, or mark them finished when they are kept.
    pub fn report(&self, outcome: &RunOutcome, base_url: &str, keep_state: bool, path: &Path) -> anyhow::Result<()> {
        info!(stage = %Stage::Report, path = %path.display(), "Writing report");
        export_csv(&outcome.results, base_url, path)?;
        self.logger.log_export_success(&path.display().to_string(), outcome.results.len());

        for result in &outcome.results {
            let handle = &result.target_handle;
            let cleaned = if keep_state {
                self.store.load(handle).and_then(|mut state| {
                    state.reported = true;
                    self.store.save(handle, &state)
                })
            } else {
                self.store.delete(handle)
            };
            if let Err(e) = cleaned {
                warn!(handle = %handle, error = %e, "Could not finalize state document");
            }
        }

        debug!(stage = %Stage::Done, "Report complete");
        Ok(())
    }

    async fn acquire_stage(&self, handles: &[String], diagnostics: &mut Vec<AccountDiagnostic>) -> Vec<String> {
        self.logger.start_stage("Acquiring candidates", handles.len() as u64).await;
        let results = self
            .pool
            .run_batch(handles, |handle| async move {
                let result = self.acquire_account(handle).await;
                self.logger.advance_progress(1).await;
                (handle.clone(), result)
            })
            .await;
        let kept = self.keep_succeeded(handles, results, Stage::Acquire, diagnostics);
        self.logger
            .finish_stage(&format!("Acquired candidates for {}/{} accounts", kept.len(), handles.len()))
            .await;
        kept
    }

    async fn acquire_account(&self, handle: &str) -> Result<(), PipelineError> {
        if self.resume && self.store.exists(handle) {
            match self.store.load(handle) {
                Ok(state) if state.is_resumable() => {
                    debug!(handle, "Reusing stored candidate set");
                    return Ok(());
                }
                Ok(_) => debug!(handle, "Stored state belongs to a finished run, acquiring again"),
                Err(e) => warn!(handle, error = %e, "Stored state unusable, acquiring again"),
            }
        }

        let (profile, candidates) = self.acquirer.acquire(handle).await?;
        self.store.save(handle, &AccountState::new(profile, candidates))?;
        Ok(())
    }

    async fn dedupe_stage(&self, handles: &[String], diagnostics: &mut Vec<AccountDiagnostic>) -> Vec<String> {
        self.logger.start_stage("Deduplicating candidates", handles.len() as u64).await;
        let results = self
            .pool
            .run_batch(handles, |handle| async move {
                let result = self.dedupe_account(handle);
                self.logger.advance_progress(1).await;
                (handle.clone(), result)
            })
            .await;
        let kept = self.keep_succeeded(handles, results, Stage::Dedupe, diagnostics);
        self.logger.finish_stage("Candidate sets deduplicated").await;
        kept
    }

    fn dedupe_account(&self, handle: &str) -> Result<(), PipelineError> {
        let mut state = self.store.load(handle)?;
        let before = state.candidates.len();

        let mut candidates = dedupe_candidates(state.candidates.clone(), handle);
        if state.profile.handle != handle {
            candidates.retain(|c| c.handle != state.profile.handle);
        }

        if candidates.len() != before {
            debug!(handle, before, after = candidates.len(), "Dropped duplicate candidates");
            state.set_candidates(candidates);
            self.store.save(handle, &state)?;
        }
        Ok(())
    }

    async fn fetch_stage(
        &self,
        handles: &[String],
        tally: &mut FetchTally,
        diagnostics: &mut Vec<AccountDiagnostic>,
    ) -> FetchedAvatars {
        let mut kept = Vec::with_capacity(handles.len());
        let mut states = Vec::with_capacity(handles.len());
        for handle in handles {
            match self.store.load(handle) {
                Ok(state) => {
                    kept.push(handle.clone());
                    states.push(state);
                }
                Err(e) => self.record_failure(diagnostics, handle, Stage::FetchAvatars, e.into()),
            }
        }

        let plan = plan_avatar_jobs(
            states
                .iter()
                .flat_map(|s| std::iter::once(&s.profile).chain(s.candidates.iter())),
        );
        tally.planned = plan.jobs.len();
        tally.without_url = plan.without_url;
        tally.duplicates = plan.duplicates;
        tally.conflicts = plan.rejected.len();

        let (reused, pending): (Vec<AvatarJob>, Vec<AvatarJob>) = plan
            .jobs
            .into_iter()
            .partition(|job| self.resume && self.fetcher.is_present(&job.file_name));
        tally.reused = reused.len();

        self.logger.start_stage("Downloading avatars", pending.len() as u64).await;
        let outcomes = self
            .pool
            .run_batch(pending, |job| async move {
                let outcome = self.fetcher.fetch(&job.url, &job.file_name).await;
                self.logger.advance_progress(1).await;
                (job.file_name, outcome)
            })
            .await;

        let mut changed = HashSet::new();
        for (file_name, outcome) in outcomes {
            match outcome {
                FetchOutcome::Success { .. } => tally.downloaded += 1,
                FetchOutcome::Failure(_) => tally.failed += 1,
                FetchOutcome::Skipped => {
                    tally.without_url += 1;
                    continue;
                }
            }
            changed.insert(file_name);
        }
        self.logger.record_avatar_tally(tally.downloaded + tally.reused, tally.failed);
        self.logger
            .finish_stage(&format!(
                "Avatars: {} downloaded, {} reused, {} failed",
                tally.downloaded, tally.reused, tally.failed
            ))
            .await;

        FetchedAvatars {
            accounts: kept,
            rejected: plan.rejected,
            changed,
        }
    }

    async fn score_stage(&self, fetched: FetchedAvatars, diagnostics: &mut Vec<AccountDiagnostic>) -> Vec<String> {
        let FetchedAvatars {
            accounts: handles,
            rejected,
            changed,
        } = fetched;
        let engine = Arc::new(self.engine.clone().exclude_avatars(rejected));
        let changed = &changed;

        self.logger.start_stage("Scoring candidates", handles.len() as u64).await;
        let results = self
            .pool
            .run_batch(&handles, |handle| {
                let engine = engine.clone();
                async move {
                    let result = self.score_account(handle, engine, changed).await;
                    self.logger.advance_progress(1).await;
                    (handle.clone(), result)
                }
            })
            .await;
        let kept = self.keep_succeeded(&handles, results, Stage::Score, diagnostics);
        self.logger.finish_stage("Scoring complete").await;
        kept
    }

    async fn score_account(
        &self,
        handle: &str,
        engine: Arc<ScoringEngine>,
        changed_avatars: &HashSet<String>,
    ) -> Result<(), PipelineError> {
        let mut state = self.store.load(handle)?;
        if self.resume && state.is_scored_with(&self.settings_hash) {
            if !state.avatar_names().any(|name| changed_avatars.contains(name)) {
                debug!(handle, "Reusing stored scores");
                return Ok(());
            }
            debug!(handle, "Avatars changed since the stored scores, scoring again");
        }

        let profile = state.profile.clone();
        let candidates = state.candidates.clone();
        // Image decoding is CPU-bound; keep it off the async workers
        let scored = tokio::task::spawn_blocking(move || engine.score_all(&profile, &candidates))
            .await
            .map_err(|e| PipelineError::ResourceIoFailure(format!("scoring task failed: {}", e)))?;

        debug!(handle, scored = scored.len(), "Scored candidates");
        state.record_scores(scored, self.settings_hash.clone());
        self.store.save(handle, &state)?;
        Ok(())
    }

    async fn select_stage(&self, handles: &[String], diagnostics: &mut Vec<AccountDiagnostic>) -> Vec<MatchResult> {
        self.logger.start_stage("Selecting best matches", handles.len() as u64).await;
        let selected: HashMap<String, Result<MatchResult, PipelineError>> = self
            .pool
            .run_batch(handles, |handle| async move {
                let result = self.select_account(handle);
                self.logger.advance_progress(1).await;
                (handle.clone(), result)
            })
            .await
            .into_iter()
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match selected.get(handle) {
                Some(Ok(result)) => {
                    self.logger.log_match(
                        handle,
                        &result.matched_handle,
                        result.composite_score,
                        result.is_suspected_fake,
                    );
                    results.push(result.clone());
                }
                Some(Err(PipelineError::NoCandidates)) => {
                    self.logger.log_no_candidates(handle);
                    results.push(MatchResult::no_candidates(handle));
                    diagnostics.push(AccountDiagnostic {
                        handle: handle.clone(),
                        stage: Stage::Select,
                        error: PipelineError::NoCandidates,
                    });
                }
                Some(Err(e)) => self.record_failure(diagnostics, handle, Stage::Select, e.clone()),
                None => {}
            }
        }

        self.logger
            .finish_stage(&format!("Selected matches for {} accounts", results.len()))
            .await;
        results
    }

    fn select_account(&self, handle: &str) -> Result<MatchResult, PipelineError> {
        let state = self.store.load(handle)?;
        let best = select(&state.scored_candidates).map_err(PipelineError::from)?;
        Ok(MatchResult::from_candidate(handle, best, self.min_fake_score))
    }

    /// Split stage results into survivors (input order) and diagnostics.
    fn keep_succeeded(
        &self,
        handles: &[String],
        results: Vec<(String, Result<(), PipelineError>)>,
        stage: Stage,
        diagnostics: &mut Vec<AccountDiagnostic>,
    ) -> Vec<String> {
        let mut failed: HashMap<String, PipelineError> = results
            .into_iter()
            .filter_map(|(handle, result)| result.err().map(|e| (handle, e)))
            .collect();

        handles
            .iter()
            .filter(|handle| match failed.remove(handle.as_str()) {
                Some(error) => {
                    self.record_failure(diagnostics, handle, stage, error);
                    false
                }
                None => true,
            })
            .cloned()
            .collect()
    }

    fn record_failure(
        &self,
        diagnostics: &mut Vec<AccountDiagnostic>,
        handle: &str,
        stage: Stage,
        error: PipelineError,
    ) {
        warn!(handle, stage = %stage, error = %error, "Account dropped");
        self.logger.log_account_failed(handle, &stage.to_string(), &error.to_string());
        diagnostics.push(AccountDiagnostic {
            handle: handle.to_string(),
            stage,
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(handle: &str, url: &str) -> Profile {
        Profile::new(handle, "", "", url)
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::FetchAvatars.to_string(), "FetchAvatars");
        assert_eq!(Stage::Select.to_string(), "Select");
    }

    #[test]
    fn test_plan_dedupes_same_file() {
        let profiles = vec![p("alice", "https://cdn/a1"), p("bob", "https://cdn/b"), p("alice", "https://cdn/a2")];
        let plan = plan_avatar_jobs(&profiles);

        assert_eq!(plan.jobs.len(), 2);
        assert_eq!(plan.jobs[0], AvatarJob { url: "https://cdn/a1".into(), file_name: "alice.jpeg".into() });
        assert_eq!(plan.duplicates, 1);
        assert!(plan.rejected.is_empty());
    }

    #[test]
    fn test_plan_rejects_case_collision() {
        let profiles = vec![p("Alice", "https://cdn/1"), p("alice", "https://cdn/2")];
        let plan = plan_avatar_jobs(&profiles);

        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.jobs[0].file_name, "Alice.jpeg");
        assert!(plan.rejected.contains("alice.jpeg"));
    }

    #[test]
    fn test_plan_counts_missing_urls() {
        let profiles = vec![p("a", ""), p("b", ""), p("c", "https://cdn/c")];
        let plan = plan_avatar_jobs(&profiles);
        assert_eq!(plan.without_url, 2);
        assert_eq!(plan.jobs.len(), 1);
    }

    #[test]
    fn test_plan_file_names_are_disjoint() {
        let profiles: Vec<Profile> = (0..20)
            .map(|i| p(&format!("user{}", i % 7), &format!("https://cdn/{}", i)))
            .collect();
        let plan = plan_avatar_jobs(&profiles);

        let names: HashSet<String> = plan.jobs.iter().map(|j| j.file_name.to_lowercase()).collect();
        assert_eq!(names.len(), plan.jobs.len());
        assert_eq!(plan.jobs.len(), 7);
    }
}
