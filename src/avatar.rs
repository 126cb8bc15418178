//! Avatar downloads into the shared avatar directory.
//!
//! Files are named after the owning handle, so concurrent workers write
//! disjoint paths. Each download lands in a hidden `.part` file first and is
//! renamed into place, so a reader never sees a half-written avatar.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("download returned status {0}")]
    Status(u16),

    #[error("could not write avatar: {0}")]
    Io(#[from] std::io::Error),

    #[error("refusing to write avatar to unsafe name '{0}'")]
    InvalidName(String),
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// Avatar written to disk
    Success { bytes: usize },
    /// Nothing to download (no avatar URL)
    Skipped,
    /// Download or write failed; the avatar is treated as absent
    Failure(FetchError),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}

pub struct AvatarFetcher {
    client: reqwest::Client,
    dir: PathBuf,
}

impl AvatarFetcher {
    /// Create a fetcher writing into `dir` (created if missing).
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(timeout)
            .build()?;
        Ok(Self { client, dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, destination_name: &str) -> PathBuf {
        self.dir.join(destination_name)
    }

    pub fn is_present(&self, destination_name: &str) -> bool {
        self.path_for(destination_name).is_file()
    }

    /// Download `url` into `destination_name`. Never retries.
    pub async fn fetch(&self, url: &str, destination_name: &str) -> FetchOutcome {
        if url.is_empty() {
            return FetchOutcome::Skipped;
        }

        match self.download(url, destination_name).await {
            Ok(bytes) => {
                debug!(url, file = destination_name, bytes, "Avatar saved");
                FetchOutcome::Success { bytes }
            }
            Err(e) => {
                warn!(url, file = destination_name, error = %e, "Avatar download failed");
                // A stale file from an earlier run must not stand in for a failed download
                if is_safe_file_name(destination_name) {
                    let _ = tokio::fs::remove_file(self.path_for(destination_name)).await;
                }
                FetchOutcome::Failure(e)
            }
        }
    }

    async fn download(&self, url: &str, destination_name: &str) -> Result<usize, FetchError> {
        if !is_safe_file_name(destination_name) {
            return Err(FetchError::InvalidName(destination_name.to_string()));
        }

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }
        let bytes = resp.bytes().await?;

        let final_path = self.path_for(destination_name);
        let part_path = self.dir.join(format!(".{}.part", destination_name));
        tokio::fs::write(&part_path, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&part_path, &final_path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(e.into());
        }

        Ok(bytes.len())
    }
}

/// A bare filename: no separators, no parent references, not hidden.
fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}
