//! Per-account failure taxonomy.
//!
//! Every failure inside the pipeline is contained to one account (or one
//! candidate) and recorded as a [`PipelineError`] on that account's
//! diagnostic. Nothing here is batch-fatal.

use crate::acquire::AcquireError;
use crate::api::ApiError;
use crate::selector::SelectError;
use crate::store::StoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum PipelineError {
    #[error("external call failed: {0}")]
    ExternalCallFailure(String),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("no candidates found")]
    NoCandidates,

    #[error("resource I/O failure: {0}")]
    ResourceIoFailure(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<&ApiError> for PipelineError {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Malformed(_) | ApiError::Unsuccessful { .. } => {
                PipelineError::MalformedResponse(err.to_string())
            }
            _ => PipelineError::ExternalCallFailure(err.to_string()),
        }
    }
}

impl From<AcquireError> for PipelineError {
    fn from(err: AcquireError) -> Self {
        match &err {
            AcquireError::Lookup { source, .. } => match PipelineError::from(source) {
                PipelineError::MalformedResponse(_) => PipelineError::MalformedResponse(err.to_string()),
                _ => PipelineError::ExternalCallFailure(err.to_string()),
            },
            AcquireError::ProfileNotFound { .. } => PipelineError::ProfileNotFound(err.to_string()),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        PipelineError::ResourceIoFailure(err.to_string())
    }
}

impl From<SelectError> for PipelineError {
    fn from(err: SelectError) -> Self {
        match err {
            SelectError::NoCandidates => PipelineError::NoCandidates,
        }
    }
}
