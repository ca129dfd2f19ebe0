//! Error taxonomy for the remediation pipeline.
//!
//! Watch-stream closure is handled inside the supervisor (resubscribe) and
//! never surfaces here; everything else is fatal to a single remediation
//! attempt at most. No error in this module crashes the controller process.

use crate::pods::PodIdentity;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Diagnosis request failed: {0}")]
    DiagnosisRequest(#[from] reqwest::Error),

    #[error("Diagnosis service returned {status}: {body}")]
    DiagnosisStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timed out after {waited_secs}s waiting for pod {identity} to be deleted")]
    DeletionTimeout {
        identity: PodIdentity,
        waited_secs: u64,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}
