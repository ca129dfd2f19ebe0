//! Failure classification from pod status snapshots.
//!
//! A pure function over the pod object delivered with a watch event: no
//! I/O, no logging. Container statuses are inspected in order; for each,
//! the current waiting reason, the current terminated reason, and the
//! last-known terminated reason are checked against the fixed failure set.
//! The first match wins; there is no aggregation across containers.

use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of container failure reasons this controller acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    CrashLoopBackOff,
    #[serde(rename = "OOMKilled")]
    OomKilled,
    ImagePullBackOff,
    Error,
    Failed,
}

impl FailureReason {
    /// Map a Kubernetes status reason string onto the failure set.
    pub fn from_reason(reason: &str) -> Option<Self> {
        match reason {
            "CrashLoopBackOff" => Some(Self::CrashLoopBackOff),
            "OOMKilled" => Some(Self::OomKilled),
            "ImagePullBackOff" => Some(Self::ImagePullBackOff),
            "Error" => Some(Self::Error),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// The reason exactly as Kubernetes spells it.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CrashLoopBackOff => "CrashLoopBackOff",
            Self::OomKilled => "OOMKilled",
            Self::ImagePullBackOff => "ImagePullBackOff",
            Self::Error => "Error",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a pod status snapshot; `None` means healthy.
pub fn classify(pod: &Pod) -> Option<FailureReason> {
    let statuses = pod.status.as_ref()?.container_statuses.as_ref()?;

    for container_status in statuses {
        if let Some(state) = &container_status.state {
            // Waiting state carries CrashLoopBackOff / ImagePullBackOff
            if let Some(waiting) = &state.waiting {
                if let Some(reason) = waiting.reason.as_deref().and_then(FailureReason::from_reason)
                {
                    return Some(reason);
                }
            }

            // Terminated state carries OOMKilled / Error
            if let Some(terminated) = &state.terminated {
                if let Some(reason) = terminated
                    .reason
                    .as_deref()
                    .and_then(FailureReason::from_reason)
                {
                    return Some(reason);
                }
            }
        }

        // Last terminated state catches recent failures already restarted past
        if let Some(last_state) = &container_status.last_state {
            if let Some(terminated) = &last_state.terminated {
                if let Some(reason) = terminated
                    .reason
                    .as_deref()
                    .and_then(FailureReason::from_reason)
                {
                    return Some(reason);
                }
            }
        }
    }

    None
}
