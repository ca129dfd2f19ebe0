//! Diagnosis request assembly.
//!
//! Gathers the failure context shipped to the analysis service: recent pod
//! logs and the serialized pod manifest. Both are best-effort — a failed
//! fetch degrades the payload to a placeholder instead of failing the
//! pipeline, and the degradation is kept explicit in [`Payload`] so callers
//! and tests can tell "no logs happened" from "logs said nothing".

use crate::classifier::FailureReason;
use crate::diagnosis::AnalysisRequest;
use crate::pods::{PodIdentity, PodOps};
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, warn};

/// A gathered payload: either the real content or an explicit degraded
/// marker carrying the placeholder text and the original error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Full(String),
    Degraded { placeholder: String, error: String },
}

impl Payload {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// The text that goes on the wire.
    pub fn into_text(self) -> String {
        match self {
            Self::Full(text) | Self::Degraded {
                placeholder: text, ..
            } => text,
        }
    }
}

/// Fetch the last `tail_lines` lines of the pod's logs, best-effort.
pub async fn tail_logs(pods: &dyn PodOps, identity: &PodIdentity, tail_lines: i64) -> Payload {
    match pods.tail_logs(&identity.name, tail_lines).await {
        Ok(logs) if logs.is_empty() => Payload::Full("No logs available".to_string()),
        Ok(logs) => {
            debug!(
                "Extracted up to {} lines of logs for pod {}",
                tail_lines, identity
            );
            Payload::Full(logs)
        }
        Err(e) => {
            warn!("Failed to extract logs for pod {}: {}", identity, e);
            Payload::Degraded {
                placeholder: format!("Failed to retrieve logs: {e}"),
                error: e.to_string(),
            }
        }
    }
}

/// Render the pod object as a YAML manifest, best-effort.
pub fn render_manifest(pod: &Pod, identity: &PodIdentity) -> Payload {
    match serde_yaml::to_string(pod) {
        Ok(yaml) => Payload::Full(yaml),
        Err(e) => {
            warn!("Failed to render manifest for pod {}: {}", identity, e);
            Payload::Degraded {
                placeholder: format!("Failed to render pod manifest: {e}"),
                error: e.to_string(),
            }
        }
    }
}

/// Assemble the analysis request for a detected failure.
///
/// This stage cannot fail the pipeline; a sub-failure only degrades the
/// corresponding payload.
pub async fn gather(
    pods: &dyn PodOps,
    pod: &Pod,
    identity: &PodIdentity,
    reason: FailureReason,
    tail_lines: i64,
) -> AnalysisRequest {
    let logs = tail_logs(pods, identity, tail_lines).await;
    let manifest = render_manifest(pod, identity);

    AnalysisRequest {
        pod_name: identity.name.clone(),
        namespace: identity.namespace.clone(),
        failure_reason: reason.as_str().to_string(),
        logs: logs.into_text(),
        pod_yaml: manifest.into_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::pods::MockPodOps;
    use mockall::predicate::eq;

    fn identity() -> PodIdentity {
        PodIdentity::new("default", "web-1")
    }

    #[tokio::test]
    async fn gather_uses_real_logs_and_manifest() {
        let mut pods = MockPodOps::new();
        pods.expect_tail_logs()
            .with(eq("web-1"), eq(50))
            .returning(|_, _| Ok("panic: out of memory".to_string()));

        let request = gather(
            &pods,
            &Pod::default(),
            &identity(),
            FailureReason::OomKilled,
            50,
        )
        .await;

        assert_eq!(request.pod_name, "web-1");
        assert_eq!(request.namespace, "default");
        assert_eq!(request.failure_reason, "OOMKilled");
        assert_eq!(request.logs, "panic: out of memory");
        assert!(request.pod_yaml.contains("kind"));
    }

    #[tokio::test]
    async fn log_fetch_failure_degrades_to_placeholder() {
        let mut pods = MockPodOps::new();
        pods.expect_tail_logs()
            .returning(|_, _| Err(Error::Config("boom".to_string())));

        let logs = tail_logs(&pods, &identity(), 50).await;
        assert!(logs.is_degraded());
        assert!(logs.into_text().starts_with("Failed to retrieve logs:"));
    }

    #[tokio::test]
    async fn empty_logs_become_no_logs_available() {
        let mut pods = MockPodOps::new();
        pods.expect_tail_logs().returning(|_, _| Ok(String::new()));

        let logs = tail_logs(&pods, &identity(), 50).await;
        assert!(!logs.is_degraded());
        assert_eq!(logs.into_text(), "No logs available");
    }
}
