//! Remediation pipeline: decision gate, patch attempt, replace fallback.
//!
//! The decision gate is the single point controlling whether any cluster
//! state is touched: it runs before any patch or replace attempt and is
//! never bypassed. Below-threshold confidence and dry-run both terminate
//! the pipeline without a mutation.

pub mod patch;
pub mod replace;

use crate::classifier::FailureReason;
use crate::config::RemediatorConfig;
use crate::diagnosis::DiagnosisClient;
use crate::diagnostics;
use crate::error::Result;
use crate::pods::{PodIdentity, PodOps};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Shared state handed to every remediation task.
#[derive(Clone)]
pub struct Context {
    pub pods: Arc<dyn PodOps>,
    pub diagnosis: DiagnosisClient,
    pub config: Arc<RemediatorConfig>,
}

/// Outcome of gating a diagnosis against the confidence threshold and the
/// dry-run policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationDecision {
    /// Confidence clears the threshold; mutate the pod
    Apply,
    /// Below threshold; leave the cluster untouched
    Skip { reason: String },
    /// Would apply, but dry-run is active; log only
    Simulate,
}

/// Gate a diagnosis result. The threshold boundary is inclusive: a
/// confidence exactly equal to the threshold applies.
pub fn decide(confidence: f64, threshold: f64, dry_run: bool) -> RemediationDecision {
    if confidence < threshold {
        return RemediationDecision::Skip {
            reason: format!("confidence score {confidence} is below threshold {threshold}"),
        };
    }
    if dry_run {
        return RemediationDecision::Simulate;
    }
    RemediationDecision::Apply
}

/// Run the full pipeline for one detected failure: gather diagnostics,
/// call the diagnosis service, gate the result, and mutate if warranted.
///
/// The patch attempt is made first; any patch rejection triggers exactly
/// one replace-fallback attempt.
#[instrument(skip(ctx, pod), fields(pod = %identity, reason = %reason))]
pub async fn remediate(
    ctx: &Context,
    pod: &Pod,
    identity: &PodIdentity,
    reason: FailureReason,
) -> Result<()> {
    info!("Processing failure for pod {}", identity);

    let request = diagnostics::gather(
        ctx.pods.as_ref(),
        pod,
        identity,
        reason,
        ctx.config.log_tail_lines,
    )
    .await;

    // Single attempt; a diagnosis failure aborts this remediation only
    let analysis = ctx.diagnosis.analyze(&request).await?;
    info!(
        "Diagnosis for pod {}: {} (confidence {})",
        identity, analysis.root_cause, analysis.confidence_score
    );

    let fix = &analysis.suggested_fix_yaml;
    let unsupported = fix.unsupported_keys();
    if !unsupported.is_empty() {
        warn!(
            "Suggested fix for pod {} carries keys this controller does not act on \
             (passed through to the patch, dropped by a replace fallback): {}",
            identity,
            unsupported.join(", ")
        );
    }

    match decide(
        analysis.confidence_score,
        ctx.config.confidence_threshold,
        ctx.config.dry_run,
    ) {
        RemediationDecision::Skip { reason } => {
            warn!("Skipping auto-remediation for pod {}: {}", identity, reason);
            Ok(())
        }
        RemediationDecision::Simulate => {
            info!(
                "[DRY-RUN] Would apply patch to pod {}: {}",
                identity,
                serde_json::to_string(fix)?
            );
            Ok(())
        }
        RemediationDecision::Apply => {
            match patch::apply_patch(ctx.pods.as_ref(), identity, fix).await {
                Ok(resource_version) => {
                    info!(
                        "Successfully applied remediation patch to pod {}. New resource version: {}",
                        identity, resource_version
                    );
                    Ok(())
                }
                Err(e) => {
                    warn!(
                        "Failed to apply patch for pod {}: {}. Attempting force replace...",
                        identity, e
                    );
                    replace::replace_pod(ctx.pods.as_ref(), identity, pod, fix, &ctx.config).await
                }
            }
        }
    }
}
