//! In-place strategic merge patch of the live pod.

use crate::diagnosis::SuggestedFix;
use crate::error::Result;
use crate::pods::{PodIdentity, PodOps};
use tracing::info;

/// Serialize the suggested fix and apply it as a strategic merge patch.
///
/// Returns the patched pod's resource version. Any API rejection
/// (conflict, validation, immutable field) is returned to the caller;
/// the fallback decision lives there, not here, and there is no retry.
pub async fn apply_patch(
    pods: &dyn PodOps,
    identity: &PodIdentity,
    fix: &SuggestedFix,
) -> Result<String> {
    info!("Applying remediation patch to pod {}", identity);

    let patch = serde_json::to_value(fix)?;
    let patched = pods.patch_strategic(&identity.name, patch).await?;

    Ok(patched.metadata.resource_version.unwrap_or_default())
}
