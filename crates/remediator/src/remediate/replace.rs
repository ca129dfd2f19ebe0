//! Delete-and-recreate fallback for patches the API rejects.
//!
//! Standalone pods refuse in-place updates of fields like container
//! resource requests, so the fix is merged client-side into a copy of the
//! original spec, the live pod is deleted, and the copy is recreated once
//! the deletion has settled.
//!
//! There is no rollback: a failure after the delete but before the create
//! leaves the pod absent from the cluster until an external reconciler
//! (e.g. a parent controller) recreates it. That is an accepted risk of
//! this design and is logged, not hidden.

use crate::config::RemediatorConfig;
use crate::diagnosis::SuggestedFix;
use crate::error::{Error, Result};
use crate::pods::{PodIdentity, PodOps};
use k8s_openapi::api::core::v1::Pod;
use std::time::Duration;
use tracing::{error, info, warn};

/// Replace the live pod with a copy carrying the suggested fix.
pub async fn replace_pod(
    pods: &dyn PodOps,
    identity: &PodIdentity,
    original: &Pod,
    fix: &SuggestedFix,
    config: &RemediatorConfig,
) -> Result<()> {
    info!("Starting force replace for pod {}", identity);

    let mut replacement = original.clone();
    merge_fix(&mut replacement, fix, identity);
    strip_identity(&mut replacement);

    info!("Deleting old pod {}", identity);
    pods.delete(&identity.name).await?;

    info!("Waiting for pod {} to be fully deleted...", identity);
    if let Err(e) = wait_for_deletion(pods, identity, config).await {
        // The pod may already be gone; recreating on top of a live object
        // would fail anyway, so abort before the create.
        error!("{}", e);
        return Err(e);
    }

    info!("Creating new pod {}", identity);
    match pods.create(&replacement).await {
        Ok(_) => {
            info!(
                "Successfully recreated pod {} with applied remediation",
                identity
            );
            Ok(())
        }
        Err(e) => {
            error!(
                "Failed to recreate pod {} after deletion; the pod is absent until an external reconciler recreates it: {}",
                identity, e
            );
            Err(e)
        }
    }
}

/// Merge the suggested fix into the pod spec, field by field.
///
/// Only containers named in the override list are touched, and only the
/// fields explicitly present in an override (resources, image) are
/// overwritten. An override naming a container the pod does not have is
/// skipped; one bad override never sinks the others.
pub(crate) fn merge_fix(pod: &mut Pod, fix: &SuggestedFix, identity: &PodIdentity) {
    let Some(spec) = pod.spec.as_mut() else {
        warn!("Pod {} has no spec; nothing to merge", identity);
        return;
    };

    for override_entry in fix.container_overrides() {
        let Some(target) = spec
            .containers
            .iter_mut()
            .find(|c| c.name == override_entry.name)
        else {
            warn!(
                "Suggested fix names container '{}' which pod {} does not have; skipping it",
                override_entry.name, identity
            );
            continue;
        };

        if let Some(resources) = &override_entry.resources {
            target.resources = Some(resources.clone());
            info!(
                "Updated resources for container {} of pod {}",
                target.name, identity
            );
        }
        if let Some(image) = &override_entry.image {
            target.image = Some(image.clone());
            info!(
                "Updated image for container {} of pod {} to {}",
                target.name, identity, image
            );
        }
    }
}

/// Clear the server-assigned identity so the copy can be recreated.
pub(crate) fn strip_identity(pod: &mut Pod) {
    pod.metadata.resource_version = None;
    pod.metadata.uid = None;
    pod.metadata.creation_timestamp = None;
    pod.metadata.managed_fields = None;
    pod.status = None;
}

/// Poll for the pod's absence once per interval up to the configured
/// ceiling. Reaching the ceiling aborts the whole replace.
async fn wait_for_deletion(
    pods: &dyn PodOps,
    identity: &PodIdentity,
    config: &RemediatorConfig,
) -> Result<()> {
    let interval = Duration::from_secs(config.deletion_poll_interval_secs);
    let mut waited = Duration::ZERO;
    let ceiling = Duration::from_secs(config.deletion_timeout_secs);

    while waited < ceiling {
        if pods.get_opt(&identity.name).await?.is_none() {
            return Ok(());
        }
        tokio::time::sleep(interval).await;
        waited += interval;
    }

    Err(Error::DeletionTimeout {
        identity: identity.clone(),
        waited_secs: config.deletion_timeout_secs,
    })
}
