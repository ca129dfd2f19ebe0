//! Pod API seam.
//!
//! Every call the remediation pipeline makes against the cluster goes
//! through the [`PodOps`] trait so the patch/replace machinery can be
//! exercised against scripted implementations in tests. [`KubePods`] is the
//! production implementation over a namespaced `kube::Api<Pod>`.

use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, LogParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::Value;
use std::fmt;

/// Stable `(namespace, name)` key used for lookups and logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodIdentity {
    pub namespace: String,
    pub name: String,
}

impl PodIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of a pod delivered by a watch event, falling back to the
    /// watched namespace when the object omits its own.
    pub fn from_pod(pod: &Pod, fallback_namespace: &str) -> Self {
        Self {
            namespace: pod
                .namespace()
                .unwrap_or_else(|| fallback_namespace.to_string()),
            name: pod.name_any(),
        }
    }
}

impl fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The pod-level primitives the remediation pipeline consumes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PodOps: Send + Sync {
    /// Fetch the last `tail_lines` lines of the pod's logs.
    async fn tail_logs(&self, name: &str, tail_lines: i64) -> Result<String>;

    /// Apply a strategic merge patch; returns the patched pod.
    async fn patch_strategic(&self, name: &str, patch: Value) -> Result<Pod>;

    /// Delete the pod by name.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Get the pod, or `None` once it is gone.
    async fn get_opt(&self, name: &str) -> Result<Option<Pod>>;

    /// Create a pod in the namespace.
    async fn create(&self, pod: &Pod) -> Result<Pod>;
}

/// Production [`PodOps`] over a namespaced pod API.
#[derive(Clone)]
pub struct KubePods {
    api: Api<Pod>,
}

impl KubePods {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl PodOps for KubePods {
    async fn tail_logs(&self, name: &str, tail_lines: i64) -> Result<String> {
        let params = LogParams {
            tail_lines: Some(tail_lines),
            ..LogParams::default()
        };
        Ok(self.api.logs(name, &params).await?)
    }

    async fn patch_strategic(&self, name: &str, patch: Value) -> Result<Pod> {
        let patched = self
            .api
            .patch(name, &PatchParams::default(), &Patch::Strategic(patch))
            .await?;
        Ok(patched)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn get_opt(&self, name: &str) -> Result<Option<Pod>> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn create(&self, pod: &Pod) -> Result<Pod> {
        Ok(self.api.create(&PostParams::default(), pod).await?)
    }
}
