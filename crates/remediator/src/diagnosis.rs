//! Diagnosis service boundary.
//!
//! Wire types for `POST {base_url}/analyze` and the HTTP client that calls
//! it. The suggested fix comes back as a structured patch document; only
//! per-container `resources` and `image` overrides are recognized, and any
//! other key is surfaced through [`SuggestedFix::unsupported_keys`] instead
//! of being silently dropped.

use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::ResourceRequirements;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Request body for the analysis endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Name of the failed pod
    pub pod_name: String,
    /// Kubernetes namespace
    pub namespace: String,
    /// Detected failure reason (e.g. "OOMKilled")
    pub failure_reason: String,
    /// Pod logs, last N lines (possibly a placeholder when retrieval failed)
    pub logs: String,
    /// Pod manifest rendered as YAML (possibly a placeholder)
    pub pod_yaml: String,
}

/// Response body containing the diagnosis and remediation suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Root cause analysis of the failure
    pub root_cause: String,
    /// Structured patch document to fix the issue
    pub suggested_fix_yaml: SuggestedFix,
    /// Confidence score in 0-100
    pub confidence_score: f64,
}

/// Suggested-fix patch document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestedFix {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<FixSpec>,

    /// Top-level keys this controller does not act on
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

/// `spec` section of a suggested fix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixSpec {
    #[serde(default)]
    pub containers: Vec<ContainerOverride>,

    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

/// Per-container override; only fields present here are applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerOverride {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

impl SuggestedFix {
    /// Container overrides carried by the fix, empty when there are none.
    pub fn container_overrides(&self) -> &[ContainerOverride] {
        match &self.spec {
            Some(spec) => &spec.containers,
            None => &[],
        }
    }

    /// Dotted paths of every key the controller does not recognize.
    pub fn unsupported_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.unknown.keys().cloned().collect();
        if let Some(spec) = &self.spec {
            keys.extend(spec.unknown.keys().map(|k| format!("spec.{k}")));
            for container in &spec.containers {
                keys.extend(
                    container
                        .unknown
                        .keys()
                        .map(|k| format!("spec.containers[{}].{k}", container.name)),
                );
            }
        }
        keys
    }
}

/// HTTP client for the diagnosis service.
#[derive(Clone)]
pub struct DiagnosisClient {
    http: reqwest::Client,
    base_url: String,
}

impl DiagnosisClient {
    /// Build a client for the given base URL.
    ///
    /// Only a connect timeout is set; the analysis call itself is a
    /// synchronous unary request with no overall deadline, so a slow
    /// diagnosis service holds its worker for as long as it takes.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Single-attempt analysis call; any failure aborts the remediation
    /// attempt that issued it.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        let url = format!("{}/analyze", self.base_url);
        let response = self.http.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::DiagnosisStatus { status, body });
        }

        Ok(response.json().await?)
    }
}
