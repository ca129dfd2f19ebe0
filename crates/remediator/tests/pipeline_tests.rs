//! End-to-end pipeline tests: classification through patch/replace against
//! a scripted pod API and a mock diagnosis service.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, ContainerState, ContainerStateWaiting, ContainerStatus, Pod, PodSpec, PodStatus,
};
use kube::api::ObjectMeta;
use remediator::classifier::{self, FailureReason};
use remediator::diagnosis::DiagnosisClient;
use remediator::remediate::{self, Context};
use remediator::{Dispatcher, Error, PodIdentity, PodOps, RemediatorConfig, Result};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Scripted pod API recording every mutating call.
#[derive(Default)]
struct FakePodOps {
    /// When set, every patch attempt is rejected with this message
    reject_patch: Option<String>,
    /// When set, log retrieval fails
    fail_logs: bool,
    calls: Mutex<Calls>,
}

#[derive(Default)]
struct Calls {
    patches: Vec<Value>,
    deletes: u32,
    created: Vec<Pod>,
}

impl FakePodOps {
    fn patch_count(&self) -> usize {
        self.calls.lock().unwrap().patches.len()
    }

    fn delete_count(&self) -> u32 {
        self.calls.lock().unwrap().deletes
    }

    fn created(&self) -> Vec<Pod> {
        self.calls.lock().unwrap().created.clone()
    }
}

#[async_trait]
impl PodOps for FakePodOps {
    async fn tail_logs(&self, _name: &str, _tail_lines: i64) -> Result<String> {
        if self.fail_logs {
            Err(Error::Config("log endpoint unavailable".to_string()))
        } else {
            Ok("Back-off pulling image \"repo/web:broken\"".to_string())
        }
    }

    async fn patch_strategic(&self, _name: &str, patch: Value) -> Result<Pod> {
        self.calls.lock().unwrap().patches.push(patch);
        match &self.reject_patch {
            Some(message) => Err(Error::Config(message.clone())),
            None => Ok(Pod {
                metadata: ObjectMeta {
                    resource_version: Some("2".to_string()),
                    ..ObjectMeta::default()
                },
                ..Pod::default()
            }),
        }
    }

    async fn delete(&self, _name: &str) -> Result<()> {
        self.calls.lock().unwrap().deletes += 1;
        Ok(())
    }

    async fn get_opt(&self, _name: &str) -> Result<Option<Pod>> {
        // Deletion settles immediately
        Ok(None)
    }

    async fn create(&self, pod: &Pod) -> Result<Pod> {
        self.calls.lock().unwrap().created.push(pod.clone());
        Ok(pod.clone())
    }
}

fn failing_pod() -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some("web-1".to_string()),
            namespace: Some("default".to_string()),
            resource_version: Some("7".to_string()),
            uid: Some("uid-7".to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: vec![
                Container {
                    name: "web".to_string(),
                    image: Some("repo/web:broken".to_string()),
                    ..Container::default()
                },
                Container {
                    name: "sidecar".to_string(),
                    image: Some("repo/sidecar:v1".to_string()),
                    ..Container::default()
                },
            ],
            ..PodSpec::default()
        }),
        status: Some(PodStatus {
            container_statuses: Some(vec![ContainerStatus {
                name: "web".to_string(),
                state: Some(ContainerState {
                    waiting: Some(ContainerStateWaiting {
                        reason: Some("ImagePullBackOff".to_string()),
                        ..ContainerStateWaiting::default()
                    }),
                    ..ContainerState::default()
                }),
                ..ContainerStatus::default()
            }]),
            ..PodStatus::default()
        }),
    }
}

async fn mock_diagnosis(server: &MockServer, confidence: f64) {
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "root_cause": "image tag repo/web:broken does not exist",
            "suggested_fix_yaml": {
                "spec": {"containers": [{"name": "web", "image": "repo/web:fixed"}]}
            },
            "confidence_score": confidence
        })))
        .mount(server)
        .await;
}

fn context(pods: Arc<FakePodOps>, server: &MockServer, dry_run: bool) -> Context {
    Context {
        pods: pods as Arc<dyn PodOps>,
        diagnosis: DiagnosisClient::new(&server.uri()).unwrap(),
        config: Arc::new(RemediatorConfig {
            dry_run,
            ..RemediatorConfig::default()
        }),
    }
}

#[tokio::test]
async fn image_pull_failure_falls_back_to_replace_exactly_once() {
    let server = MockServer::start().await;
    mock_diagnosis(&server, 95.0).await;

    let pod = failing_pod();
    let reason = classifier::classify(&pod).expect("pod should classify as failed");
    assert_eq!(reason, FailureReason::ImagePullBackOff);

    let pods = Arc::new(FakePodOps {
        reject_patch: Some("Pod updates may not change fields other than image".to_string()),
        ..FakePodOps::default()
    });
    let ctx = context(pods.clone(), &server, false);
    let identity = PodIdentity::new("default", "web-1");

    remediate::remediate(&ctx, &pod, &identity, reason)
        .await
        .unwrap();

    assert_eq!(pods.patch_count(), 1);
    assert_eq!(pods.delete_count(), 1);

    let created = pods.created();
    assert_eq!(created.len(), 1, "replace fallback runs exactly once");
    let containers = &created[0].spec.as_ref().unwrap().containers;
    assert_eq!(containers[0].image.as_deref(), Some("repo/web:fixed"));
    // Containers not named in the fix are preserved verbatim
    assert_eq!(containers[1].image.as_deref(), Some("repo/sidecar:v1"));
    // Recreated copy has its server-assigned identity stripped
    assert!(created[0].metadata.resource_version.is_none());
    assert!(created[0].status.is_none());
}

#[tokio::test]
async fn successful_patch_skips_the_replace_fallback() {
    let server = MockServer::start().await;
    mock_diagnosis(&server, 95.0).await;

    let pod = failing_pod();
    let pods = Arc::new(FakePodOps::default());
    let ctx = context(pods.clone(), &server, false);
    let identity = PodIdentity::new("default", "web-1");

    remediate::remediate(&ctx, &pod, &identity, FailureReason::ImagePullBackOff)
        .await
        .unwrap();

    assert_eq!(pods.patch_count(), 1);
    assert_eq!(pods.delete_count(), 0);
    assert!(pods.created().is_empty());
    // The patch carries the suggested fix as-is
    let patch = pods.calls.lock().unwrap().patches[0].clone();
    assert_eq!(
        patch["spec"]["containers"][0]["image"],
        json!("repo/web:fixed")
    );
}

#[tokio::test]
async fn below_threshold_confidence_never_mutates() {
    let server = MockServer::start().await;
    mock_diagnosis(&server, 89.9).await;

    let pod = failing_pod();
    let pods = Arc::new(FakePodOps::default());
    let ctx = context(pods.clone(), &server, false);
    let identity = PodIdentity::new("default", "web-1");

    remediate::remediate(&ctx, &pod, &identity, FailureReason::ImagePullBackOff)
        .await
        .unwrap();

    assert_eq!(pods.patch_count(), 0);
    assert_eq!(pods.delete_count(), 0);
    assert!(pods.created().is_empty());
}

#[tokio::test]
async fn dry_run_simulates_without_mutating() {
    let server = MockServer::start().await;
    mock_diagnosis(&server, 99.0).await;

    let pod = failing_pod();
    let pods = Arc::new(FakePodOps::default());
    let ctx = context(pods.clone(), &server, true);
    let identity = PodIdentity::new("default", "web-1");

    remediate::remediate(&ctx, &pod, &identity, FailureReason::ImagePullBackOff)
        .await
        .unwrap();

    assert_eq!(pods.patch_count(), 0);
    assert_eq!(pods.delete_count(), 0);
    assert!(pods.created().is_empty());
}

#[tokio::test]
async fn shutdown_drain_waits_for_inflight_remediations() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "root_cause": "image tag repo/web:broken does not exist",
                    "suggested_fix_yaml": {
                        "spec": {"containers": [{"name": "web", "image": "repo/web:fixed"}]}
                    },
                    "confidence_score": 95.0
                }))
                // Keep the remediation in flight while drain is called
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let pods = Arc::new(FakePodOps::default());
    let ctx = context(pods.clone(), &server, false);
    let dispatcher = Dispatcher::new(Arc::new(ctx));

    dispatcher.handle_modified(failing_pod());
    dispatcher.drain().await;

    assert_eq!(
        pods.patch_count(),
        1,
        "drain returns only after the dispatched remediation ran to completion"
    );
}

#[tokio::test]
async fn diagnosis_failure_aborts_without_mutating() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model backend down"))
        .mount(&server)
        .await;

    let pod = failing_pod();
    let pods = Arc::new(FakePodOps::default());
    let ctx = context(pods.clone(), &server, false);
    let identity = PodIdentity::new("default", "web-1");

    let err = remediate::remediate(&ctx, &pod, &identity, FailureReason::ImagePullBackOff)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DiagnosisStatus { .. }));

    assert_eq!(pods.patch_count(), 0);
    assert_eq!(pods.delete_count(), 0);
    assert!(pods.created().is_empty());
}

#[tokio::test]
async fn log_fetch_failure_degrades_payload_but_pipeline_continues() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(body_partial_json(json!({
            "pod_name": "web-1",
            "failure_reason": "ImagePullBackOff"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "root_cause": "image tag does not exist",
            "suggested_fix_yaml": {
                "spec": {"containers": [{"name": "web", "image": "repo/web:fixed"}]}
            },
            "confidence_score": 95.0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pod = failing_pod();
    let pods = Arc::new(FakePodOps {
        fail_logs: true,
        ..FakePodOps::default()
    });
    let ctx = context(pods.clone(), &server, false);
    let identity = PodIdentity::new("default", "web-1");

    remediate::remediate(&ctx, &pod, &identity, FailureReason::ImagePullBackOff)
        .await
        .unwrap();

    // The degraded log payload still reached the service and the fix applied
    assert_eq!(pods.patch_count(), 1);

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["logs"]
        .as_str()
        .unwrap()
        .starts_with("Failed to retrieve logs:"));
}
