//! Watch supervisor: event subscription, dispatch, and resubscription.
//!
//! One task reads the pod watch stream and never blocks on downstream
//! work: qualifying Modified events are classified inline (cheap, pure)
//! and handed to spawned remediation tasks gated by a semaphore of
//! `worker_concurrency` permits. The supervisor is an explicit state
//! machine over {Subscribed, Reconnecting}: an abnormal stream closure
//! moves it to Reconnecting, it sleeps the fixed reconnect delay, and
//! resubscribes — indefinitely, with no backoff. A stream that ends
//! cleanly stops the supervisor.
//!
//! Spawned remediation tasks are tracked so shutdown can stop accepting
//! new work and still let in-flight tasks finish via [`Dispatcher::drain`].

use crate::classifier;
use crate::error::Result;
use crate::inflight::InflightSet;
use crate::pods::PodIdentity;
use crate::remediate::{self, Context};
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, WatchEvent, WatchParams};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// How a consumed watch stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// Stream completed without an error; the supervisor stops
    Normal,
    /// Stream error or server error event; resubscribe after the delay
    Abnormal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorState {
    Subscribed,
    Reconnecting,
}

/// Classifies watch events and owns the remediation worker pool.
pub struct Dispatcher {
    ctx: Arc<Context>,
    inflight: InflightSet,
    workers: Arc<Semaphore>,
    tasks: TaskTracker,
}

impl Dispatcher {
    pub fn new(ctx: Arc<Context>) -> Self {
        let workers = Arc::new(Semaphore::new(ctx.config.worker_concurrency));
        Self {
            ctx,
            inflight: InflightSet::new(),
            workers,
            tasks: TaskTracker::new(),
        }
    }

    /// Stop waiting on new work and block until every in-flight
    /// remediation task has run to completion or failure.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Classify a Modified event and dispatch a remediation task if it
    /// carries a failure and no remediation for the pod is in flight.
    pub fn handle_modified(&self, pod: Pod) {
        let identity = PodIdentity::from_pod(&pod, &self.ctx.config.namespace);
        debug!("Received Modified event for pod {}", identity);

        let Some(reason) = classifier::classify(&pod) else {
            return;
        };
        warn!("Detected failure in pod {}: {}", identity, reason);

        let Some(guard) = self.inflight.try_begin(identity.clone()) else {
            info!(
                "Remediation already in flight for pod {}; skipping this event",
                identity
            );
            return;
        };

        let ctx = Arc::clone(&self.ctx);
        let workers = Arc::clone(&self.workers);
        self.tasks.spawn(async move {
            let _guard = guard;
            let Ok(_permit) = workers.acquire_owned().await else {
                // Semaphore only closes on shutdown
                return;
            };

            if let Err(e) = remediate::remediate(&ctx, &pod, &identity, reason).await {
                error!("Failed to process pod failure for {}: {}", identity, e);
            }
        });
    }

    /// Drain one subscription until it ends.
    async fn consume(
        &self,
        stream: impl Stream<Item = kube::Result<WatchEvent<Pod>>>,
    ) -> StreamEnd {
        futures::pin_mut!(stream);

        while let Some(item) = stream.next().await {
            match item {
                Ok(WatchEvent::Modified(pod)) => self.handle_modified(pod),
                Ok(WatchEvent::Added(pod) | WatchEvent::Deleted(pod)) => {
                    // Only status changes are inspected
                    debug!(
                        "Ignoring non-Modified event for pod {}",
                        PodIdentity::from_pod(&pod, &self.ctx.config.namespace)
                    );
                }
                Ok(WatchEvent::Bookmark(_)) => {}
                Ok(WatchEvent::Error(response)) => {
                    warn!("Pod watch returned server error: {}", response.message);
                    return StreamEnd::Abnormal;
                }
                Err(e) => {
                    warn!("Pod watch stream error: {}", e);
                    return StreamEnd::Abnormal;
                }
            }
        }

        StreamEnd::Normal
    }
}

/// Owns the pod watch subscription and the dispatch machinery.
pub struct WatchSupervisor {
    api: Api<Pod>,
    ctx: Arc<Context>,
    dispatcher: Dispatcher,
}

impl WatchSupervisor {
    pub fn new(client: Client, ctx: Arc<Context>) -> Self {
        let api = Api::namespaced(client, &ctx.config.namespace);
        let dispatcher = Dispatcher::new(Arc::clone(&ctx));
        Self {
            api,
            ctx,
            dispatcher,
        }
    }

    /// Run the subscribe/consume/resubscribe loop until normal closure.
    pub async fn run(&self) -> Result<()> {
        let params = WatchParams::default();
        let mut state = SupervisorState::Subscribed;

        loop {
            if state == SupervisorState::Reconnecting {
                warn!(
                    "Pod watch closed abnormally; resubscribing in {}s",
                    self.ctx.config.reconnect_delay_secs
                );
                tokio::time::sleep(Duration::from_secs(self.ctx.config.reconnect_delay_secs))
                    .await;
            }

            match self.api.watch(&params, "0").await {
                Ok(stream) => {
                    info!(
                        "Watching pods in namespace {}",
                        self.ctx.config.namespace
                    );
                    match self.dispatcher.consume(stream).await {
                        StreamEnd::Normal => {
                            info!("Pod watch closed normally; supervisor stopping");
                            return Ok(());
                        }
                        StreamEnd::Abnormal => state = SupervisorState::Reconnecting,
                    }
                }
                Err(e) => {
                    error!("Failed to subscribe to pod watch: {}", e);
                    state = SupervisorState::Reconnecting;
                }
            }
        }
    }

    /// Stop waiting on new work and let in-flight remediations finish.
    pub async fn drain(&self) {
        self.dispatcher.drain().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemediatorConfig;
    use crate::diagnosis::DiagnosisClient;
    use crate::pods::MockPodOps;
    use futures::stream;
    use kube::core::ErrorResponse;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(Context {
            pods: Arc::new(MockPodOps::new()),
            diagnosis: DiagnosisClient::new("http://localhost:9999").unwrap(),
            config: Arc::new(RemediatorConfig::default()),
        }))
    }

    fn expired_watch() -> ErrorResponse {
        ErrorResponse {
            status: "Failure".to_string(),
            message: "too old resource version".to_string(),
            reason: "Expired".to_string(),
            code: 410,
        }
    }

    #[tokio::test]
    async fn stream_that_just_ends_is_normal_closure() {
        let events: Vec<kube::Result<WatchEvent<Pod>>> = vec![
            Ok(WatchEvent::Added(Pod::default())),
            Ok(WatchEvent::Deleted(Pod::default())),
        ];
        let end = dispatcher().consume(stream::iter(events)).await;
        assert_eq!(end, StreamEnd::Normal);
    }

    #[tokio::test]
    async fn empty_stream_is_normal_closure() {
        let events: Vec<kube::Result<WatchEvent<Pod>>> = vec![];
        let end = dispatcher().consume(stream::iter(events)).await;
        assert_eq!(end, StreamEnd::Normal);
    }

    #[tokio::test]
    async fn server_error_event_is_abnormal_closure() {
        let events: Vec<kube::Result<WatchEvent<Pod>>> =
            vec![Ok(WatchEvent::Error(expired_watch()))];
        let end = dispatcher().consume(stream::iter(events)).await;
        assert_eq!(end, StreamEnd::Abnormal);
    }

    #[tokio::test]
    async fn stream_error_is_abnormal_closure() {
        let events: Vec<kube::Result<WatchEvent<Pod>>> = vec![
            Ok(WatchEvent::Added(Pod::default())),
            Err(kube::Error::Api(expired_watch())),
        ];
        let end = dispatcher().consume(stream::iter(events)).await;
        assert_eq!(end, StreamEnd::Abnormal);
    }
}
