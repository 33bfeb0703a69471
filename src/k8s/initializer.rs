use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use futures::StreamExt;
use futures::TryStreamExt;
use kube::api::ListParams;
use kube::api::WatchParams;
use kube::core::WatchEvent;
use kube::Client;
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::k8s::list_watch::pod_patch_request;
use crate::k8s::pod::PendingInitializer;
use crate::k8s::pod::WatchedPodList;
use crate::k8s::types::KubernetesError;
use crate::k8s::UninitializedListWatch;
use crate::k8s::WatchedPod;

/// Interval after which the controller relists all pods to heal events
/// missed across watch disconnects.
const RESYNC_PERIOD: Duration = Duration::from_secs(30);

/// Delay before retrying after a failed list/watch cycle.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Watches pod additions cluster-wide and claims this controller's entry in
/// each pod's pending-initializers list.
///
/// A pod stays unschedulable while any pending initializer remains, so on a
/// name match the controller patches the pod to remove its own entry. Events
/// are processed sequentially; handler failures are logged and skipped.
pub(crate) struct VfioInitializer {
    client: Client,
    initializer_name: String,
    list_watch: UninitializedListWatch,
}

impl VfioInitializer {
    pub(crate) fn new(client: Client, initializer_name: String, namespace: Option<String>) -> Self {
        let list_watch = UninitializedListWatch::pods(namespace.as_deref());
        Self {
            client,
            initializer_name,
            list_watch,
        }
    }

    /// Run the watch loop until cancellation.
    ///
    /// Each cycle lists pods, replays them as additions, then consumes the
    /// watch stream until the resync deadline elapses. Failed cycles are
    /// retried after a short delay.
    #[tracing::instrument(skip(self, cancellation_token), fields(initializer = %self.initializer_name))]
    pub(crate) async fn run(
        &self,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<KubernetesError>> {
        info!("Starting vfio initializer controller");

        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Initializer controller shutdown requested");
                    break;
                }
                result = self.sync_and_watch() => {
                    match result {
                        Ok(()) => {
                            debug!("Watch cycle ended, relisting pods");
                        }
                        Err(e) => {
                            error!("Pod watch failed: {e:?}");
                            sleep(RETRY_DELAY).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// One list+watch cycle, bounded by the resync deadline.
    async fn sync_and_watch(&self) -> Result<(), Report<KubernetesError>> {
        let request = self.list_watch.list(&ListParams::default())?;
        let list: WatchedPodList =
            self.client
                .request(request)
                .await
                .change_context(KubernetesError::WatchFailed {
                    message: "pod list request failed".to_string(),
                })?;
        let resource_version = list.metadata.resource_version.clone().unwrap_or_default();

        for pod in list.items {
            if let Err(e) = self.handle_pod_added(pod).await {
                error!("Failed to handle pod event: {e:?}");
            }
        }

        let request = self
            .list_watch
            .watch(&WatchParams::default(), &resource_version)?;
        let mut stream = self
            .client
            .request_events::<WatchedPod>(request)
            .await
            .change_context(KubernetesError::WatchFailed {
                message: "pod watch request failed".to_string(),
            })?
            .boxed();

        let resync = sleep(RESYNC_PERIOD);
        tokio::pin!(resync);

        loop {
            select! {
                _ = &mut resync => {
                    debug!("Resync interval elapsed, relisting pods");
                    return Ok(());
                }
                event = stream.try_next() => {
                    match event.change_context(KubernetesError::WatchFailed {
                        message: "watch stream error".to_string(),
                    })? {
                        Some(WatchEvent::Added(pod)) => {
                            if let Err(e) = self.handle_pod_added(pod).await {
                                error!("Failed to handle pod event: {e:?}");
                            }
                        }
                        // Only additions are acted on
                        Some(WatchEvent::Modified(_) | WatchEvent::Deleted(_) | WatchEvent::Bookmark(_)) => {}
                        Some(WatchEvent::Error(status)) => {
                            return Err(Report::new(KubernetesError::WatchFailed {
                                message: format!("watch error event: {status:?}"),
                            }));
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// Handle a single pod addition.
    ///
    /// A no-op unless the pod's first pending initializer names this
    /// controller; on a match the claimed entry is patched away so the pod
    /// can proceed to admission.
    async fn handle_pod_added(&self, pod: WatchedPod) -> Result<(), Report<KubernetesError>> {
        let Some(remaining) = claim_first_pending(&pod, &self.initializer_name) else {
            return Ok(());
        };

        info!(
            pod = pod.name(),
            namespace = pod.namespace(),
            "Initializing virtual machine pod for VFIO passthrough"
        );

        self.remove_pending_initializer(&pod, remaining).await
    }

    async fn remove_pending_initializer(
        &self,
        pod: &WatchedPod,
        remaining: Vec<PendingInitializer>,
    ) -> Result<(), Report<KubernetesError>> {
        let body = removal_patch(remaining);
        let request = pod_patch_request(pod.namespace(), pod.name(), &body)?;
        let _patched: WatchedPod =
            self.client
                .request(request)
                .await
                .change_context(KubernetesError::PatchFailed {
                    pod_name: pod.name().to_string(),
                    namespace: pod.namespace().to_string(),
                })?;

        debug!(pod = pod.name(), "Removed pending initializer entry");
        Ok(())
    }
}

/// Decide whether this controller owns the pod's first pending initializer.
///
/// Returns the pending list with the claimed entry removed, or `None` when
/// the pod is not waiting on this controller (no pending entries, or the
/// first entry names someone else). Initializers run in list order, so only
/// the first entry may be claimed.
fn claim_first_pending(
    pod: &WatchedPod,
    initializer_name: &str,
) -> Option<Vec<PendingInitializer>> {
    let pending = pod.pending_initializers();
    let first = pending.first()?;
    if first.name != initializer_name {
        return None;
    }
    Some(pending[1..].to_vec())
}

/// Merge-patch body that drops the claimed entry. The whole `initializers`
/// stanza is nulled once the pending list is empty so admission can proceed.
fn removal_patch(remaining: Vec<PendingInitializer>) -> serde_json::Value {
    if remaining.is_empty() {
        serde_json::json!({"metadata": {"initializers": null}})
    } else {
        serde_json::json!({"metadata": {"initializers": {"pending": remaining}}})
    }
}

#[cfg(test)]
mod tests {
    use hyper::Body;
    use tower_test::mock;

    use super::*;
    use crate::k8s::pod::Initializers;
    use crate::k8s::pod::PodMetadata;

    const VFIO_INITIALIZER: &str = "vfio.initializer.kubevirt.io";

    type ApiHandle = mock::Handle<http::Request<Body>, http::Response<Body>>;

    fn mock_initializer(initializer_name: &str) -> (VfioInitializer, ApiHandle) {
        let (service, handle) = mock::pair::<http::Request<Body>, http::Response<Body>>();
        let client = Client::new(service, "default");
        (
            VfioInitializer::new(client, initializer_name.to_string(), None),
            handle,
        )
    }

    fn pod_with_pending(names: &[&str]) -> WatchedPod {
        WatchedPod {
            metadata: PodMetadata {
                name: Some("vm-pod".to_string()),
                namespace: Some("vms".to_string()),
                initializers: Some(Initializers {
                    pending: names
                        .iter()
                        .map(|name| PendingInitializer {
                            name: name.to_string(),
                        })
                        .collect(),
                }),
                ..Default::default()
            },
        }
    }

    #[test]
    fn pod_without_initializers_is_a_noop() {
        let pod = WatchedPod::default();

        assert!(claim_first_pending(&pod, VFIO_INITIALIZER).is_none());
    }

    #[test]
    fn empty_pending_list_is_a_noop() {
        let pod = pod_with_pending(&[]);

        assert!(claim_first_pending(&pod, VFIO_INITIALIZER).is_none());
    }

    #[test]
    fn mismatched_first_entry_is_a_noop() {
        let pod = pod_with_pending(&["sidecar.initializer.example.com", VFIO_INITIALIZER]);

        // Second position is not ours to claim yet; the pod comes back
        // through the watch once the first initializer finishes.
        assert!(claim_first_pending(&pod, VFIO_INITIALIZER).is_none());
    }

    #[test]
    fn empty_configured_name_never_matches_real_pods() {
        let pod = pod_with_pending(&[VFIO_INITIALIZER]);

        assert!(claim_first_pending(&pod, "").is_none());
    }

    #[test]
    fn claims_sole_pending_entry() {
        let pod = pod_with_pending(&[VFIO_INITIALIZER]);

        let remaining = claim_first_pending(&pod, VFIO_INITIALIZER).unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn claims_first_entry_and_keeps_the_rest() {
        let pod = pod_with_pending(&[VFIO_INITIALIZER, "sidecar.initializer.example.com"]);

        let remaining = claim_first_pending(&pod, VFIO_INITIALIZER).unwrap();
        assert_eq!(
            remaining,
            vec![PendingInitializer {
                name: "sidecar.initializer.example.com".to_string()
            }]
        );
    }

    #[test]
    fn removal_patch_nulls_emptied_initializers() {
        let patch = removal_patch(Vec::new());

        assert_eq!(
            patch,
            serde_json::json!({"metadata": {"initializers": null}})
        );
    }

    #[test]
    fn removal_patch_keeps_remaining_entries() {
        let patch = removal_patch(vec![PendingInitializer {
            name: "sidecar.initializer.example.com".to_string(),
        }]);

        assert_eq!(
            patch,
            serde_json::json!({
                "metadata": {
                    "initializers": {
                        "pending": [{"name": "sidecar.initializer.example.com"}]
                    }
                }
            })
        );
    }

    #[tokio::test]
    async fn matching_pod_issues_one_removal_patch() {
        let (initializer, mut handle) = mock_initializer(VFIO_INITIALIZER);

        let api_server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("expected a patch request");
            assert_eq!(request.method(), http::Method::PATCH);
            assert_eq!(request.uri().path(), "/api/v1/namespaces/vms/pods/vm-pod");

            let body = hyper::body::to_bytes(request.into_body()).await.unwrap();
            let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(
                body,
                serde_json::json!({"metadata": {"initializers": null}})
            );

            send.send_response(
                http::Response::builder()
                    .body(Body::from(
                        r#"{"metadata": {"name": "vm-pod", "namespace": "vms"}}"#,
                    ))
                    .unwrap(),
            );

            // No further requests once the entry is removed
            assert!(handle.next_request().await.is_none());
        });

        initializer
            .handle_pod_added(pod_with_pending(&[VFIO_INITIALIZER]))
            .await
            .unwrap();

        drop(initializer);
        api_server.await.unwrap();
    }

    #[tokio::test]
    async fn non_matching_pods_issue_no_requests() {
        let (initializer, mut handle) = mock_initializer(VFIO_INITIALIZER);

        initializer
            .handle_pod_added(pod_with_pending(&["sidecar.initializer.example.com"]))
            .await
            .unwrap();
        initializer
            .handle_pod_added(pod_with_pending(&[]))
            .await
            .unwrap();
        initializer
            .handle_pod_added(WatchedPod::default())
            .await
            .unwrap();

        drop(initializer);
        assert!(handle.next_request().await.is_none());
    }

    #[tokio::test]
    async fn run_stops_after_cancellation() {
        let client =
            Client::try_from(kube::Config::new("http://localhost:8080".parse().unwrap())).unwrap();
        let initializer = VfioInitializer::new(client, VFIO_INITIALIZER.to_string(), None);

        let token = CancellationToken::new();
        token.cancel();

        tokio::time::timeout(Duration::from_secs(10), initializer.run(token))
            .await
            .expect("run did not observe cancellation")
            .unwrap();
    }
}
