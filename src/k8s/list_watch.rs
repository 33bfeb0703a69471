//! List/watch request builder that forces visibility of uninitialized pods.
//!
//! The API server hides objects that still have pending initializers unless
//! the request carries `includeUninitialized=true`. The stock client request
//! parameters cannot express that option, so the default list/watch behavior
//! would never deliver the very pods this controller exists to handle. This
//! adapter builds the raw requests and rewrites the query string before they
//! are handed to the client.

use error_stack::Report;
use error_stack::ResultExt;
use kube::api::ListParams;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::api::WatchParams;
use kube::core::Request;

use crate::k8s::types::KubernetesError;

const INCLUDE_UNINITIALIZED: &str = "includeUninitialized=true";

/// Builds pod list/watch requests scoped to one namespace or the whole
/// cluster, with uninitialized-object visibility always switched on.
pub(crate) struct UninitializedListWatch {
    url_path: String,
}

impl UninitializedListWatch {
    pub(crate) fn pods(namespace: Option<&str>) -> Self {
        let url_path = match namespace {
            Some(ns) => format!("/api/v1/namespaces/{ns}/pods"),
            None => "/api/v1/pods".to_string(),
        };
        Self { url_path }
    }

    pub(crate) fn list(
        &self,
        params: &ListParams,
    ) -> Result<http::Request<Vec<u8>>, Report<KubernetesError>> {
        let request = Request::new(self.url_path.clone())
            .list(params)
            .change_context(KubernetesError::InvalidRequest {
                message: format!("pod list request for {}", self.url_path),
            })?;
        force_include_uninitialized(request)
    }

    pub(crate) fn watch(
        &self,
        params: &WatchParams,
        resource_version: &str,
    ) -> Result<http::Request<Vec<u8>>, Report<KubernetesError>> {
        let request = Request::new(self.url_path.clone())
            .watch(params, resource_version)
            .change_context(KubernetesError::InvalidRequest {
                message: format!("pod watch request for {}", self.url_path),
            })?;
        force_include_uninitialized(request)
    }
}

/// Merge-patch request against a single pod's metadata.
pub(crate) fn pod_patch_request(
    namespace: &str,
    name: &str,
    body: &serde_json::Value,
) -> Result<http::Request<Vec<u8>>, Report<KubernetesError>> {
    Request::new(format!("/api/v1/namespaces/{namespace}/pods"))
        .patch(name, &PatchParams::default(), &Patch::Merge(body))
        .change_context(KubernetesError::InvalidRequest {
            message: format!("pod patch request for {namespace}/{name}"),
        })
}

/// Appends `includeUninitialized=true` to the request query, whatever
/// parameters the caller supplied.
fn force_include_uninitialized(
    request: http::Request<Vec<u8>>,
) -> Result<http::Request<Vec<u8>>, Report<KubernetesError>> {
    let (mut parts, body) = request.into_parts();
    let path = parts.uri.path();
    let rewritten = match parts.uri.query() {
        Some(query) if !query.is_empty() => format!("{path}?{query}&{INCLUDE_UNINITIALIZED}"),
        _ => format!("{path}?{INCLUDE_UNINITIALIZED}"),
    };
    parts.uri = rewritten
        .parse::<http::Uri>()
        .change_context(KubernetesError::InvalidRequest {
            message: format!("invalid request uri: {rewritten}"),
        })?;
    Ok(http::Request::from_parts(parts, body))
}
