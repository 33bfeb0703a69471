use thiserror::Error;

/// Errors that can occur during Kubernetes operations.
#[derive(Debug, Error)]
pub(crate) enum KubernetesError {
    #[error("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[error("Failed to build API request: {message}")]
    InvalidRequest { message: String },
    #[error("Failed to watch pods: {message}")]
    WatchFailed { message: String },
    #[error("Failed to patch pod {pod_name} in namespace {namespace}")]
    PatchFailed { pod_name: String, namespace: String },
}
