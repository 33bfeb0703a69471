//! Minimal pod data model for the initializer watch.
//!
//! Pods still pending initialization carry the alpha `metadata.initializers`
//! field, which the generated `k8s-openapi` `ObjectMeta` does not model and
//! would silently drop on deserialization. The controller therefore owns a
//! small serde view of the pod limited to what it actually reads.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use serde::Deserialize;
use serde::Serialize;

/// Pod snapshot as delivered by the uninitialized-aware list/watch.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct WatchedPod {
    #[serde(default)]
    pub metadata: PodMetadata,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PodMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializers: Option<Initializers>,
}

/// The ordered pending-initializers list from `metadata.initializers`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct Initializers {
    #[serde(default)]
    pub pending: Vec<PendingInitializer>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub(crate) struct PendingInitializer {
    pub name: String,
}

/// List response wrapper; only the resource version and items are consumed.
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct WatchedPodList {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<WatchedPod>,
}

impl WatchedPod {
    pub(crate) fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("unknown")
    }

    pub(crate) fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or("default")
    }

    /// Pending initializer entries, in the order the API server reports them.
    pub(crate) fn pending_initializers(&self) -> &[PendingInitializer] {
        self.metadata
            .initializers
            .as_ref()
            .map(|init| init.pending.as_slice())
            .unwrap_or_default()
    }
}
