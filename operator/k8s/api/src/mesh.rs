//! The Mesh custom resource: the operator-facing description of one Trellis
//! control plane.

use crate::condition::Conditions;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operator.trellis.io",
    version = "v1alpha1",
    kind = "Mesh",
    status = "MeshStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MeshSpec {
    /// Control-plane version to deploy.
    pub version: String,

    /// Namespace the control plane is installed into. Defaults to the Mesh
    /// resource's own namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Built-in values profile layered underneath user values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_strategy: Option<UpdateStrategy>,

    /// User-supplied configuration values. Merged over profiles and vendor
    /// defaults; a handful of fields are operator-managed and overwritten.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStrategy {
    #[serde(default, rename = "type")]
    pub strategy: UpdateStrategyType,

    /// How long a superseded revision must remain unused before it is
    /// deleted. Clamped to a minimum by the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive_revision_deletion_grace_period_seconds: Option<i64>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum UpdateStrategyType {
    /// Mutate the single revision named after the Mesh in place.
    #[default]
    InPlace,
    /// Create a version-suffixed revision per version and retire the old one
    /// once no workload uses it.
    RevisionBased,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeshStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub state: MeshState,

    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,

    /// Name of the revision currently designated as authoritative. Populated
    /// whenever it is computable, even if the revision object is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_revision_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revisions: Option<RevisionSummary>,
}

/// Coarse-grained health derived from the Reconciled and Ready conditions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum MeshState {
    Healthy,
    NotReady,
    ReconcileError,
    RevisionNotFound,
    #[default]
    Unknown,
}

/// Counts over the Mesh's owned revisions. `-1` means the count could not be
/// determined, as opposed to a legitimate zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSummary {
    pub total: i32,
    pub ready: i32,
    pub in_use: i32,
}

impl RevisionSummary {
    /// Sentinel summary reported when the owned revisions cannot be listed.
    pub const UNKNOWN: Self = Self {
        total: -1,
        ready: -1,
        in_use: -1,
    };
}

impl Mesh {
    /// The namespace the control plane is declared to live in.
    pub fn target_namespace(&self) -> Option<&str> {
        self.spec
            .namespace
            .as_deref()
            .or(self.metadata.namespace.as_deref())
    }

    pub fn strategy(&self) -> UpdateStrategyType {
        self.spec
            .update_strategy
            .as_ref()
            .map(|s| s.strategy)
            .unwrap_or_default()
    }
}
