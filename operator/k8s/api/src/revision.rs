//! The MeshRevision custom resource: one deployable configuration snapshot,
//! owned by exactly one Mesh.

use crate::condition::{ConditionStatus, ConditionType, Conditions};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operator.trellis.io",
    version = "v1alpha1",
    kind = "MeshRevision",
    status = "MeshRevisionStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MeshRevisionSpec {
    pub version: String,

    /// Fully merged values handed to the rendering layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeshRevisionStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

impl MeshRevision {
    /// Whether this revision is controlled by the given owner UID. Ownership
    /// is tracked by UID rather than name so that a deleted-and-recreated
    /// Mesh never picks up another owner's leftovers.
    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.metadata
            .owner_references
            .iter()
            .flatten()
            .any(|r| r.controller == Some(true) && r.uid == uid)
    }

    pub fn condition_status(&self, r#type: ConditionType) -> ConditionStatus {
        self.status
            .as_ref()
            .map(|s| s.conditions.status(r#type))
            .unwrap_or_default()
    }
}
