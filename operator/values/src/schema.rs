//! The loosely typed shape of the merged values tree.
//!
//! The overlay pipeline works on untyped trees; this shape is only used as
//! the final gate, so that a values tree the rendering layer cannot consume
//! fails the reconcile with a conversion error instead of producing a broken
//! revision. Unknown fields are carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeshValues {
    /// Revision identifier matched by the sidecar injection webhook. The
    /// empty string selects the default revision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pilot: Option<ComponentValues>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cni: Option<ComponentValues>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalValues>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComponentValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hub: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Map<String, Value>>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hub: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh_namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsValues>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TlsValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher_suites: Option<Vec<String>>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}
