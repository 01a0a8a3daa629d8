#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod condition;
pub mod mesh;
pub mod revision;

pub use self::{
    condition::{Condition, ConditionStatus, ConditionType, Conditions},
    mesh::{
        Mesh, MeshSpec, MeshState, MeshStatus, RevisionSummary, UpdateStrategy, UpdateStrategyType,
    },
    revision::{MeshRevision, MeshRevisionSpec, MeshRevisionStatus},
};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
pub use kube::{
    api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams},
    Client, Error, Resource, ResourceExt,
};

pub const API_GROUP: &str = "operator.trellis.io";
