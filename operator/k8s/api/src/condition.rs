//! Conditions reported on Mesh and MeshRevision resources.

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition types used by the operator. A resource carries at most one
/// condition per type; [`Conditions::set`] enforces this.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ConditionType {
    /// The controller successfully applied the resource's desired state.
    Reconciled,
    /// The workloads realizing the resource are available.
    Ready,
    /// Some workload still references this revision. Only reported on
    /// MeshRevision resources.
    InUse,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// Condition reasons shared between the revision and mesh controllers.
pub mod reason {
    pub const HEALTHY: &str = "Healthy";
    pub const RECONCILE_ERROR: &str = "ReconcileError";
    pub const ACTIVE_REVISION_NOT_FOUND: &str = "ActiveRevisionNotFound";
    pub const NOT_REPORTED: &str = "NotReported";
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: ConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
}

impl Condition {
    /// Builds a condition stamped with the current time. When applied through
    /// [`Conditions::set`], the stamp only survives if the status actually
    /// transitions.
    pub fn new(
        r#type: ConditionType,
        status: ConditionStatus,
        reason: impl ToString,
        message: impl ToString,
    ) -> Self {
        Self {
            r#type,
            status,
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            last_transition_time: Some(Time(Utc::now())),
        }
    }
}

/// An ordered collection of conditions keyed by type.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn get(&self, r#type: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.r#type == r#type)
    }

    pub fn status(&self, r#type: ConditionType) -> ConditionStatus {
        self.get(r#type).map(|c| c.status).unwrap_or_default()
    }

    /// Inserts or replaces the condition of the given type.
    ///
    /// `lastTransitionTime` is carried over from the previous condition when
    /// the status is unchanged, so message-only edits never look like
    /// transitions and never retrigger watches downstream.
    pub fn set(&mut self, condition: Condition) {
        match self.0.iter_mut().find(|c| c.r#type == condition.r#type) {
            Some(existing) => {
                if existing.status == condition.status {
                    let last_transition_time = existing.last_transition_time.clone();
                    *existing = Condition {
                        last_transition_time,
                        ..condition
                    };
                } else {
                    *existing = condition;
                }
            }
            None => self.0.push(condition),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Equality that disregards transition times. Used to suppress status
    /// writes that would only refresh timestamps.
    pub fn equal_ignoring_transitions(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(other.0.iter()).all(|(a, b)| {
                a.r#type == b.r#type
                    && a.status == b.status
                    && a.reason == b.reason
                    && a.message == b.message
            })
    }
}
