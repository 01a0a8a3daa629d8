#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Derives a Mesh's status from its owned revisions.
//!
//! The parent mirrors its active revision: whatever the revision reports for
//! Reconciled and Ready is copied onto the Mesh verbatim. Everything else
//! here is about degrading gracefully when that revision cannot be consulted.

use chrono::Utc;
use trellis_operator_k8s_api::{
    condition::reason, Condition, ConditionStatus, ConditionType, Error, Mesh, MeshRevision,
    MeshState, MeshStatus, ResourceExt, RevisionSummary, Time,
};

/// Computes the status the Mesh should report for this reconcile.
///
/// Priority order is a hard contract: a reconciliation error takes full
/// precedence over revision-lookup failures, which take precedence over a
/// missing active revision, which takes precedence over mirroring.
///
/// Conditions are seeded from the persisted status, so `Conditions::set`
/// carries `lastTransitionTime` across message-only updates and re-stamps it
/// only on an actual status transition.
pub fn determine_status(
    mesh: &Mesh,
    active_revision_name: &str,
    owned_revisions: Result<&[MeshRevision], &Error>,
    reconcile_error: Option<&str>,
) -> MeshStatus {
    let mut status = MeshStatus {
        observed_generation: mesh.metadata.generation,
        conditions: mesh
            .status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default(),
        ..Default::default()
    };

    if let Some(message) = reconcile_error {
        status.conditions.set(Condition::new(
            ConditionType::Reconciled,
            ConditionStatus::False,
            reason::RECONCILE_ERROR,
            message,
        ));
        status.conditions.set(Condition::new(
            ConditionType::Ready,
            ConditionStatus::Unknown,
            reason::RECONCILE_ERROR,
            "readiness is unknown while reconciliation is failing",
        ));
        status.state = MeshState::ReconcileError;
        return status;
    }

    // The active name is computable from the spec alone, so it is reported
    // even when the revision object itself is missing.
    status.active_revision_name = Some(active_revision_name.to_string());

    let revisions = match owned_revisions {
        Err(error) => {
            let message = format!("failed to get active revision: {error}");
            status.conditions.set(Condition::new(
                ConditionType::Reconciled,
                ConditionStatus::Unknown,
                reason::ACTIVE_REVISION_NOT_FOUND,
                &message,
            ));
            status.conditions.set(Condition::new(
                ConditionType::Ready,
                ConditionStatus::Unknown,
                reason::ACTIVE_REVISION_NOT_FOUND,
                &message,
            ));
            status.revisions = Some(RevisionSummary::UNKNOWN);
            status.state = MeshState::Unknown;
            return status;
        }
        Ok(revisions) => revisions,
    };

    let uid = mesh.uid().unwrap_or_default();
    let owned: Vec<&MeshRevision> = revisions.iter().filter(|r| r.is_owned_by(&uid)).collect();
    status.revisions = Some(summarize(&owned));

    let active = owned
        .iter()
        .find(|r| r.name_any() == active_revision_name)
        .copied();
    match active {
        None => {
            status.conditions.set(Condition::new(
                ConditionType::Reconciled,
                ConditionStatus::False,
                reason::ACTIVE_REVISION_NOT_FOUND,
                "active revision not found",
            ));
            status.conditions.set(Condition::new(
                ConditionType::Ready,
                ConditionStatus::False,
                reason::ACTIVE_REVISION_NOT_FOUND,
                "active revision not found",
            ));
            status.state = MeshState::RevisionNotFound;
        }
        Some(revision) => {
            status.conditions.set(mirror(revision, ConditionType::Reconciled));
            status.conditions.set(mirror(revision, ConditionType::Ready));
            status.state = derive_state(&status.conditions);
        }
    }
    status
}

/// Copies one condition of the active revision verbatim: status, reason, and
/// message. Only the transition time is the parent's own.
fn mirror(revision: &MeshRevision, r#type: ConditionType) -> Condition {
    match revision
        .status
        .as_ref()
        .and_then(|s| s.conditions.get(r#type))
    {
        Some(condition) => Condition {
            r#type,
            status: condition.status,
            reason: condition.reason.clone(),
            message: condition.message.clone(),
            last_transition_time: Some(Time(Utc::now())),
        },
        None => Condition::new(
            r#type,
            ConditionStatus::Unknown,
            reason::NOT_REPORTED,
            "the active revision has not reported this condition",
        ),
    }
}

fn summarize(owned: &[&MeshRevision]) -> RevisionSummary {
    let count = |r#type: ConditionType| {
        owned
            .iter()
            .filter(|r| r.condition_status(r#type) == ConditionStatus::True)
            .count() as i32
    };
    RevisionSummary {
        total: owned.len() as i32,
        ready: count(ConditionType::Ready),
        in_use: count(ConditionType::InUse),
    }
}

/// Healthy only when both mirrored conditions are True; otherwise the more
/// specific non-healthy reason wins.
fn derive_state(conditions: &trellis_operator_k8s_api::Conditions) -> MeshState {
    let reason_of = |r#type| {
        conditions
            .get(r#type)
            .and_then(|c| c.reason.as_deref())
            .unwrap_or_default()
            .to_string()
    };
    match conditions.status(ConditionType::Reconciled) {
        ConditionStatus::True => {}
        ConditionStatus::False if reason_of(ConditionType::Reconciled) == reason::ACTIVE_REVISION_NOT_FOUND => {
            return MeshState::RevisionNotFound
        }
        ConditionStatus::False => return MeshState::ReconcileError,
        ConditionStatus::Unknown => return MeshState::Unknown,
    }
    match conditions.status(ConditionType::Ready) {
        ConditionStatus::True => MeshState::Healthy,
        ConditionStatus::False => MeshState::NotReady,
        ConditionStatus::Unknown => MeshState::Unknown,
    }
}

/// Whether the persisted status already says everything the new one would.
///
/// Transition times are disregarded, so a reconcile that changes nothing
/// issues no write and does not retrigger itself through its own watch.
pub fn statuses_equal(persisted: Option<&MeshStatus>, computed: &MeshStatus) -> bool {
    match persisted {
        None => false,
        Some(persisted) => {
            persisted.observed_generation == computed.observed_generation
                && persisted.state == computed.state
                && persisted.active_revision_name == computed.active_revision_name
                && persisted.revisions == computed.revisions
                && persisted
                    .conditions
                    .equal_ignoring_transitions(&computed.conditions)
        }
    }
}
