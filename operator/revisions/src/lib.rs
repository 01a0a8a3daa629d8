#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Revision lifecycle: computing the active revision's identity, keeping the
//! corresponding MeshRevision resource in step with the Mesh, and retiring
//! revisions that no workload uses anymore.

use chrono::{DateTime, Utc};
use kube::{Resource, ResourceExt};
use std::time::Duration;
use trellis_operator_k8s_api::{
    Api, ConditionStatus, ConditionType, DeleteParams, ListParams, Mesh, MeshRevision,
    MeshRevisionSpec, ObjectMeta, PostParams, UpdateStrategyType,
};

/// Grace period applied when the Mesh does not configure one.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Smallest permitted grace period. Shorter values would let a revision be
/// deleted and recreated within one workload rollout.
pub const MIN_GRACE_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("mesh resource is missing name or UID metadata")]
    MissingMetadata,

    #[error(transparent)]
    Api(#[from] kube::Error),
}

/// The revision name currently designated as authoritative for a Mesh.
///
/// In-place updates reuse the Mesh's own name forever; revision-based
/// updates derive a name per version, with separators normalized so the name
/// remains a valid DNS label.
pub fn active_revision_name(mesh: &Mesh) -> String {
    match mesh.strategy() {
        UpdateStrategyType::InPlace => mesh.name_any(),
        UpdateStrategyType::RevisionBased => {
            format!("{}-{}", mesh.name_any(), mesh.spec.version.replace('.', "-"))
        }
    }
}

/// The configured grace period, clamped to [`MIN_GRACE_PERIOD`].
pub fn grace_period(mesh: &Mesh) -> Duration {
    let configured = mesh
        .spec
        .update_strategy
        .as_ref()
        .and_then(|s| s.inactive_revision_deletion_grace_period_seconds)
        .map(|secs| Duration::from_secs(secs.max(0) as u64))
        .unwrap_or(DEFAULT_GRACE_PERIOD);
    configured.max(MIN_GRACE_PERIOD)
}

/// Creates the named revision, or updates its version and values if it
/// already exists.
///
/// The controller owner reference is attached only at creation time. An
/// existing revision without one is updated but never adopted: a name
/// collision with an unrelated resource must not silently transfer
/// ownership.
pub async fn create_or_update(
    api: &Api<MeshRevision>,
    mesh: &Mesh,
    name: &str,
    values: serde_json::Value,
) -> Result<MeshRevision, Error> {
    match api.get_opt(name).await? {
        None => {
            let owner = mesh
                .controller_owner_ref(&())
                .ok_or(Error::MissingMetadata)?;
            let revision = MeshRevision {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: mesh.namespace(),
                    owner_references: Some(vec![owner]),
                    ..Default::default()
                },
                spec: MeshRevisionSpec {
                    version: mesh.spec.version.clone(),
                    values: Some(values),
                },
                status: None,
            };
            tracing::info!(revision = %name, "Creating revision");
            Ok(api.create(&PostParams::default(), &revision).await?)
        }
        Some(mut existing) => {
            if existing.spec.version == mesh.spec.version
                && existing.spec.values.as_ref() == Some(&values)
            {
                return Ok(existing);
            }
            existing.spec.version = mesh.spec.version.clone();
            existing.spec.values = Some(values);
            tracing::info!(revision = %name, version = %mesh.spec.version, "Updating revision");
            Ok(api.replace(name, &PostParams::default(), &existing).await?)
        }
    }
}

/// What pruning decided for a single revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Delete,
    /// Kept for now; eligible for deletion after this long.
    RequeueAfter(Duration),
}

#[derive(Debug, Default)]
pub struct PruneOutcome {
    pub deleted: Vec<String>,
    /// When the next revision becomes eligible for deletion. Advisory
    /// scheduling data only; recomputing it concurrently is harmless.
    pub requeue_after: Option<Duration>,
}

/// Decides the fate of one revision during pruning.
///
/// The active revision and revisions owned by someone else are always kept.
/// An InUse condition of True keeps the revision; Unknown or absent also
/// keeps it, without scheduling a recheck, because an indeterminate usage
/// signal must never lead to deletion. Only a False condition ages the
/// revision toward deletion, measured from its last transition.
pub fn disposition(
    revision: &MeshRevision,
    owner_uid: &str,
    active_name: &str,
    now: DateTime<Utc>,
    grace: Duration,
) -> Disposition {
    if !revision.is_owned_by(owner_uid) || revision.name_any() == active_name {
        return Disposition::Keep;
    }
    let in_use = revision
        .status
        .as_ref()
        .and_then(|s| s.conditions.get(ConditionType::InUse));
    match in_use {
        Some(condition) if condition.status == ConditionStatus::False => {
            let Some(since) = &condition.last_transition_time else {
                return Disposition::Keep;
            };
            let grace = chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::MAX);
            let elapsed = now.signed_duration_since(since.0);
            if elapsed >= grace {
                Disposition::Delete
            } else {
                let remaining = (grace - elapsed).to_std().unwrap_or_default();
                Disposition::RequeueAfter(remaining)
            }
        }
        _ => Disposition::Keep,
    }
}

/// Deletes owned, non-active revisions whose grace period has expired.
///
/// The returned requeue delay is the minimum remaining grace across the
/// surviving revisions, so the caller can wake up exactly when the next one
/// becomes eligible.
pub async fn prune_inactive(
    api: &Api<MeshRevision>,
    owner_uid: &str,
    active_name: &str,
    grace: Duration,
) -> Result<PruneOutcome, Error> {
    let revisions = api.list(&ListParams::default()).await?;
    let now = Utc::now();
    let mut outcome = PruneOutcome::default();
    for revision in revisions {
        let name = revision.name_any();
        match disposition(&revision, owner_uid, active_name, now, grace) {
            Disposition::Keep => {}
            Disposition::RequeueAfter(delay) => {
                outcome.requeue_after = Some(match outcome.requeue_after {
                    Some(current) => current.min(delay),
                    None => delay,
                });
            }
            Disposition::Delete => {
                tracing::info!(revision = %name, "Deleting retired revision");
                match api.delete(&name, &DeleteParams::default()).await {
                    Ok(_) => outcome.deleted.push(name),
                    // Someone else got there first; not an error.
                    Err(kube::Error::Api(response)) if response.code == 404 => {}
                    Err(error) => return Err(error.into()),
                }
            }
        }
    }
    Ok(outcome)
}
