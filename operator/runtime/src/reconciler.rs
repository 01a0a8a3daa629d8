//! The Mesh reconciler: computes the merged values, keeps the active
//! revision in step, prunes retired revisions, and reports status.

use crate::{
    metrics::Metrics,
    revisions, status,
    values::{self, OperatorConfig, ProfileError},
};
use kube::runtime::controller::Action;
use std::{sync::Arc, time::Duration};
use tracing::instrument;
use trellis_operator_core::OPERATOR_NAME;
use trellis_operator_k8s_api::{
    Api, Client, ListParams, Mesh, MeshRevision, Patch, PatchParams, ResourceExt,
};

/// Resync cadence when nothing is pending.
const RESYNC_PERIOD: Duration = Duration::from_secs(300);
/// Retry cadence after a failed reconcile.
const ERROR_REQUEUE: Duration = Duration::from_secs(30);
/// A conflict is another writer racing us, not a failure; retry shortly.
const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

pub struct Context {
    pub client: Client,
    pub config: Arc<OperatorConfig>,
    pub metrics: Metrics,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("mesh has no namespace")]
    MissingNamespace,

    #[error("mesh has no UID")]
    MissingUid,

    #[error("failed to compute merged values: {0}")]
    Values(#[from] values::Error),

    #[error(transparent)]
    Revisions(#[from] revisions::Error),

    #[error("failed to update status: {0}")]
    Status(#[source] kube::Error),
}

#[instrument(skip_all, fields(
    namespace = %mesh.namespace().unwrap_or_default(),
    name = %mesh.name_any(),
))]
pub async fn reconcile(mesh: Arc<Mesh>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    ctx.metrics.reconciles.inc();

    let namespace = mesh.namespace().ok_or(ReconcileError::MissingNamespace)?;
    let meshes: Api<Mesh> = Api::namespaced(ctx.client.clone(), &namespace);
    let revisions_api: Api<MeshRevision> = Api::namespaced(ctx.client.clone(), &namespace);

    let active_name = revisions::active_revision_name(&mesh);
    let outcome = drive(&mesh, &active_name, &revisions_api, &ctx).await;
    let reconcile_error = outcome.as_ref().err().map(|e| e.to_string());

    // Status is derived and written even when driving failed: domain errors
    // surface exclusively through conditions on the Mesh.
    let listed = revisions_api
        .list(&ListParams::default())
        .await
        .map(|list| list.items);
    let computed = match &listed {
        Ok(items) => status::determine_status(
            &mesh,
            &active_name,
            Ok(items.as_slice()),
            reconcile_error.as_deref(),
        ),
        Err(error) => {
            status::determine_status(&mesh, &active_name, Err(error), reconcile_error.as_deref())
        }
    };
    if !status::statuses_equal(mesh.status.as_ref(), &computed) {
        let patch = Patch::Merge(serde_json::json!({ "status": computed }));
        meshes
            .patch_status(&mesh.name_any(), &PatchParams::apply(OPERATOR_NAME), &patch)
            .await
            .map_err(ReconcileError::Status)?;
        ctx.metrics.status_patches.inc();
    }

    match outcome {
        // Wake up when the next revision becomes eligible for deletion.
        Ok(Some(prune_delay)) => Ok(Action::requeue(prune_delay.min(RESYNC_PERIOD))),
        Ok(None) => Ok(Action::requeue(RESYNC_PERIOD)),
        Err(error) => Err(error),
    }
}

/// Applies the desired state: merged values into the active revision, then
/// pruning. Returns the pruning requeue delay, if any.
async fn drive(
    mesh: &Mesh,
    active_name: &str,
    revisions_api: &Api<MeshRevision>,
    ctx: &Context,
) -> Result<Option<Duration>, ReconcileError> {
    let target_namespace = mesh
        .target_namespace()
        .ok_or(ReconcileError::MissingNamespace)?
        .to_string();
    let merged = values::compute(
        &mesh.spec.version,
        &target_namespace,
        active_name,
        mesh.spec.profile.as_deref(),
        mesh.spec.values.as_ref(),
        &ctx.config,
    )
    .await?;

    revisions::create_or_update(revisions_api, mesh, active_name, merged).await?;

    let uid = mesh.uid().ok_or(ReconcileError::MissingUid)?;
    let pruned = revisions::prune_inactive(
        revisions_api,
        &uid,
        active_name,
        revisions::grace_period(mesh),
    )
    .await?;
    if !pruned.deleted.is_empty() {
        ctx.metrics
            .revisions_pruned
            .inc_by(pruned.deleted.len() as u64);
    }
    Ok(pruned.requeue_after)
}

pub fn error_policy(_mesh: Arc<Mesh>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    ctx.metrics.reconcile_failures.inc();
    if is_conflict(error) {
        return Action::requeue(CONFLICT_REQUEUE);
    }
    if is_terminal(error) {
        // Retrying cannot make an invalid spec valid. The failure is already
        // on the Mesh's conditions; a spec edit retriggers via the watch.
        tracing::warn!(%error, "Reconcile failed; waiting for a spec change");
        return Action::await_change();
    }
    tracing::warn!(%error, "Reconcile failed");
    Action::requeue(ERROR_REQUEUE)
}

fn is_conflict(error: &ReconcileError) -> bool {
    let response = match error {
        ReconcileError::Revisions(revisions::Error::Api(kube::Error::Api(response))) => response,
        ReconcileError::Status(kube::Error::Api(response)) => response,
        _ => return false,
    };
    response.code == 409
}

/// Invalid input, as opposed to a transient failure: a rejected profile name
/// or a merged tree the typed configuration cannot represent.
fn is_terminal(error: &ReconcileError) -> bool {
    matches!(
        error,
        ReconcileError::Values(
            values::Error::Convert(_)
                | values::Error::Profiles(
                    ProfileError::EmptyName | ProfileError::UnsafeName { .. }
                ),
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    #[test]
    fn rejected_profile_names_are_terminal() {
        let error = ReconcileError::Values(values::Error::Profiles(ProfileError::UnsafeName {
            name: "../escape".to_string(),
        }));
        assert!(is_terminal(&error));

        let error = ReconcileError::Values(values::Error::Profiles(ProfileError::EmptyName));
        assert!(is_terminal(&error));
    }

    #[test]
    fn untypable_values_are_terminal() {
        let source = serde_json::from_str::<u32>("[]").unwrap_err();
        let error = ReconcileError::Values(values::Error::Convert(source));
        assert!(is_terminal(&error));
    }

    #[test]
    fn io_and_api_failures_are_retried() {
        let read = ProfileError::Read {
            name: "default".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        let error = ReconcileError::Values(values::Error::Profiles(read));
        assert!(!is_terminal(&error));

        let error = ReconcileError::Status(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "etcdserver: request timed out".to_string(),
            reason: "InternalError".to_string(),
            code: 500,
        }));
        assert!(!is_terminal(&error));
        assert!(!is_conflict(&error));
    }

    #[test]
    fn conflicts_are_detected() {
        let error = ReconcileError::Status(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "the object has been modified".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        }));
        assert!(is_conflict(&error));
        assert!(!is_terminal(&error));
    }
}
