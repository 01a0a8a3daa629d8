use crate::k8s::{self, ObjectMeta};
use anyhow::Result;
use k8s_openapi::api::{apps::v1::Deployment, coordination::v1 as coordv1};
use kube::{api::PatchParams, Resource};
use std::sync::Arc;
use tokio::{sync::watch, time};

const LEASE_DURATION: time::Duration = time::Duration::from_secs(30);
const LEASE_NAME: &str = "trellis-operator-write";
const RENEW_GRACE_PERIOD: time::Duration = time::Duration::from_secs(1);

pub async fn init<T>(
    runtime: &kubert::Runtime<T>,
    ns: &str,
    deployment_name: &str,
    hostname: &str,
) -> Result<watch::Receiver<Arc<kubert::lease::Claim>>> {
    // Fetch the operator deployment so that we can use it as an owner
    // reference of the Lease.
    let api = k8s::Api::<Deployment>::namespaced(runtime.client(), ns);
    let deployment = api.get(deployment_name).await?;

    let lease = coordv1::Lease {
        metadata: ObjectMeta {
            name: Some(LEASE_NAME.to_string()),
            namespace: Some(ns.to_string()),
            // Specifying a resource version of "0" means that we will
            // only create the Lease if it does not already exist.
            resource_version: Some("0".to_string()),
            owner_references: deployment.controller_owner_ref(&()).map(|r| vec![r]),
            labels: Some(
                [(
                    "app.kubernetes.io/part-of".to_string(),
                    "trellis".to_string(),
                )]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        },
        spec: None,
    };
    let api = k8s::Api::<coordv1::Lease>::namespaced(runtime.client(), ns);
    match api
        .patch(
            LEASE_NAME,
            &PatchParams {
                field_manager: Some("trellis-operator".to_string()),
                ..Default::default()
            },
            &kube::api::Patch::Apply(lease),
        )
        .await
    {
        Ok(lease) => tracing::info!(?lease, "Created Lease resource"),
        Err(k8s::Error::Api(_)) => tracing::debug!("Lease already exists, no need to create it"),
        Err(error) => {
            return Err(error.into());
        }
    };

    // Create the lease manager used for trying to claim the operator write
    // lease.
    let params = kubert::lease::ClaimParams {
        lease_duration: LEASE_DURATION,
        renew_grace_period: RENEW_GRACE_PERIOD,
    };
    let (claims, _task) = kubert::lease::LeaseManager::init(api, LEASE_NAME)
        .await?
        .spawn(hostname, params)
        .await?;
    Ok(claims)
}
