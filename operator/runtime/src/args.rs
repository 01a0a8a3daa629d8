use crate::{lease, metrics::Metrics, reconciler, values::OperatorConfig};
use anyhow::{bail, Context as _, Result};
use clap::Parser;
use futures::prelude::*;
use kube::runtime::{controller::Controller, watcher};
use prometheus_client::registry::Registry;
use std::{path::PathBuf, sync::Arc};
use tracing::{info, info_span, Instrument};
use trellis_operator_k8s_api::{Api, Mesh, MeshRevision};

#[derive(Debug, Parser)]
#[clap(name = "trellis-operator", about = "A Trellis control-plane operator")]
pub struct Args {
    #[clap(
        long,
        default_value = "trellis=info,warn",
        env = "TRELLIS_OPERATOR_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Root of the versioned resource tree holding values profiles.
    #[clap(long, default_value = "/var/lib/trellis-operator/resources")]
    resource_dir: PathBuf,

    /// Profile applied when a Mesh does not select one.
    #[clap(long, default_value = "default")]
    default_profile: String,

    /// Non-default target platform requiring platform-specific values.
    #[clap(long)]
    platform: Option<String>,

    /// Path to a YAML table of per-version pinned image digests.
    #[clap(long)]
    image_digests: Option<PathBuf>,

    /// TLS cipher suites to enforce on the control plane.
    #[clap(long, value_delimiter = ',')]
    tls_cipher_suites: Option<Vec<String>>,

    #[clap(long, default_value = "trellis-operator")]
    deployment_name: String,

    #[clap(long, default_value = "trellis-system", env = "TRELLIS_OPERATOR_NS")]
    operator_namespace: String,

    /// Disables the write lease; every replica reconciles.
    #[clap(long)]
    leader_election_disabled: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            resource_dir,
            default_profile,
            platform,
            image_digests,
            tls_cipher_suites,
            deployment_name,
            operator_namespace,
            leader_election_disabled,
        } = self;

        let mut prom = <Registry>::default();
        let metrics = Metrics::register(prom.sub_registry_with_prefix("mesh_reconciler"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let image_digests = match image_digests {
            Some(path) => OperatorConfig::load_image_digests(&path)
                .context("failed to load the image digest table")?,
            None => Default::default(),
        };
        let config = Arc::new(OperatorConfig {
            resource_dir,
            default_profile: Some(default_profile),
            platform,
            fips_enabled: crate::fips::enabled(),
            tls_cipher_suites,
            image_digests,
            vendor_defaults: OperatorConfig::embedded_vendor_defaults()
                .context("failed to parse embedded vendor defaults")?,
        });
        if config.fips_enabled {
            info!("FIPS mode detected on the host");
        }

        // Only one replica may write: wait for the lease before reconciling.
        if !leader_election_disabled {
            let hostname =
                std::env::var("HOSTNAME").expect("Failed to fetch `HOSTNAME` environment variable");
            let mut claims =
                lease::init(&runtime, &operator_namespace, &deployment_name, &hostname).await?;
            while !claims.borrow_and_update().is_current_for(&hostname) {
                claims.changed().await?;
            }
            info!(%hostname, "Lease claimed");
        }

        let client = runtime.client();
        let ctx = Arc::new(reconciler::Context {
            client: client.clone(),
            config,
            metrics,
        });
        let meshes = Api::<Mesh>::all(client.clone());
        let revisions = Api::<MeshRevision>::all(client);
        tokio::spawn(
            Controller::new(meshes, watcher::Config::default())
                .owns(revisions, watcher::Config::default())
                .run(reconciler::reconcile, reconciler::error_policy, ctx)
                .for_each(|result| async move {
                    match result {
                        Ok((object, _)) => tracing::debug!(name = %object.name, "Reconciled"),
                        Err(error) => tracing::warn!(%error, "Reconcile failed"),
                    }
                })
                .instrument(info_span!("mesh_controller")),
        );

        // Block the main thread on the shutdown signal.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
