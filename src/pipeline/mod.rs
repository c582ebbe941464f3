use std::cell::OnceCell;
use std::path::PathBuf;
use tracing::warn;

use crate::command::{Command, CommandOutcome, Interrupted, JobContext};
use crate::commands::cluster_info::{ClusterInfoInput, ClusterInfoResolver};
use crate::commands::kubeconfig::{KubeconfigInput, KubeconfigProvisioner};
use crate::commands::probe::ClusterProbeCommand;
use crate::configuration::DeploymentRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStatus {
    Succeeded,
    Failed(&'static str),
}

/// Outputs gathered over one run. Each field is set at most once.
#[derive(Debug, Default)]
pub struct DeploymentRecord {
    pub mgmt_fqdn: OnceCell<String>,
    pub admin_username: OnceCell<String>,
    pub kubeconfig: OnceCell<PathBuf>,
    pub server_version: OnceCell<String>,
}

fn set_once<T>(cell: &OnceCell<T>, field: &str, value: T) {
    if cell.set(value).is_err() {
        warn!(field, "deployment output already recorded; keeping the first value");
    }
}

pub struct Pipeline {
    resolver: ClusterInfoResolver,
    provisioner: KubeconfigProvisioner,
    probe: ClusterProbeCommand,
}

impl Pipeline {
    pub fn new(
        resolver: ClusterInfoResolver,
        provisioner: KubeconfigProvisioner,
        probe: ClusterProbeCommand,
    ) -> Pipeline {
        Pipeline {
            resolver,
            provisioner,
            probe,
        }
    }

    fn kubeconfig_path(request: &DeploymentRequest, ctx: &JobContext) -> PathBuf {
        request.kubeconfig_path.clone().unwrap_or_else(|| {
            ctx.workspace
                .dir
                .join(".kube")
                .join(format!("config-{}", request.cluster_name))
        })
    }

    /// Runs the steps in order, stopping at the first one that reports an error.
    pub async fn run(
        &self,
        request: &DeploymentRequest,
        ctx: &JobContext,
    ) -> Result<(PipelineStatus, DeploymentRecord), Interrupted> {
        let record = DeploymentRecord::default();

        let info = self
            .resolver
            .execute(
                &ClusterInfoInput {
                    credentials_id: request.credentials_id.clone(),
                    resource_group: request.resource_group.clone(),
                    cluster_name: request.cluster_name.clone(),
                    variant: request.variant,
                    expected_type: request.orchestrator_type,
                },
                ctx,
            )
            .await?;
        if info.state().is_error() {
            return Ok((PipelineStatus::Failed("cluster-info"), record));
        }
        if let Some(endpoint) = info.into_payload() {
            set_once(&record.mgmt_fqdn, "mgmt_fqdn", endpoint.master_fqdn);
            set_once(&record.admin_username, "admin_username", endpoint.admin_username);
        }

        if !request.variant.is_managed() {
            return Ok((PipelineStatus::Succeeded, record));
        }

        let kubeconfig = self
            .provisioner
            .execute(
                &KubeconfigInput {
                    credentials_id: request.credentials_id.clone(),
                    resource_group: request.resource_group.clone(),
                    cluster_name: request.cluster_name.clone(),
                    destination: Self::kubeconfig_path(request, ctx),
                },
                ctx,
            )
            .await?;
        let path = match Self::settled(kubeconfig) {
            Some(path) => path,
            None => return Ok((PipelineStatus::Failed("kubeconfig"), record)),
        };
        set_once(&record.kubeconfig, "kubeconfig", path.clone());

        if request.verify {
            let probe = self.probe.execute(&path, ctx).await?;
            match Self::settled(probe) {
                Some(version) => set_once(&record.server_version, "server_version", version),
                None => return Ok((PipelineStatus::Failed("verify"), record)),
            }
        }

        Ok((PipelineStatus::Succeeded, record))
    }

    fn settled<T>(outcome: CommandOutcome<T>) -> Option<T> {
        if outcome.state().is_error() {
            None
        } else {
            outcome.into_payload()
        }
    }
}
