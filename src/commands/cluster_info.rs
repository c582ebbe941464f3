use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::azure::model::{
    AzureClient, ClusterName, ClusterVariant, OrchestratorType, ResourceGroupName,
};
use crate::command::{guard, Command, CommandOutcome, CommandState, Interrupted, JobContext};
use crate::credentials::CredentialStore;
use crate::telemetry::{self, TelemetryEvent};
use crate::worker::{ClusterInfoRequest, RemoteTask, TaskResult, WorkerPool};

#[derive(Clone, Debug)]
pub struct ClusterInfoInput {
    pub credentials_id: String,
    pub resource_group: ResourceGroupName,
    pub cluster_name: ClusterName,
    pub variant: ClusterVariant,
    pub expected_type: Option<OrchestratorType>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterEndpoint {
    pub orchestrator_type: OrchestratorType,
    pub master_fqdn: String,
    pub admin_username: String,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("container service '{name}' not found in resource group '{group}'")]
    NotFound {
        name: ClusterName,
        group: ResourceGroupName,
    },
    #[error(
        "orchestrator type of container service '{name}' is {actual}, but {expected} was configured"
    )]
    TypeMismatch {
        name: ClusterName,
        actual: OrchestratorType,
        expected: OrchestratorType,
    },
}

/// Looks up the master FQDN and admin user of an ACS cluster.
pub struct ClusterInfoResolver {
    credentials: Arc<dyn CredentialStore + Send + Sync>,
    workers: Arc<WorkerPool>,
}

impl ClusterInfoResolver {
    pub fn new(
        credentials: Arc<dyn CredentialStore + Send + Sync>,
        workers: Arc<WorkerPool>,
    ) -> ClusterInfoResolver {
        ClusterInfoResolver {
            credentials,
            workers,
        }
    }

    async fn resolve(
        &self,
        input: &ClusterInfoInput,
        ctx: &JobContext,
    ) -> anyhow::Result<CommandOutcome<ClusterEndpoint>> {
        let lookup = self
            .credentials
            .lookup(&input.credentials_id, ctx.owner.as_deref());

        if let Ok(principal) = &lookup {
            telemetry::emit_best_effort(
                &ctx.telemetry,
                TelemetryEvent::new(telemetry::START_DEPLOY, input.variant.as_str(), &ctx.run)
                    .with_hashed("Subscription", &principal.subscription_id.0)
                    .with_hashed("ResourceGroup", &input.resource_group.0)
                    .with_hashed("ContainerServiceName", &input.cluster_name.0),
            );
        }

        // Managed clusters expose their connection details through the kubeconfig step.
        if input.variant.is_managed() {
            return Ok(CommandOutcome::success_empty());
        }
        let principal = lookup?;

        ctx.log.status("Getting management FQDN of the container service");
        let task = RemoteTask::FetchClusterInfo(ClusterInfoRequest {
            principal,
            resource_group: input.resource_group.clone(),
            cluster_name: input.cluster_name.clone(),
            expected_type: input.expected_type,
        });
        let result = self.workers.act(&ctx.workspace.agent, task).await?;
        for line in &result.log {
            ctx.log.status(line);
        }

        if result.state != CommandState::Success {
            return Ok(CommandOutcome::has_error());
        }
        match (result.orchestrator_type, result.fqdn, result.admin_username) {
            (Some(orchestrator_type), Some(master_fqdn), Some(admin_username)) => {
                Ok(CommandOutcome::success(ClusterEndpoint {
                    orchestrator_type,
                    master_fqdn,
                    admin_username,
                }))
            }
            _ => anyhow::bail!("agent reported success without cluster details"),
        }
    }
}

#[async_trait]
impl Command for ClusterInfoResolver {
    type Input = ClusterInfoInput;
    type Output = ClusterEndpoint;

    async fn execute(
        &self,
        input: &ClusterInfoInput,
        ctx: &JobContext,
    ) -> Result<CommandOutcome<ClusterEndpoint>, Interrupted> {
        guard(ctx, self.resolve(input, ctx), |err| {
            telemetry::emit_best_effort(
                &ctx.telemetry,
                TelemetryEvent::new(telemetry::GET_INFO_FAILURE, input.variant.as_str(), &ctx.run)
                    .with(telemetry::MESSAGE, err.to_string()),
            )
        })
        .await
    }
}

/// Reads the container service on the agent side. Outcomes travel back as data,
/// together with the log lines written along the way.
pub async fn fetch_cluster_info(
    client: &(dyn AzureClient + Send + Sync),
    request: &ClusterInfoRequest,
) -> anyhow::Result<TaskResult> {
    let mut result = TaskResult::default();

    let service = match client
        .container_service(&request.resource_group, &request.cluster_name)
        .await?
    {
        Some(service) => service,
        None => {
            let err = ResolveError::NotFound {
                name: request.cluster_name.clone(),
                group: request.resource_group.clone(),
            };
            result.log.push(err.to_string());
            result.state = CommandState::HasError;
            return Ok(result);
        }
    };

    let actual = service.orchestrator_type;
    result.log.push(format!("Orchestrator type: {}", actual));
    result.orchestrator_type = Some(actual);

    if let Some(expected) = request.expected_type {
        if actual != expected {
            let err = ResolveError::TypeMismatch {
                name: request.cluster_name.clone(),
                actual,
                expected,
            };
            result.log.push(err.to_string());
            result.state = CommandState::HasError;
            return Ok(result);
        }
    }

    result.log.push(format!("Management FQDN: {}", service.master_fqdn));
    result.fqdn = Some(service.master_fqdn);
    result.log.push(format!("Admin username: {}", service.admin_username));
    result.admin_username = Some(service.admin_username);
    result.state = CommandState::Success;
    Ok(result)
}
