mod azure;
mod command;
mod commands;
mod configuration;
mod credentials;
mod extensions;
mod kubernetes;
mod pipeline;
mod telemetry;
mod worker;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::azure::arm::ArmClientFactory;
use crate::azure::model::{
    ClusterName, ClusterVariant, OrchestratorType, ResourceGroupName, SharedClientFactory,
};
use crate::command::{
    Command, CommandState, ConsoleLog, Interrupted, JobContext, Workspace,
};
use crate::commands::cluster_info::{ClusterInfoInput, ClusterInfoResolver};
use crate::commands::kubeconfig::{KubeconfigInput, KubeconfigProvisioner};
use crate::commands::probe::ClusterProbeCommand;
use crate::configuration::{DEFAULT_AGENT, Settings};
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::pipeline::{Pipeline, PipelineStatus};
use crate::telemetry::{NoTelemetry, SharedTelemetry, TracingTelemetry};
use crate::worker::WorkerPool;

/// Deploys to Azure Container Service and AKS clusters.
#[derive(Parser)]
#[command(name = "acs-deploy", version)]
struct Cli {
    /// Settings file (credentials, agents, cloud endpoints).
    #[arg(long, env = "ACS_DEPLOY_SETTINGS", default_value = "acs-deploy.yaml")]
    settings: PathBuf,

    /// Identifier of this run, used to attribute log lines.
    #[arg(long, env = "BUILD_TAG", default_value = "local")]
    run: String,

    /// Job name checked against scoped credentials.
    #[arg(long, env = "JOB_NAME")]
    owner: Option<String>,

    /// Agent the workspace lives on.
    #[arg(long, default_value = DEFAULT_AGENT)]
    agent: String,

    #[arg(long, env = "WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    #[arg(long)]
    credentials_id: String,
    #[arg(long)]
    resource_group: String,
    #[arg(long)]
    name: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the management endpoint of a cluster.
    ClusterInfo {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value = "ACS")]
        variant: ClusterVariant,
        #[arg(long)]
        orchestrator_type: Option<OrchestratorType>,
    },
    /// Write the admin kubeconfig of an AKS cluster.
    Kubeconfig {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        output: PathBuf,
    },
    /// Run every step described by a request file.
    Deploy { request: PathBuf },
}

struct Services {
    credentials: Arc<dyn CredentialStore + Send + Sync>,
    factory: SharedClientFactory,
    workers: Arc<WorkerPool>,
}

impl Services {
    fn build(settings: &Settings) -> anyhow::Result<Services> {
        let credentials = Arc::new(FileCredentialStore::load_from_yaml(
            &settings.credentials_file,
        )?);
        let factory: SharedClientFactory = Arc::new(ArmClientFactory::new(
            settings.cloud.clone(),
            settings.http_timeout(),
        )?);
        let workers = Arc::new(WorkerPool::start(&settings.agents, factory.clone()));
        debug!(agents = ?workers.agents().collect::<Vec<_>>(), "agents started");
        Ok(Services {
            credentials,
            factory,
            workers,
        })
    }

    fn resolver(&self) -> ClusterInfoResolver {
        ClusterInfoResolver::new(self.credentials.clone(), self.workers.clone())
    }

    fn provisioner(&self) -> KubeconfigProvisioner {
        KubeconfigProvisioner::new(self.credentials.clone(), self.factory.clone())
    }
}

fn exit_code(state: Result<CommandState, Interrupted>) -> ExitCode {
    match state {
        Ok(CommandState::Success) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(Interrupted) => ExitCode::from(130),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = configuration::load_from_yaml(&cli.settings)?;
    let services = Services::build(&settings)?;

    let telemetry: SharedTelemetry = if settings.telemetry {
        Arc::new(TracingTelemetry)
    } else {
        Arc::new(NoTelemetry)
    };
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling the running step");
            on_ctrl_c.cancel();
        }
    });

    let ctx = JobContext {
        run: cli.run.clone(),
        owner: cli.owner.clone(),
        workspace: Workspace {
            agent: cli.agent.clone(),
            dir: cli.workspace.clone(),
        },
        log: Arc::new(ConsoleLog::new(&cli.run)),
        telemetry,
        cancel,
    };

    let state = match cli.command {
        Commands::ClusterInfo {
            target,
            variant,
            orchestrator_type,
        } => {
            let input = ClusterInfoInput {
                credentials_id: target.credentials_id,
                resource_group: ResourceGroupName(target.resource_group),
                cluster_name: ClusterName(target.name),
                variant,
                expected_type: orchestrator_type,
            };
            services.resolver().execute(&input, &ctx).await.map(|outcome| {
                if let Some(endpoint) = outcome.payload() {
                    println!("{}\t{}", endpoint.master_fqdn, endpoint.admin_username);
                }
                outcome.state()
            })
        }
        Commands::Kubeconfig { target, output } => {
            let input = KubeconfigInput {
                credentials_id: target.credentials_id,
                resource_group: ResourceGroupName(target.resource_group),
                cluster_name: ClusterName(target.name),
                destination: output,
            };
            services
                .provisioner()
                .execute(&input, &ctx)
                .await
                .map(|outcome| outcome.state())
        }
        Commands::Deploy { request } => {
            let request = configuration::load_request(request)?;
            let pipeline = Pipeline::new(
                services.resolver(),
                services.provisioner(),
                ClusterProbeCommand::new(Arc::new(kubernetes::kubers::KubeRsBased)),
            );
            pipeline.run(&request, &ctx).await.map(|(status, record)| {
                if let Some(fqdn) = record.mgmt_fqdn.get() {
                    info!(%fqdn, "management endpoint resolved");
                }
                if let Some(path) = record.kubeconfig.get() {
                    info!(path = %path.display(), "kubeconfig ready");
                }
                match status {
                    PipelineStatus::Succeeded => CommandState::Success,
                    PipelineStatus::Failed(step) => {
                        ctx.log.status(&format!("Step '{}' failed", step));
                        CommandState::HasError
                    }
                }
            })
        }
    };

    Ok(exit_code(state))
}
