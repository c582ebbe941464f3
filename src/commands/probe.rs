use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::command::{guard, Command, CommandOutcome, Interrupted, JobContext};
use crate::kubernetes::model::SharedClusterProbe;

/// Confirms a provisioned kubeconfig can talk to its cluster.
pub struct ClusterProbeCommand {
    probe: SharedClusterProbe,
}

impl ClusterProbeCommand {
    pub fn new(probe: SharedClusterProbe) -> ClusterProbeCommand {
        ClusterProbeCommand { probe }
    }

    async fn probe(
        &self,
        kubeconfig: &Path,
        ctx: &JobContext,
    ) -> anyhow::Result<CommandOutcome<String>> {
        let info = self.probe.server_version(kubeconfig).await?;
        ctx.log
            .status(&format!("Kubernetes API server version: {}", info.git_version));
        Ok(CommandOutcome::success(info.git_version))
    }
}

#[async_trait]
impl Command for ClusterProbeCommand {
    type Input = PathBuf;
    type Output = String;

    async fn execute(
        &self,
        kubeconfig: &PathBuf,
        ctx: &JobContext,
    ) -> Result<CommandOutcome<String>, Interrupted> {
        guard(ctx, self.probe(kubeconfig, ctx), |_| {}).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::stubs::context;
    use crate::command::CommandState;
    use crate::kubernetes::stubs::{AlwaysFail, AlwaysSuccess};
    use std::sync::Arc;

    #[tokio::test]
    async fn reports_server_version() {
        let test = context();
        let outcome = ClusterProbeCommand::new(Arc::new(AlwaysSuccess))
            .execute(&PathBuf::from("config"), &test.ctx)
            .await
            .unwrap();
        assert_eq!(outcome.payload().map(String::as_str), Some("v1.24.9"));
    }

    #[tokio::test]
    async fn unreachable_cluster_has_error() {
        let test = context();
        let outcome = ClusterProbeCommand::new(Arc::new(AlwaysFail))
            .execute(&PathBuf::from("config"), &test.ctx)
            .await
            .unwrap();
        assert_eq!(outcome.state(), CommandState::HasError);
        assert!(test.log.text().contains("does not reach an API server"));
    }
}
